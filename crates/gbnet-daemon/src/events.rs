//! Event emission.
//!
//! Completed mutations are broadcast to connections that called
//! `subscribe_events`; each subscriber has its own bounded buffer and a slow
//! one skips events rather than holding up the others.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An event emitted by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type name (e.g. "PurchaseCompleted", "DaemonStarted").
    pub event_type: String,
    /// Monotonic per-process sequence number.
    pub sequence: u64,
    /// Unix timestamp.
    pub timestamp: u64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
}

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Category filter: "commerce", "wallet", "stk", "system".
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    /// Only events whose payload names this member.
    #[serde(default)]
    pub user_code: Option<String>,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event_type: &str, timestamp: u64, payload: serde_json::Value) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        // no subscribers is fine
        let _ = self.sender.send(Event {
            event_type: event_type.to_string(),
            sequence,
            timestamp,
            payload,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl EventFilter {
    /// Check if an event matches this filter.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref categories) = self.categories {
            let category = categorize_event(&event.event_type);
            if !categories.iter().any(|c| c == category) {
                return false;
            }
        }
        if let Some(ref code) = self.user_code {
            let named = ["user_code", "counterparty_code", "sponsor_code"]
                .iter()
                .filter_map(|key| event.payload.get(*key).and_then(|v| v.as_str()))
                .any(|v| v == code);
            if !named {
                return false;
            }
        }
        true
    }
}

fn categorize_event(event_type: &str) -> &'static str {
    match event_type {
        s if s.starts_with("Purchase") || s.starts_with("Product") => "commerce",
        s if s.starts_with("Deposit")
            || s.starts_with("Withdrawal")
            || s.starts_with("Transfer")
            || s.starts_with("Topup")
            || s.starts_with("Salary") =>
        {
            "wallet"
        }
        s if s.starts_with("Stk") => "stk",
        _ => "system",
    }
}
