//! Registration and member read models.

use std::sync::Arc;

use gbnet_engine::authorize_view;
use gbnet_tree::Placement;
use gbnet_types::user::NewUserProfile;
use gbnet_types::{time, Session};
use serde_json::{json, Value};

use super::{field, target_user, to_json, Result};
use crate::DaemonState;

/// Register a member. Params: `name`, `email`, `placement`
/// (`{"kind": "root"}` or `{"kind": "sponsored", "referral_code", "side"}`).
pub async fn register_user(state: &Arc<DaemonState>, params: &Value) -> Result {
    let profile = NewUserProfile {
        name: field(params, "name")?,
        email: field(params, "email")?,
    };
    let placement: Placement = field(params, "placement")?;
    let now = time::now();

    let mut db = state.db.lock().await;
    let user = gbnet_engine::register_user(&mut db, &profile, &placement, now)?;
    drop(db);

    state.event_bus.emit(
        "MemberRegistered",
        now,
        json!({ "user_code": user.user_code, "sponsor_code": user.sponsor_code, "side": user.side }),
    );
    to_json(&user)
}

pub async fn get_dashboard_summary(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let user_code = target_user(session, params);
    authorize_view(session, user_code)?;
    let db = state.db.lock().await;
    to_json(&gbnet_engine::dashboard_summary(&db, user_code, &state.config.compensation)?)
}

pub async fn get_team(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let user_code = target_user(session, params);
    authorize_view(session, user_code)?;
    let db = state.db.lock().await;
    to_json(&gbnet_engine::team(&db, user_code, &state.config.compensation)?)
}

pub async fn get_rank(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let user_code = target_user(session, params);
    authorize_view(session, user_code)?;
    let db = state.db.lock().await;
    to_json(&gbnet_engine::rank(&db, user_code, &state.config.compensation)?)
}

pub async fn get_eligibility(state: &Arc<DaemonState>, session: &Session, params: &Value) -> Result {
    let user_code = target_user(session, params);
    authorize_view(session, user_code)?;
    let db = state.db.lock().await;
    to_json(&gbnet_engine::eligibility(&db, user_code, &state.config.compensation)?)
}
