//! HTTP request handlers.
//!
//! Handlers are thin: authenticate, decode, call the engine or the payment
//! services, count, and clear the list cache after a write.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crew_lifecycle::{FeedbackInput, GroupPlan, RefundRequest};
use crew_payments::webhook::SIGNATURE_HEADERS;
use crew_payments::{dispatch_refunds, PaymentGateway, RefundSummary, WebhookAck};
use crew_store::CrewStore;
use crew_types::{GroupId, GroupStatus, RsvpAnswer, UserId};

use crate::auth;
use crate::pagination::PaginationParams;
use crate::state::{CacheKey, RpcState};
use crate::ApiError;

type Shared<S, G> = State<Arc<RpcState<S, G>>>;

/// Decode a JSON body. An empty body reads as `T::default()`.
fn json_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    required_json(body)
}

fn required_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

async fn request_refunds<S, G: PaymentGateway>(
    state: &RpcState<S, G>,
    refunds: &[RefundRequest],
) -> RefundSummary {
    let summary = dispatch_refunds(state.gateway.as_ref(), refunds).await;
    state.metrics.observe_refunds(&summary);
    summary
}

// ── Service ─────────────────────────────────────────────────────────────

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn metrics<S: CrewStore + 'static, G: PaymentGateway>(
    State(state): Shared<S, G>,
) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
}

// ── Queue ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct JoinQueueBody {
    #[serde(default)]
    pub campus: Option<String>,
}

pub async fn join_queue<S: CrewStore + 'static, G: PaymentGateway>(
    State(state): Shared<S, G>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let user = auth::member(&headers)?;
    let body: JoinQueueBody = json_body(&body)?;
    let entry = state.engine.join_queue(&user, body.campus.as_deref())?;
    state.invalidate_lists();
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn leave_queue<S: CrewStore + 'static, G: PaymentGateway>(
    State(state): Shared<S, G>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let user = auth::member(&headers)?;
    let removed = state.engine.leave_queue(&user)?;
    if removed {
        state.invalidate_lists();
    }
    Ok(Json(json!({ "removed": removed })))
}

pub async fn list_queue<S: CrewStore + 'static, G: PaymentGateway>(
    State(state): Shared<S, G>,
    headers: HeaderMap,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Value>, ApiError> {
    auth::operator(&state.authority, &headers)?;
    let entries = match state.cache.get(&CacheKey::Queue) {
        Some(cached) => cached,
        None => {
            let fresh = to_value(state.engine.list_queue()?)?;
            state.cache.insert(CacheKey::Queue, fresh.clone());
            fresh
        }
    };
    let items = entries.as_array().map(Vec::as_slice).unwrap_or_default();
    Ok(Json(to_value(params.page(items))?))
}

// ── Groups (operator) ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateGroupBody {
    pub member_ids: Vec<UserId>,
    #[serde(flatten)]
    pub plan: GroupPlan,
}

pub async fn create_group<S: CrewStore + 'static, G: PaymentGateway>(
    State(state): Shared<S, G>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let operator = auth::operator(&state.authority, &headers)?;
    let body: CreateGroupBody = required_json(&body)?;
    let group = state
        .engine
        .create_group(&operator, &body.member_ids, body.plan)?;
    state.metrics.groups_created.inc();
    state.invalidate_lists();
    Ok((StatusCode::CREATED, Json(group)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListGroupsQuery {
    #[serde(default)]
    pub status: Option<GroupStatus>,
}

pub async fn list_groups<S: CrewStore + 'static, G: PaymentGateway>(
    State(state): Shared<S, G>,
    headers: HeaderMap,
    Query(query): Query<ListGroupsQuery>,
) -> Result<Json<Value>, ApiError> {
    let operator = auth::operator(&state.authority, &headers)?;
    let groups = state.engine.list_groups(&operator, query.status)?;
    Ok(Json(to_value(groups)?))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: GroupStatus,
}

pub async fn advance_status<S: CrewStore + 'static, G: PaymentGateway>(
    State(state): Shared<S, G>,
    headers: HeaderMap,
    Path(group_id): Path<GroupId>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let operator = auth::operator(&state.authority, &headers)?;
    let body: StatusBody = required_json(&body)?;
    let transition = state
        .engine
        .advance_status(&operator, group_id, body.status)?;
    if transition.changed {
        state
            .metrics
            .transitions
            .with_label_values(&[body.status.as_str()])
            .inc();
        state.invalidate_lists();
    }
    let summary = request_refunds(&*state, &transition.refunds).await;
    Ok(Json(json!({
        "group": transition.group,
        "changed": transition.changed,
        "refunds_requested": summary.requested,
        "refunds_failed": summary.failed.len(),
    })))
}

pub async fn group_detail<S: CrewStore + 'static, G: PaymentGateway>(
    State(state): Shared<S, G>,
    headers: HeaderMap,
    Path(group_id): Path<GroupId>,
) -> Result<Json<Value>, ApiError> {
    let operator = auth::operator(&state.authority, &headers)?;
    Ok(Json(to_value(state.engine.group_detail(&operator, group_id)?)?))
}

pub async fn sweep<S: CrewStore + 'static, G: PaymentGateway>(
    State(state): Shared<S, G>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let operator = auth::operator(&state.authority, &headers)?;
    let report = state.engine.sweep(&operator, state.engine.now())?;
    state.metrics.observe_sweep(&report);
    if !report.is_empty() {
        state.invalidate_lists();
    }
    let summary = request_refunds(&*state, &report.refunds).await;
    Ok(Json(json!({
        "report": report,
        "refunds_requested": summary.requested,
        "refunds_failed": summary.failed.len(),
    })))
}

// ── Groups (member) ─────────────────────────────────────────────────────

/// Which of a member's groups to list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Active,
    Past,
}

#[derive(Debug, Default, Deserialize)]
pub struct MyGroupsQuery {
    #[serde(default)]
    pub scope: Scope,
}

pub async fn my_groups<S: CrewStore + 'static, G: PaymentGateway>(
    State(state): Shared<S, G>,
    headers: HeaderMap,
    Query(query): Query<MyGroupsQuery>,
) -> Result<Json<Value>, ApiError> {
    let user = auth::member(&headers)?;
    let key = CacheKey::UserGroups(user.clone(), query.scope);
    if let Some(cached) = state.cache.get(&key) {
        return Ok(Json(cached));
    }
    let groups = match query.scope {
        Scope::Active => state.engine.list_active_groups_for_user(&user)?,
        Scope::Past => state.engine.list_past_groups_for_user(&user)?,
    };
    let value = to_value(groups)?;
    state.cache.insert(key, value.clone());
    Ok(Json(value))
}

pub async fn group_view<S: CrewStore + 'static, G: PaymentGateway>(
    State(state): Shared<S, G>,
    headers: HeaderMap,
    Path(group_id): Path<GroupId>,
) -> Result<Json<Value>, ApiError> {
    let user = auth::member(&headers)?;
    Ok(Json(to_value(state.engine.group_view(group_id, &user)?)?))
}

pub async fn payment_status<S: CrewStore + 'static, G: PaymentGateway>(
    State(state): Shared<S, G>,
    headers: HeaderMap,
    Path(group_id): Path<GroupId>,
) -> Result<Json<Value>, ApiError> {
    let user = auth::member(&headers)?;
    let status = state.engine.payment_status(group_id, &user)?;
    Ok(Json(json!({ "status": status })))
}

#[derive(Debug, Deserialize)]
pub struct RsvpBody {
    pub answer: RsvpAnswer,
}

pub async fn rsvp<S: CrewStore + 'static, G: PaymentGateway>(
    State(state): Shared<S, G>,
    headers: HeaderMap,
    Path(group_id): Path<GroupId>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let user = auth::member(&headers)?;
    let body: RsvpBody = required_json(&body)?;
    let rsvp = state.engine.record_rsvp(group_id, &user, body.answer)?;
    state.invalidate_lists();
    Ok(Json(to_value(rsvp)?))
}

pub async fn feedback<S: CrewStore + 'static, G: PaymentGateway>(
    State(state): Shared<S, G>,
    headers: HeaderMap,
    Path(group_id): Path<GroupId>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let user = auth::member(&headers)?;
    let input: FeedbackInput = required_json(&body)?;
    let feedback = state.engine.record_feedback(group_id, &user, input)?;
    state.invalidate_lists();
    Ok(Json(to_value(feedback)?))
}

// ── Payments ────────────────────────────────────────────────────────────

/// `groupId` as a number or a numeric string.
fn group_id_field(body: &Value) -> Option<GroupId> {
    let raw = body.get("groupId").or_else(|| body.get("group_id"))?;
    match raw {
        Value::Number(n) => n.as_u64().map(GroupId::new),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub async fn checkout<S: CrewStore + 'static, G: PaymentGateway>(
    State(state): Shared<S, G>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let user = auth::member(&headers)?;
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let group_id =
        group_id_field(&body).ok_or_else(|| ApiError::BadRequest("groupId required".to_string()))?;
    let session = state.checkout.create_checkout(group_id, &user).await?;
    Ok(Json(json!({
        "sessionId": session.session_id,
        "url": session.url,
    })))
}

pub async fn webhook<S: CrewStore + 'static, G: PaymentGateway>(
    State(state): Shared<S, G>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let deliveries = &state.metrics.webhook_deliveries;
    let Some(signature) = SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|v| v.to_str().ok())
    else {
        warn!("webhook delivery without signature header");
        deliveries.with_label_values(&["signature"]).inc();
        return Err(ApiError::BadRequest("missing signature header".to_string()));
    };

    let ack = match state.reconciler.handle(&body, signature) {
        Ok(ack) => ack,
        Err(e) => {
            deliveries.with_label_values(&[e.kind()]).inc();
            return Err(e.into());
        }
    };
    deliveries.with_label_values(&[ack.disposition()]).inc();

    let applied = match &ack {
        WebhookAck::Payment { applied, .. } | WebhookAck::Refund { applied } => Some(*applied),
        WebhookAck::Ignored { .. } => None,
    };
    if let Some(applied) = applied {
        state
            .metrics
            .ledger_writes
            .with_label_values(&[applied.as_str()])
            .inc();
        if applied.wrote() {
            state.invalidate_lists();
        }
    }
    if let WebhookAck::Payment {
        refund: Some(refund),
        ..
    } = ack
    {
        request_refunds(&*state, std::slice::from_ref(&refund)).await;
    }
    Ok(Json(json!({ "received": true })))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(format!("serialize response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_id_accepts_number_or_string() {
        assert_eq!(group_id_field(&json!({ "groupId": 7 })), Some(GroupId::new(7)));
        assert_eq!(group_id_field(&json!({ "groupId": "7" })), Some(GroupId::new(7)));
        assert_eq!(group_id_field(&json!({ "groupId": "seven" })), None);
        assert_eq!(group_id_field(&json!({})), None);
        assert_eq!(group_id_field(&Value::Null), None);
    }

    #[test]
    fn empty_body_reads_as_default() {
        let body: JoinQueueBody = json_body(&Bytes::from_static(b"  ")).unwrap();
        assert!(body.campus.is_none());
        assert!(json_body::<JoinQueueBody>(&Bytes::from_static(b"{")).is_err());
    }
}
