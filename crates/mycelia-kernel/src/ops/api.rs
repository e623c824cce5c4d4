//! `/v1` message API.
//!
//! Publish/send intake uses the core `Envelope`; subscribers poll their inbox
//! over HTTP.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use mycelia_core::error::MyceliaError;
use mycelia_core::message::{Envelope, Message, Payload};

use crate::app_state::AppState;
use crate::bench::BenchSuite;
use crate::kernel::{PublishReport, QoS};

const MAX_POLL: usize = 1000;

/// Error wrapper mapping kernel errors to HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub MyceliaError);

impl From<MyceliaError> for ApiError {
    fn from(e: MyceliaError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            MyceliaError::BadRequest(_) | MyceliaError::UnsupportedVersion => StatusCode::BAD_REQUEST,
            MyceliaError::NotAllowed(m) if m == "draining" => StatusCode::SERVICE_UNAVAILABLE,
            MyceliaError::NotAllowed(_) => StatusCode::FORBIDDEN,
            MyceliaError::NoRoute(_) => StatusCode::NOT_FOUND,
            MyceliaError::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            MyceliaError::QueueClosed => StatusCode::GONE,
            MyceliaError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            MyceliaError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "api request failed");
        }
        let body = json!({ "code": self.0.code().as_str(), "msg": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn decode(body: &str) -> ApiResult<Message> {
    Ok(Envelope::from_json(body)?.into_message()?)
}

/// `POST /v1/publish` (Lossy fan-out).
pub async fn publish(State(state): State<AppState>, body: String) -> ApiResult<Json<PublishReport>> {
    let msg = decode(&body)?;
    let report = state.kernel().publish(msg, QoS::Lossy).await?;
    Ok(Json(report))
}

/// `POST /v1/send` (point-to-point).
pub async fn send(State(state): State<AppState>, body: String) -> ApiResult<StatusCode> {
    let msg = decode(&body)?;
    state.kernel().send(msg).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscribeReq {
    pub subscriber: String,
    pub pattern: String,
}

/// `POST /v1/subscriptions`
pub async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeReq>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if req.subscriber.trim().is_empty() {
        return Err(MyceliaError::BadRequest("subscriber must not be empty".into()).into());
    }
    let (id, _) = state.kernel().subscribe(&req.subscriber, &req.pattern)?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id.0 }))))
}

/// `DELETE /v1/subscriptions/:subscriber`
pub async fn remove_subscriber(
    State(state): State<AppState>,
    Path(subscriber): Path<String>,
) -> Json<Value> {
    let removed = state.kernel().remove_subscriber(&subscriber);
    Json(json!({ "removed": removed }))
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    #[serde(default = "default_poll_max")]
    pub max: usize,
}

fn default_poll_max() -> usize {
    100
}

#[derive(Debug, Serialize)]
pub struct PolledMessage {
    pub id: u64,
    pub path: String,
    pub scopes: Vec<String>,
    pub data: Value,
}

impl From<Message> for PolledMessage {
    fn from(m: Message) -> Self {
        let data = match m.payload {
            Payload::Json(v) => v,
            Payload::Bytes(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
            Payload::Empty => Value::Null,
        };
        Self {
            id: m.id.0,
            path: m.path,
            scopes: m.scopes,
            data,
        }
    }
}

/// `GET /v1/subscriptions/:subscriber/messages?max=N`
pub async fn poll(
    State(state): State<AppState>,
    Path(subscriber): Path<String>,
    Query(q): Query<PollQuery>,
) -> ApiResult<Json<Vec<PolledMessage>>> {
    let inbox = state
        .kernel()
        .subscriptions()
        .inbox(&subscriber)
        .ok_or_else(|| MyceliaError::NoRoute(format!("unknown subscriber: {subscriber}")))?;
    let batch = inbox.dequeue_batch(q.max.clamp(1, MAX_POLL));
    Ok(Json(batch.into_iter().map(PolledMessage::from).collect()))
}

/// `GET /v1/report`
pub async fn report(State(state): State<AppState>) -> Response {
    match state.last_report() {
        Some(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
            text.to_string(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "no bench report yet").into_response(),
    }
}

/// `POST /v1/bench`: run the suite on a private kernel and keep the report.
pub async fn bench(State(state): State<AppState>) -> ApiResult<Response> {
    let report = BenchSuite::new(state.cfg()).run().await?;
    let text = report.render();
    state.set_report(text.clone());
    Ok((
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        text,
    )
        .into_response())
}
