use std::future::Future;

use axum::{
    http::{header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use livepoll_common::protocol::ws::WsMessage;
use serde_json::json;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Registry of error codes exposed on both the REST and WebSocket surfaces.
///
/// Every engine failure is one of these; all are recoverable by the caller
/// and none of them crashes the engine or touches other connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationFailed,
    PollConflict,
    NoActivePoll,
    DuplicateAnswer,
    InvalidOption,
    NotFound,
    EngineSafeMode,
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::PollConflict => "POLL_CONFLICT",
            Self::NoActivePoll => "NO_ACTIVE_POLL",
            Self::DuplicateAnswer => "DUPLICATE_ANSWER",
            Self::InvalidOption => "INVALID_OPTION",
            Self::NotFound => "NOT_FOUND",
            Self::EngineSafeMode => "ENGINE_SAFE_MODE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            Self::ValidationFailed => StatusCode::BAD_REQUEST,
            Self::PollConflict => StatusCode::CONFLICT,
            Self::NoActivePoll => StatusCode::CONFLICT,
            Self::DuplicateAnswer => StatusCode::CONFLICT,
            Self::InvalidOption => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::EngineSafeMode => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn retryable(self) -> bool {
        matches!(self, Self::InternalError)
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ValidationFailed => "request validation failed",
            Self::PollConflict => "poll lifecycle precondition violated",
            Self::NoActivePoll => "no poll is currently active",
            Self::DuplicateAnswer => "respondent has already answered this poll",
            Self::InvalidOption => "option is not part of the active poll",
            Self::NotFound => "requested resource not found",
            Self::EngineSafeMode => "engine is in safe mode and rejects new polls",
            Self::InternalError => "internal server error",
        }
    }
}

/// Recoverable engine failures, reported only to the originating caller.
///
/// Validation happens before any mutation, so a returned error guarantees
/// shared state was left untouched.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PollError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("no poll is currently active")]
    NoActivePoll,
    #[error("respondent has already answered this poll")]
    DuplicateAnswer,
    #[error("option {0:?} is not part of the active poll")]
    InvalidOption(String),
    #[error("unknown respondent")]
    UnknownRespondent,
    #[error("engine is in safe mode and rejects new polls")]
    SafeMode,
}

impl PollError {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::Conflict(_) => ErrorCode::PollConflict,
            Self::NoActivePoll => ErrorCode::NoActivePoll,
            Self::DuplicateAnswer => ErrorCode::DuplicateAnswer,
            Self::InvalidOption(_) => ErrorCode::InvalidOption,
            Self::UnknownRespondent => ErrorCode::NotFound,
            Self::SafeMode => ErrorCode::EngineSafeMode,
        }
    }

    /// The `rejected` frame sent back over the WebSocket channel.
    pub fn to_ws_rejection(&self) -> WsMessage {
        let code = self.code();
        WsMessage::Rejected {
            code: code.as_str().to_string(),
            message: self.to_string(),
            retryable: code.retryable(),
        }
    }
}

impl IntoResponse for PollError {
    fn into_response(self) -> Response {
        ApiError::new(self.code(), self.to_string()).into_response()
    }
}

/// Structured REST error envelope.
#[derive(Debug, Clone)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    request_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), request_id: None }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = self.request_id.or_else(current_request_id);

        let mut response = (
            self.code.status(),
            Json(json!({
                "error": {
                    "code": self.code.as_str(),
                    "message": self.message,
                    "retryable": self.code.retryable(),
                    "request_id": request_id.clone(),
                }
            })),
        )
            .into_response();

        if let Some(request_id) = request_id {
            attach_request_id_header(&mut response, &request_id);
        }

        response
    }
}

pub async fn with_request_id_scope<F>(request_id: String, future: F) -> F::Output
where
    F: Future,
{
    REQUEST_ID.scope(request_id, future).await
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(Clone::clone).ok()
}

pub fn request_id_from_headers_or_generate(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn attach_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(header) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
}
