use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::services::availability_service::Verdict;
use crate::services::lifecycle_service::CancelRefusal;

/// Failure reported by the marketplace backend, classified by its
/// structured error code and HTTP status.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("not enough capacity left")]
    CapacityExceeded,
    #[error("activity already booked by this user")]
    AlreadyBooked,
    #[error("actor is not allowed to perform this action")]
    ActorNotAllowed,
    #[error("resource not found")]
    NotFound,
    #[error("not authenticated")]
    Unauthorized,
    #[error("upstream returned {status}")]
    Upstream {
        status: StatusCode,
        body: Option<Value>,
    },
    #[error("transport failure calling {url}: {detail}")]
    Transport { url: String, detail: String },
    #[error("could not decode response from {url}: {detail}")]
    Decode { url: String, detail: String },
}

impl ApiError {
    /// Maps a non-2xx response onto an error kind. Only the machine-readable
    /// `code` field and the status are consulted, never the message text.
    pub fn from_response(status: StatusCode, body: Option<Value>) -> Self {
        let code = body
            .as_ref()
            .and_then(|b| b.get("code").or_else(|| b.get("error_code")))
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_ascii_uppercase());

        match code.as_deref() {
            Some("CAPACITY_EXCEEDED") => return ApiError::CapacityExceeded,
            Some("ALREADY_BOOKED") => return ApiError::AlreadyBooked,
            Some("ACTOR_NOT_ALLOWED") => return ApiError::ActorNotAllowed,
            Some("NOT_FOUND") => return ApiError::NotFound,
            _ => {}
        }

        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::FORBIDDEN => ApiError::ActorNotAllowed,
            StatusCode::NOT_FOUND => ApiError::NotFound,
            _ => ApiError::Upstream { status, body },
        }
    }

    pub fn notice(&self) -> Notice {
        match self {
            ApiError::CapacityExceeded => Notice::new(
                NoticeKind::Capacity,
                "Not enough spots left for this activity anymore.",
            ),
            ApiError::AlreadyBooked => Notice::new(
                NoticeKind::Validation,
                "You have already booked this activity.",
            ),
            ApiError::ActorNotAllowed => Notice::new(
                NoticeKind::Authorization,
                "Your account is not allowed to do this.",
            ),
            ApiError::NotFound => {
                Notice::new(NoticeKind::Transport, "This item no longer exists.")
            }
            ApiError::Unauthorized => {
                Notice::new(NoticeKind::Authorization, "Please log in again.")
            }
            ApiError::Upstream { .. } | ApiError::Transport { .. } | ApiError::Decode { .. } => {
                Notice::new(
                    NoticeKind::Transport,
                    "Something went wrong. Please try again.",
                )
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum BookingError {
    #[error("booking refused before sending: {0:?}")]
    Unavailable(Verdict),
    #[error("cancellation refused: {0:?}")]
    CancelRefused(CancelRefusal),
    #[error("a request for this item is already pending")]
    AlreadyPending,
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl BookingError {
    pub fn notice(&self) -> Notice {
        match self {
            BookingError::Unavailable(verdict) => verdict.notice(),
            BookingError::CancelRefused(refusal) => refusal.notice(),
            BookingError::AlreadyPending => Notice::new(
                NoticeKind::Validation,
                "Your previous request is still being processed.",
            ),
            BookingError::Api(e) => e.notice(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("signal store failure: {0}")]
    Store(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Validation,
    Capacity,
    Authorization,
    Transport,
}

/// A dismissible, non-fatal message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
