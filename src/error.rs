use std::collections::BTreeMap;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    currency::{UnsupportedCurrency, supported_codes},
    exchange_rate::ConversionError,
    store::StoreError,
};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{source}")]
    InvalidCurrency {
        source: UnsupportedCurrency,
        request_id: Option<Uuid>,
    },

    #[error("{source}")]
    InvalidAmount {
        source: ConversionError,
        request_id: Option<Uuid>,
    },

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Database operation failed")]
    Database(#[from] StoreError),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<&'static str, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidCurrency { .. } => "INVALID_CURRENCY",
            ApiError::InvalidAmount { .. } => "INVALID_AMOUNT",
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Database(_) => "DATABASE_ERROR",
        }
    }

    fn details(&self) -> BTreeMap<&'static str, String> {
        let mut details = BTreeMap::new();

        match self {
            ApiError::InvalidCurrency { .. } => {
                details.insert("supported_currencies", supported_codes().join(", "));
            }
            ApiError::Database(e) => {
                details.insert("error", e.to_string());
            }
            _ => {}
        }

        details
    }

    fn request_id(&self) -> Option<Uuid> {
        match self {
            ApiError::InvalidCurrency { request_id, .. }
            | ApiError::InvalidAmount { request_id, .. } => *request_id,
            _ => None,
        }
    }

    pub fn body(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
                timestamp: Utc::now().to_rfc3339(),
                details: self.details(),
                request_id: self.request_id(),
            },
        }
    }
}

impl From<UnsupportedCurrency> for ApiError {
    fn from(source: UnsupportedCurrency) -> Self {
        ApiError::InvalidCurrency {
            source,
            request_id: None,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidCurrency { .. }
            | ApiError::InvalidAmount { .. }
            | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Database(e) => log::error!("Request failed: {e}"),
            other => log::warn!("Request rejected: {other}"),
        }

        HttpResponse::build(self.status_code()).json(self.body())
    }
}
