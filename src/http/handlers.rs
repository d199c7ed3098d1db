//! Storage value REST handlers.
//!
//! `GET  /api/v1/storage/value` → `{"value": "<decimal>"}`
//! `POST /api/v1/storage/value` `{"value": "<decimal>"}` → `{"message", "tx_hash", "block_number"}`

use alloy::primitives::U256;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::blockchain::ChainConnection;
use crate::http::server::AppState;
use crate::storage::StorageBinding;

#[derive(Debug, Serialize, Deserialize)]
pub struct ValueResponse {
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetValueRequest {
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetValueResponse {
    pub message: String,
    pub tx_hash: String,
    pub block_number: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

/// Parse a non-negative decimal integer that fits in 256 bits.
pub fn parse_value(raw: &str) -> Option<U256> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_str_radix(raw, 10).ok()
}

pub async fn get_value<C, B>(State(state): State<AppState<C, B>>) -> Response
where
    C: ChainConnection + 'static,
    B: StorageBinding + 'static,
{
    match state.interactor.read_value().await {
        Ok(value) => Json(ValueResponse {
            value: value.to_string(),
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to read stored value");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn set_value<C, B>(
    State(state): State<AppState<C, B>>,
    payload: Result<Json<SetValueRequest>, JsonRejection>,
) -> Response
where
    C: ChainConnection + 'static,
    B: StorageBinding + 'static,
{
    let Ok(Json(request)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
    };
    let Some(value) = parse_value(&request.value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid number format");
    };

    match state.interactor.write_value_within(value, state.write_deadline).await {
        Ok(receipt) => Json(SetValueResponse {
            message: "Value updated successfully".to_string(),
            tx_hash: receipt.tx_hash.to_string(),
            block_number: receipt.block_number,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind(), "Failed to write stored value");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42"), Some(U256::from(42)));
        assert_eq!(parse_value(" 7 "), Some(U256::from(7)));
        assert_eq!(parse_value("0"), Some(U256::ZERO));
        assert_eq!(
            parse_value(&U256::MAX.to_string()),
            Some(U256::MAX)
        );
    }

    #[test]
    fn test_parse_value_rejects_bad_input() {
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("-1"), None);
        assert_eq!(parse_value("+1"), None);
        assert_eq!(parse_value("0x10"), None);
        assert_eq!(parse_value("1.5"), None);
        // 2^256 does not fit
        assert_eq!(
            parse_value("115792089237316195423570985008687907853269984665640564039457584007913129639936"),
            None
        );
    }
}
