//! The uniform response envelope and error taxonomy of the control surface.
//!
//! Every reply carries `{error_code, message, api_version, data_type, data}`.
//! Batch endpoints report each entry's outcome independently; the top-level
//! `error_code` becomes `Multiple` when any entry failed and `data` carries
//! the per-entry results plus the failing keys.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Version stamped into every envelope.
pub const API_VERSION: f32 = 0.1;

/// Error codes clients can match on without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "General_error")]
    GeneralError,
    #[serde(rename = "Json_parse_error")]
    JsonParseError,
    #[serde(rename = "Json_type_error")]
    JsonTypeError,
    #[serde(rename = "Multiple")]
    Multiple,
    #[serde(rename = "Already_started")]
    AlreadyStarted,
    #[serde(rename = "Not_found")]
    NotFound,
    #[serde(rename = "Agent_not_implemented")]
    AgentNotImplemented,
    #[serde(rename = "Agent_config_error")]
    AgentConfigError,
    #[serde(rename = "Subscriber_config_error")]
    SubscriberConfigError,
}

impl ErrorCode {
    /// Advisory HTTP status for the code.
    fn http_status(self) -> StatusCode {
        match self {
            ErrorCode::JsonParseError
            | ErrorCode::JsonTypeError
            | ErrorCode::AlreadyStarted
            | ErrorCode::AgentConfigError
            | ErrorCode::SubscriberConfigError => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound | ErrorCode::AgentNotImplemented => StatusCode::NOT_FOUND,
            ErrorCode::GeneralError => StatusCode::INTERNAL_SERVER_ERROR,
            // partial success still answers 200
            ErrorCode::Multiple => StatusCode::OK,
        }
    }
}

/// Shape of `data` in batch replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResponseType {
    #[serde(rename = "Data")]
    Data,
    #[serde(rename = "Multiple_stringmap")]
    MultipleStringmap,
    #[serde(rename = "Multiple_pairlist")]
    MultiplePairlist,
    #[serde(rename = "Multiple_barelist")]
    MultipleBarelist,
}

/// The reply wrapper used by every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub error_code: Option<ErrorCode>,
    pub message: String,
    pub api_version: f32,
    pub data_type: Option<ResponseType>,
    pub data: Value,
}

impl Envelope {
    /// Success with a payload.
    pub fn data(message: impl Into<String>, data: impl Serialize) -> Self {
        Self {
            error_code: None,
            message: message.into(),
            api_version: API_VERSION,
            data_type: Some(ResponseType::Data),
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }

    /// Success without a payload.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            error_code: None,
            message: message.into(),
            api_version: API_VERSION,
            data_type: None,
            data: Value::Null,
        }
    }

    /// Failure with an error code.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_code: Some(code),
            message: message.into(),
            api_version: API_VERSION,
            data_type: None,
            data: Value::Null,
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status = self
            .error_code
            .map(ErrorCode::http_status)
            .unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

// =============================================================================
// Batch replies
// =============================================================================

/// Outcome of one entry in a batch request.
#[derive(Debug, Clone)]
pub enum EntryOutcome {
    Ok(Value),
    Err(ErrorCode, String),
}

impl EntryOutcome {
    pub fn ok(value: impl Serialize) -> Self {
        EntryOutcome::Ok(serde_json::to_value(value).unwrap_or(Value::Null))
    }

    fn is_err(&self) -> bool {
        matches!(self, EntryOutcome::Err(..))
    }

    fn to_value(&self) -> Value {
        match self {
            EntryOutcome::Ok(value) => value.clone(),
            EntryOutcome::Err(code, message) => json!({
                "error_code": code,
                "message": message,
            }),
        }
    }
}

fn multi_envelope(
    results: Value,
    failed: Vec<Value>,
    data_type: ResponseType,
    any_failed: bool,
) -> Envelope {
    Envelope {
        error_code: any_failed.then_some(ErrorCode::Multiple),
        message: if any_failed {
            "some entries failed".to_string()
        } else {
            "success".to_string()
        },
        api_version: API_VERSION,
        data_type: Some(data_type),
        data: json!({ "results": results, "failed": failed }),
    }
}

/// Batch reply where each result's position mirrors the request list.
pub fn barelist(entries: Vec<EntryOutcome>) -> Envelope {
    let any_failed = entries.iter().any(EntryOutcome::is_err);
    let failed: Vec<Value> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_err())
        .map(|(i, _)| json!(i))
        .collect();
    let results: Vec<Value> = entries.iter().map(EntryOutcome::to_value).collect();
    multi_envelope(json!(results), failed, ResponseType::MultipleBarelist, any_failed)
}

/// Batch reply as a list of `[key, result]` pairs.
pub fn pairlist(entries: Vec<(String, EntryOutcome)>) -> Envelope {
    let any_failed = entries.iter().any(|(_, e)| e.is_err());
    let failed: Vec<Value> = entries
        .iter()
        .filter(|(_, e)| e.is_err())
        .map(|(k, _)| json!(k))
        .collect();
    let results: Vec<Value> = entries
        .iter()
        .map(|(k, e)| json!([k, e.to_value()]))
        .collect();
    multi_envelope(json!(results), failed, ResponseType::MultiplePairlist, any_failed)
}

/// Batch reply as a string-keyed map.
pub fn stringmap(entries: Vec<(String, EntryOutcome)>) -> Envelope {
    let any_failed = entries.iter().any(|(_, e)| e.is_err());
    let failed: Vec<Value> = entries
        .iter()
        .filter(|(_, e)| e.is_err())
        .map(|(k, _)| json!(k))
        .collect();
    let results: serde_json::Map<String, Value> = entries
        .iter()
        .map(|(k, e)| (k.clone(), e.to_value()))
        .collect();
    multi_envelope(
        Value::Object(results),
        failed,
        ResponseType::MultipleStringmap,
        any_failed,
    )
}

// =============================================================================
// Request parsing
// =============================================================================

/// Parse a request body, mapping failures onto the envelope taxonomy.
pub fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, Envelope> {
    serde_json::from_str(body)
        .map_err(|e| Envelope::error(ErrorCode::JsonParseError, e.to_string()))
}

/// Parse an optional request body; an empty body yields the default.
pub fn parse_body_or_default<T: DeserializeOwned + Default>(body: &str) -> Result<T, Envelope> {
    if body.trim().is_empty() {
        return Ok(T::default());
    }
    parse_body(body)
}
