//! Transport boundary for an HTTP layer.
//!
//! Handlers take raw request pieces and return a status code plus a JSON
//! body; wiring them to a concrete server is left to the caller.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, warn};

use crate::core::message::NewMessage;
use crate::error::ChatError;
use crate::sync::coordinator::SyncCoordinator;
use crate::sync::query::QueryFacade;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    fn from_error(err: &ChatError) -> Self {
        let status = err.http_status();
        if status >= 500 {
            error!(error = %err, "request failed");
        } else {
            warn!(error = %err, status, "request rejected");
        }
        Self {
            status,
            body: json!({ "error": err.to_string() }),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Acknowledgement returned for an accepted message.
#[derive(Debug, Clone, Serialize)]
struct PostAck<'a> {
    id: i64,
    sync_status: &'a str,
    commit_ref: Option<&'a str>,
}

/// `POST /messages` with a `{content, sender}` JSON body.
///
/// A replica failure still answers 201; the status shows up in
/// `sync_status`.
pub fn handle_post(coordinator: &SyncCoordinator, body: &[u8]) -> ApiResponse {
    let input = match NewMessage::from_json(body) {
        Ok(input) => input,
        Err(err) => return ApiResponse::from_error(&err),
    };
    match coordinator.submit_new(&input) {
        Ok(message) => {
            let ack = PostAck {
                id: message.id,
                sync_status: message.sync_status.as_str(),
                commit_ref: message.commit_ref.as_deref(),
            };
            match serde_json::to_value(ack) {
                Ok(body) => ApiResponse::ok(201, body),
                Err(err) => ApiResponse::from_error(&err.into()),
            }
        }
        Err(err) => ApiResponse::from_error(&err),
    }
}

/// `GET /messages?limit=N&before_id=M`.
pub fn handle_get(queries: &QueryFacade, query_string: &str) -> ApiResponse {
    let params = match parse_read_params(query_string) {
        Ok(params) => params,
        Err(err) => return ApiResponse::from_error(&err),
    };
    match queries.recent(params.limit, params.before_id) {
        Ok(messages) => match serde_json::to_value(&messages) {
            Ok(body) => ApiResponse::ok(200, body),
            Err(err) => ApiResponse::from_error(&err.into()),
        },
        Err(err) => ApiResponse::from_error(&err),
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ReadParams {
    limit: Option<i64>,
    before_id: Option<i64>,
}

fn parse_read_params(query_string: &str) -> Result<ReadParams, ChatError> {
    let mut params = ReadParams::default();
    let query = query_string.trim_start_matches('?');
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, raw) = pair.split_once('=').unwrap_or((pair, ""));
        let value = urlencoding::decode(raw)
            .map_err(|err| ChatError::Validation(format!("invalid encoding for {key}: {err}")))?;
        match key {
            "limit" if value.trim().is_empty() => params.limit = None,
            "limit" => params.limit = Some(parse_int(key, &value)?),
            "before_id" if value.is_empty() || value == "null" => params.before_id = None,
            "before_id" => params.before_id = Some(parse_int(key, &value)?),
            _ => {}
        }
    }
    Ok(params)
}

fn parse_int(key: &str, value: &str) -> Result<i64, ChatError> {
    value
        .trim()
        .parse()
        .map_err(|_| ChatError::Validation(format!("{key} must be an integer, got {value:?}")))
}
