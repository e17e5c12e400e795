//! # Method parameter decoding.
//!
//! Every method accepts its parameters **named** (a JSON object) or
//! **positional** (a JSON array). Missing or mistyped parameters produce a
//! standard invalid-params error (`-32602`) with a human-readable reason in
//! `data`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::model::TaskStatus;

use super::protocol::ErrorObject;

/// Parameters for `addResource`.
#[derive(Debug)]
pub(super) struct AddResourceParams {
    pub name: String,
}

impl AddResourceParams {
    pub fn parse(params: Option<&Value>) -> Result<Self, ErrorObject> {
        let name = match params {
            Some(Value::Array(args)) => positional_str(args, 0, "name")?,
            other => named_str(other, "name")?,
        };
        Ok(Self { name })
    }
}

/// Parameters for `addTask`.
#[derive(Debug)]
pub(super) struct AddTaskParams {
    pub key: String,
    pub meta: Option<Value>,
    pub priority: Option<f64>,
    pub run_at: Option<DateTime<Utc>>,
}

impl AddTaskParams {
    pub fn parse(params: Option<&Value>) -> Result<Self, ErrorObject> {
        #[derive(Deserialize, Default)]
        struct Named {
            key: Option<String>,
            meta: Option<Value>,
            priority: Option<f64>,
            #[serde(rename = "runAt")]
            run_at: Option<String>,
        }

        let named = match params {
            Some(Value::Array(args)) => {
                if args.len() < 4 {
                    return Err(ErrorObject::invalid_params(
                        "key, meta, priority, and runAt parameters are required",
                    ));
                }
                Named {
                    key: Some(positional_str(args, 0, "key")?),
                    meta: match &args[1] {
                        Value::Object(_) => Some(args[1].clone()),
                        _ => return Err(ErrorObject::invalid_params("meta must be an object")),
                    },
                    priority: match &args[2] {
                        Value::Number(n) => n.as_f64(),
                        _ => return Err(ErrorObject::invalid_params("priority must be a number")),
                    },
                    run_at: match &args[3] {
                        // positional calls pass an empty string for "unscheduled"
                        Value::String(s) if s.is_empty() => None,
                        Value::String(s) => Some(s.clone()),
                        _ => return Err(ErrorObject::invalid_params("runAt must be a string")),
                    },
                }
            }
            Some(Value::Object(_)) => serde_json::from_value(params.cloned().unwrap_or_default())
                .map_err(|e| ErrorObject::invalid_params(e.to_string()))?,
            _ => Named::default(),
        };

        let Some(key) = named.key else {
            return Err(ErrorObject::invalid_params("key is required"));
        };
        if named.priority.is_none() && named.run_at.is_none() {
            return Err(ErrorObject::invalid_params("priority or runAt is required"));
        }
        let run_at = match named.run_at {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|_| ErrorObject::invalid_params("runAt must be an RFC3339 instant"))?,
            ),
            None => None,
        };

        Ok(Self {
            key,
            meta: named.meta,
            priority: named.priority,
            run_at,
        })
    }
}

/// Parameters for `completeTask`.
#[derive(Debug)]
pub(super) struct CompleteTaskParams {
    pub id: String,
    pub status: TaskStatus,
}

impl CompleteTaskParams {
    pub fn parse(params: Option<&Value>) -> Result<Self, ErrorObject> {
        let (id, status) = match params {
            Some(Value::Array(args)) => {
                if args.len() != 2 {
                    return Err(ErrorObject::invalid_params(
                        "id, status parameters are required",
                    ));
                }
                (
                    positional_str(args, 0, "id")?,
                    positional_str(args, 1, "status")?,
                )
            }
            other => (named_str(other, "id")?, named_str(other, "status")?),
        };

        let status: TaskStatus = serde_json::from_value(Value::from(status))
            .map_err(|_| terminal_status_error())?;
        if !status.is_terminal() {
            return Err(terminal_status_error());
        }
        Ok(Self { id, status })
    }
}

fn terminal_status_error() -> ErrorObject {
    ErrorObject::invalid_params("status must be one of complete, cancelled, error")
}

/// Single-string parameter shared by `startTask`, `getTask`,
/// `listPriorityQueue`, `listTimetable` and `removeTask`.
#[derive(Debug)]
pub(super) struct KeyParams {
    pub value: String,
}

impl KeyParams {
    pub fn parse(params: Option<&Value>, field: &str) -> Result<Self, ErrorObject> {
        let value = match params {
            Some(Value::Array(args)) => positional_str(args, 0, field)?,
            other => named_str(other, field)?,
        };
        Ok(Self { value })
    }
}

fn named_str(params: Option<&Value>, field: &str) -> Result<String, ErrorObject> {
    params
        .and_then(|p| p.get(field))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ErrorObject::invalid_params(format!("{field} is required")))
}

fn positional_str(args: &[Value], index: usize, field: &str) -> Result<String, ErrorObject> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ErrorObject::invalid_params(format!("{field} parameter is required")))
}
