//! # Status-change events emitted by the controller.
//!
//! An [`Event`] captures one observable transition. Its `meta` payload is
//! the task's opaque user meta extended with reserved fields:
//!
//! - `_id` — the task id
//! - `_status` — the status the task transitioned into
//! - `_key` — the resource key (staging events only)
//!
//! ## Example
//! ```rust
//! use concord_controller::events::{Event, EventKind};
//! use concord_controller::model::{Task, TaskStatus};
//!
//! let task = Task::new("worker", Some(serde_json::json!({"job": "resize"})), 1.0, None);
//! let ev = Event::task_status(&task, TaskStatus::Queued).with_key(&task.key);
//!
//! assert_eq!(ev.kind, EventKind::TaskStatusChanged);
//! assert_eq!(ev.meta["_status"], serde_json::json!("queued"));
//! assert_eq!(ev.meta["_key"], serde_json::json!("worker"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{Task, TaskStatus};

/// Classification of status-change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A task moved to a new lifecycle status.
    #[serde(rename = "taskStatusChanged")]
    TaskStatusChanged,
}

/// One observable status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The kind of event.
    pub kind: EventKind,
    /// When the event occurred.
    pub created: DateTime<Utc>,
    /// Task user meta extended with the reserved `_`-prefixed fields.
    pub meta: Value,
}

impl Event {
    /// Creates an event of the given kind at the current instant.
    pub fn new(kind: EventKind, meta: Value) -> Self {
        Self {
            kind,
            created: Utc::now(),
            meta,
        }
    }

    /// Builds a `taskStatusChanged` event for a task entering `status`.
    ///
    /// The task's user meta rides along; non-object meta is replaced by an
    /// empty object before the reserved fields are added.
    pub fn task_status(task: &Task, status: TaskStatus) -> Self {
        let mut meta = match &task.meta {
            Some(Value::Object(fields)) => fields.clone(),
            _ => Map::new(),
        };
        meta.insert("_status".to_string(), Value::from(status.as_str()));
        meta.insert("_id".to_string(), Value::from(task.id.clone()));
        Self::new(EventKind::TaskStatusChanged, Value::Object(meta))
    }

    /// Also exposes the resource key as `_key` (staging events).
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        if let Value::Object(fields) = &mut self.meta {
            fields.insert("_key".to_string(), Value::from(key.into()));
        }
        self
    }
}
