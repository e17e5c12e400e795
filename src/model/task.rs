//! # Task entities and runtime statistics.
//!
//! A [`Task`] is a unit of work bound to a resource key, carrying either a
//! queue priority or a wall-clock execution time. Its [`TaskStatus`] walks a
//! fixed lifecycle:
//!
//! ```text
//! created ──► queued ────┐
//!         └─► scheduled ─┴─► pending ──► started ──► complete | cancelled | error
//!
//! queued / scheduled / pending ──► cancelled   (removal)
//! ```
//!
//! [`TaskStat`] records one finished execution's runtime; the last few stats
//! for a key feed [`average_run_time`], the auto-priority hint.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{Collection, Document, QuerySpec};

/// Execution status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Constructed locally, not yet admitted anywhere.
    Created,
    /// Admitted to the priority queue service.
    Queued,
    /// Admitted to the timetable service.
    Scheduled,
    /// Materialized into a stage slot, awaiting an explicit start.
    Pending,
    /// Removed before starting, or terminated as cancelled.
    Cancelled,
    /// Started against its resource; the resource is locked.
    Started,
    /// Terminated with an error.
    Error,
    /// Terminated successfully.
    Complete,
}

impl TaskStatus {
    /// Stable lowercase name, identical to the wire encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "created",
            TaskStatus::Queued => "queued",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Pending => "pending",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Started => "started",
            TaskStatus::Error => "error",
            TaskStatus::Complete => "complete",
        }
    }

    /// True for the three terminal states a started task may complete into.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Complete | TaskStatus::Cancelled | TaskStatus::Error
        )
    }

    /// True for the states a task may be removed from.
    pub fn is_removable(&self) -> bool {
        matches!(
            self,
            TaskStatus::Queued | TaskStatus::Scheduled | TaskStatus::Pending
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work queued against a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Version 1 UUID assigned at construction; never mutates.
    #[serde(rename = "_key")]
    pub id: String,
    /// Resource key the task runs against.
    pub key: String,
    /// Opaque user data passed through to status-change events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    /// Queue priority; lower runs first, 0 is the lowest admissible.
    #[serde(default)]
    pub priority: f64,
    /// Wall-clock execution time; takes precedence over `priority`.
    #[serde(rename = "runAt", default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<DateTime<Utc>>,
    /// Execution status.
    pub status: TaskStatus,
}

impl Task {
    /// Creates a task in the `created` state with a fresh v1 UUID.
    pub fn new(
        key: impl Into<String>,
        meta: Option<Value>,
        priority: f64,
        run_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            created: Utc::now(),
            id: Uuid::now_v1(node_id()).to_string(),
            key: key.into(),
            meta,
            priority,
            run_at,
            status: TaskStatus::Created,
        }
    }

    /// Changes the status and persists the task in one step.
    pub async fn change_status(
        &mut self,
        tasks: &dyn Collection<Task>,
        status: TaskStatus,
    ) -> Result<(), StoreError> {
        self.status = status;
        tasks.save(self).await?;
        Ok(())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} key={} status={}", self.id, self.key, self.status)
    }
}

impl Document for Task {
    const COLLECTION: &'static str = "tasks";

    fn key(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn conflict_patch(&self) -> Value {
        serde_json::json!({ "status": self.status })
    }
}

/// One recorded task execution runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStat {
    /// Recording timestamp.
    pub created: DateTime<Utc>,
    /// Resource key the execution ran against.
    pub key: String,
    /// Run time in seconds.
    pub runtime: f64,
}

impl TaskStat {
    /// Records a runtime for the given key at the current instant.
    pub fn new(key: impl Into<String>, runtime: f64) -> Self {
        Self {
            created: Utc::now(),
            key: key.into(),
            runtime,
        }
    }
}

impl Document for TaskStat {
    const COLLECTION: &'static str = "task_stats";
    const PERSISTENT_INDEX: Option<&'static str> = Some("created");

    // Stats are append-only; the store assigns their keys.
    fn key(&self) -> Option<&str> {
        None
    }

    fn conflict_patch(&self) -> Value {
        Value::Null
    }
}

/// Averages the most recent runtimes recorded for `key`.
///
/// Considers up to the 10 newest stats by creation time. Returns 0 when no
/// stats exist; otherwise the arithmetic mean rounded to the nearest 0.05.
pub async fn average_run_time(
    stats: &dyn Collection<TaskStat>,
    key: &str,
) -> Result<f64, StoreError> {
    let recent = stats
        .query(
            QuerySpec::new()
                .filter_eq("key", key)
                .sort_desc("created")
                .limit(10),
        )
        .await?;
    if recent.is_empty() {
        return Ok(0.0);
    }
    let avg = recent.iter().map(|s| s.runtime).sum::<f64>() / recent.len() as f64;
    Ok((avg * 20.0).round() / 20.0)
}

/// Per-process node id for v1 UUID generation.
fn node_id() -> &'static [u8; 6] {
    static NODE_ID: OnceLock<[u8; 6]> = OnceLock::new();
    NODE_ID.get_or_init(rand::random)
}
