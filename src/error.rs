//! # Error types used by the controller and its persistence layer.
//!
//! This module defines two error enums:
//!
//! - [`ControllerError`] protocol and state-machine errors raised by
//!   controller operations. Display strings are part of the wire contract:
//!   they travel verbatim in the `data` field of RPC error objects.
//! - [`StoreError`] failures raised by the persistence facade.
//!
//! Both types provide `as_label` helpers for logs.

use thiserror::Error;

/// # Errors produced by controller operations.
///
/// Variant display strings are stable protocol messages; clients match on
/// them, so they never change casing or wording.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ControllerError {
    /// No task is staged for the requested resource key.
    #[error("no staged task")]
    NoStagedTask,

    /// The status-change notifier rejected the event.
    #[error("notification failed")]
    NotificationFailed,

    /// The priority queue service reported an error; carries the remote
    /// message normalized to lowercase.
    #[error("{message}")]
    QueueNotFound { message: String },

    /// The timetable service reported an error; carries the remote message
    /// normalized to lowercase.
    #[error("{message}")]
    TimetableNotFound { message: String },

    /// The resource exists and cannot be registered twice.
    #[error("resource exists")]
    ResourceExists,

    /// The resource is locked by a started task.
    #[error("resource unavailable")]
    ResourceUnavailable,

    /// The remote service rejected the enqueue of a new task.
    #[error("task add failed")]
    TaskAddFailed,

    /// The task is not in a removable state, or the remote dequeue failed.
    #[error("task remove failed")]
    TaskRemoveFailed,

    /// A second start was attempted for a task that already started.
    #[error("task already started")]
    TaskAlreadyStarted,

    /// No task with the requested id exists.
    #[error("task not found")]
    TaskNotFound,

    /// The task is not in the started state.
    #[error("task not started")]
    TaskNotStarted,

    /// A broker round-trip failed; carries the broker's error message.
    #[error("{0}")]
    Broker(String),

    /// The persistence layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ControllerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControllerError::NoStagedTask => "no_staged_task",
            ControllerError::NotificationFailed => "notification_failed",
            ControllerError::QueueNotFound { .. } => "queue_not_found",
            ControllerError::TimetableNotFound { .. } => "timetable_not_found",
            ControllerError::ResourceExists => "resource_exists",
            ControllerError::ResourceUnavailable => "resource_unavailable",
            ControllerError::TaskAddFailed => "task_add_failed",
            ControllerError::TaskRemoveFailed => "task_remove_failed",
            ControllerError::TaskAlreadyStarted => "task_already_started",
            ControllerError::TaskNotFound => "task_not_found",
            ControllerError::TaskNotStarted => "task_not_started",
            ControllerError::Broker(_) => "broker_call_failed",
            ControllerError::Store(_) => "store_failed",
        }
    }

    /// Indicates whether the error is a state-machine violation (as opposed
    /// to a lookup miss or an external failure).
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            ControllerError::NoStagedTask
                | ControllerError::ResourceExists
                | ControllerError::ResourceUnavailable
                | ControllerError::TaskRemoveFailed
                | ControllerError::TaskAlreadyStarted
                | ControllerError::TaskNotStarted
        )
    }
}

/// # Errors produced by the persistence facade.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    /// The document was not found in its collection.
    #[error("document not found")]
    NotFound,

    /// The entity carries no primary key and cannot be patched or removed.
    #[error("document has no key")]
    MissingKey,

    /// The database rejected the request.
    #[error("database error ({status}): {message}")]
    Database { status: u16, message: String },

    /// The HTTP round-trip to the database failed.
    #[error("database transport: {0}")]
    Transport(#[from] reqwest::Error),

    /// A document failed to encode or decode.
    #[error("document codec: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::NotFound => "store_not_found",
            StoreError::MissingKey => "store_missing_key",
            StoreError::Database { .. } => "store_database",
            StoreError::Transport(_) => "store_transport",
            StoreError::Codec(_) => "store_codec",
        }
    }
}
