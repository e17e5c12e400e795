//! # concord-controller
//!
//! **Concord controller** is the coordination core of the concord
//! distributed task execution service.
//!
//! Clients submit tasks bound to a named *resource*. The controller admits
//! each task into the priority queue (immediate, priority-ordered) or the
//! timetable (wall-clock scheduled), drains both services back through a
//! background stage loop, and hands tasks to workers one resource at a
//! time: at most one started task per resource.
//!
//! ## Features
//!
//! | Area            | Description                                             | Key types / traits            |
//! |-----------------|---------------------------------------------------------|-------------------------------|
//! | **Lifecycle**   | Admission, staging, start, completion, removal.         | [`Controller`]                |
//! | **Model**       | Tasks, resources, run-time statistics.                  | [`Task`], [`Resource`]        |
//! | **Persistence** | Typed document collections with swappable backends.     | [`Collection`], [`Document`]  |
//! | **Broker**      | One-shot JSON-RPC calls to sibling services.            | [`ServiceBroker`]             |
//! | **Events**      | Best-effort status-change notifications.                | [`Event`], [`Notifier`]       |
//! | **RPC**         | JSON-RPC 2.0 over HTTP at `/rpc`.                       | [`ApiV1`], [`rpc::serve`]     |
//! | **Config**      | Environment read once at boot.                          | [`Config`]                    |
//!
//! ## Lifecycle
//! ```text
//! addTask ──► queued / scheduled ──► pending ──► started ──► complete
//!                     │                 │                     cancelled
//!                     └── removeTask ───┘                     error
//! ```
//!
//! [`Collection`]: store::Collection
//! [`Document`]: store::Document
//! [`Event`]: events::Event
//! [`Notifier`]: events::Notifier
//! [`Task`]: model::Task
//! [`Resource`]: model::Resource

pub mod broker;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod model;
pub mod rpc;
pub mod store;

#[cfg(test)]
mod testutil;

// ---- Public re-exports ----

pub use broker::{JsonRpcBroker, ServiceBroker};
pub use config::Config;
pub use controller::Controller;
pub use error::{ControllerError, StoreError};
pub use rpc::ApiV1;
