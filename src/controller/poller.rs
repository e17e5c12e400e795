//! # Stage loop: drains the remote queues into stage slots.
//!
//! A single background task polls once per second. For every registered
//! resource whose slot is empty it asks the timetable first (`next`), then
//! the priority queue (`pop`), re-fetches the winning task from persistence
//! and stages it as `pending`.
//!
//! ## Rules
//! - Polling is strictly sequential within a tick.
//! - A broker or store failure aborts that key's tick only; the loop keeps
//!   running.
//! - The loop never blocks on stage consumers: staged slots are skipped.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::ControllerError;
use crate::store::QuerySpec;

use super::Controller;

impl Controller {
    /// Starts the stage loop (spawns in background).
    ///
    /// The loop runs until `token` is cancelled.
    pub fn spawn_stage_loop(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let ctrl = self;
        tokio::spawn(async move {
            let mut tick = time::interval(Duration::from_secs(1));
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => ctrl.stage_tick().await,
                }
            }
        })
    }

    /// One polling pass over every registered resource.
    ///
    /// [`spawn_stage_loop`](Controller::spawn_stage_loop) drives this once
    /// per second; it is public so embedders and tests can step the loop
    /// deterministically.
    pub async fn stage_tick(&self) {
        let keys: Vec<String> = self.resources.iter().map(|r| r.key().clone()).collect();
        for key in keys {
            if self.stage.contains(&key) {
                continue;
            }
            if let Err(err) = self.poll_key(&key).await {
                warn!(key = %key, error = %err, "stage poll failed");
            }
        }
    }

    /// Polls both services for `key` and stages the winning task.
    async fn poll_key(&self, key: &str) -> Result<(), ControllerError> {
        let id = match self.next_scheduled(key).await? {
            Some(id) => Some(id),
            None => self.next_queued(key).await?,
        };
        let Some(id) = id else {
            return Ok(());
        };

        // the queue payload is only a reference; persistence is the source of truth
        let found = self
            .task_store
            .query(QuerySpec::new().filter_eq("_key", id.as_str()))
            .await?;
        let Some(task) = found.into_iter().next() else {
            warn!(id = %id, key = %key, "popped task missing from persistence");
            return Ok(());
        };
        self.stage_task(task, true).await
    }

    /// Next scheduled task id from the timetable, if any is due.
    async fn next_scheduled(&self, key: &str) -> Result<Option<String>, ControllerError> {
        let result = self
            .broker
            .call(&self.hosts.timetable, "next", json!({ "key": key }))
            .await
            .map_err(|e| ControllerError::Broker(e.message))?;
        Ok(staged_id(result))
    }

    /// Next queued task id from the priority queue, if any.
    async fn next_queued(&self, key: &str) -> Result<Option<String>, ControllerError> {
        let result = self
            .broker
            .call(&self.hosts.priority_queue, "pop", json!({ "key": key }))
            .await
            .map_err(|e| ControllerError::Broker(e.message))?;
        Ok(staged_id(result))
    }
}

/// Extracts the task id from a queue payload; `null` means nothing is due.
/// The timetable decorates its payload with `runAt`, which is irrelevant
/// here; only the id survives.
fn staged_id(payload: Value) -> Option<String> {
    payload
        .as_object()?
        .get("_key")
        .and_then(Value::as_str)
        .map(str::to_string)
}
