//! # Controller core: the task lifecycle state machine.
//!
//! The [`Controller`] owns the in-memory resource map and the stage
//! registry, and orchestrates every lifecycle operation against its
//! collaborators: the service broker for remote effects, the persistence
//! facade for durability, and the notifier for status-change events.
//!
//! ## Architecture
//! ```text
//! RPC surface ──► Controller
//!                    ├──► broker ──► priority queue / timetable
//!                    ├──► task / resource / stat collections
//!                    ├──► stage registry (per-resource slots)
//!                    └──► notifier (best-effort, after persist)
//! ```
//!
//! ## Rules
//! - External enqueues happen **before** any local persist, so a client
//!   retry after a remote failure is safe.
//! - Notification failures are logged and swallowed; the transition that
//!   preceded them stands.
//! - A resource is locked exactly while one started task references it;
//!   only [`Controller::complete_task`] frees it.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::broker::ServiceBroker;
use crate::config::ServiceHosts;
use crate::error::ControllerError;
use crate::events::{Event, Notifier};
use crate::model::{self, Resource, ResourceStatus, Task, TaskStat, TaskStatus};
use crate::store::{Collection, QuerySpec};

use super::stage::StageRegistry;

/// Coordinates task progression and resource allocation.
pub struct Controller {
    pub(super) hosts: ServiceHosts,
    pub(super) broker: Arc<dyn ServiceBroker>,
    notifier: Notifier,
    pub(super) task_store: Arc<dyn Collection<Task>>,
    resource_store: Arc<dyn Collection<Resource>>,
    stat_store: Arc<dyn Collection<TaskStat>>,
    /// Registered resources; the authoritative lock state.
    pub(super) resources: DashMap<String, Resource>,
    /// Per-resource hand-off slots.
    pub(super) stage: StageRegistry,
}

impl Controller {
    /// Creates a controller wired to its collaborators.
    pub fn new(
        hosts: ServiceHosts,
        broker: Arc<dyn ServiceBroker>,
        task_store: Arc<dyn Collection<Task>>,
        resource_store: Arc<dyn Collection<Resource>>,
        stat_store: Arc<dyn Collection<TaskStat>>,
    ) -> Arc<Self> {
        let notifier = Notifier::new(hosts.notifier.clone(), Arc::clone(&broker));
        Arc::new(Self {
            hosts,
            broker,
            notifier,
            task_store,
            resource_store,
            stat_store,
            resources: DashMap::new(),
            stage: StageRegistry::new(),
        })
    }

    /// Registers a resource for management and persists it.
    pub async fn add_resource(&self, name: &str) -> Result<(), ControllerError> {
        let resource = match self.resources.entry(name.to_string()) {
            Entry::Occupied(_) => return Err(ControllerError::ResourceExists),
            Entry::Vacant(vacant) => vacant.insert(Resource::new(name)).clone(),
        };
        self.resource_store.save(&resource).await?;
        info!(resource = name, "resource added");
        Ok(())
    }

    /// Admits a task to the matching remote service and persists it.
    ///
    /// A task carrying `run_at` goes to the timetable for wall-clock
    /// scheduling; otherwise it goes to the priority queue. The task ends
    /// up `scheduled` or `queued` accordingly.
    pub async fn add_task(&self, task: &mut Task) -> Result<(), ControllerError> {
        let (result, status) = if let Some(run_at) = task.run_at {
            let params = json!({
                "key": task.key,
                "id": task.id,
                "runAt": run_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            });
            let call = self.broker.call(&self.hosts.timetable, "insert", params).await;
            (call, TaskStatus::Scheduled)
        } else {
            let params = json!({
                "key": task.key,
                "id": task.id,
                "priority": task.priority,
            });
            let call = self.broker.call(&self.hosts.priority_queue, "push", params).await;
            (call, TaskStatus::Queued)
        };

        let result = result.map_err(|e| ControllerError::Broker(e.message))?;
        if result.as_i64() != Some(0) {
            return Err(ControllerError::TaskAddFailed);
        }

        task.change_status(self.task_store.as_ref(), status).await?;
        self.emit(Event::task_status(task, status)).await;
        info!(task = %task, "created task");
        Ok(())
    }

    /// Places a task in the stage slot for its resource key.
    ///
    /// Does nothing when a slot already exists (at most one pending task
    /// per resource). With `change_status`, the task transitions to
    /// `pending` and persists before it is offered.
    pub async fn stage_task(
        &self,
        mut task: Task,
        change_status: bool,
    ) -> Result<(), ControllerError> {
        if self.stage.contains(&task.key) {
            return Ok(());
        }
        if change_status {
            task.change_status(self.task_store.as_ref(), TaskStatus::Pending)
                .await?;
        }

        let event = Event::task_status(&task, TaskStatus::Pending).with_key(&task.key);
        let label = task.to_string();
        let key = task.key.clone();
        if self.stage.stage(&key, task) {
            self.emit(event).await;
            info!(task = %label, "staged task");
        }
        Ok(())
    }

    /// Starts the staged task for a resource key.
    ///
    /// Exactly one starter consumes each staged task. The probe protocol:
    /// push a sentinel, read one message back. Receiving the sentinel means
    /// the slot was empty; receiving the task makes this starter its owner.
    /// If the resource turns out to be locked, the starter drains its
    /// sentinel and pushes the task back so a later attempt can succeed.
    pub async fn start_task(&self, key: &str) -> Result<(), ControllerError> {
        let Some(slot) = self.stage.get(key) else {
            return Err(ControllerError::NoStagedTask);
        };

        slot.push(None).await;
        let mut rx = slot.rx.lock().await;
        let Some(Some(mut task)) = rx.recv().await else {
            return Err(ControllerError::NoStagedTask);
        };

        let status = self.resources.get(key).map(|r| r.status);
        if status != Some(ResourceStatus::Free) {
            // restore the slot: drop our sentinel, put the task back
            let _ = rx.try_recv();
            slot.push(Some(task)).await;
            return Err(ControllerError::ResourceUnavailable);
        }
        drop(rx);
        self.stage.remove(key);

        if task.status == TaskStatus::Started {
            return Err(ControllerError::TaskAlreadyStarted);
        }

        let resource = match self.resources.get_mut(key) {
            Some(mut entry) => {
                entry.acquire();
                entry.clone()
            }
            None => return Err(ControllerError::ResourceUnavailable),
        };
        task.change_status(self.task_store.as_ref(), TaskStatus::Started)
            .await?;
        self.resource_store.save(&resource).await?;

        self.emit(Event::task_status(&task, TaskStatus::Started)).await;
        info!(task = %task, resource = key, "started task");
        Ok(())
    }

    /// Marks a started task with its terminal status and frees its resource.
    ///
    /// `status` must be one of the terminal statuses (`complete`,
    /// `cancelled`, `error`); the RPC surface enforces this.
    pub async fn complete_task(
        &self,
        id: &str,
        status: TaskStatus,
    ) -> Result<(), ControllerError> {
        let mut task = self.fetch_task(id).await?;
        if task.status != TaskStatus::Started {
            return Err(ControllerError::TaskNotStarted);
        }

        let resource = match self.resources.get_mut(&task.key) {
            Some(mut entry) => {
                entry.release();
                Some(entry.clone())
            }
            None => {
                warn!(key = %task.key, "completed task for unregistered resource");
                None
            }
        };
        task.change_status(self.task_store.as_ref(), status).await?;
        if let Some(resource) = resource {
            self.resource_store.save(&resource).await?;
        }

        self.emit(Event::task_status(&task, status)).await;
        info!(task = %task, "completed task");
        Ok(())
    }

    /// Removes a task that has not started yet.
    ///
    /// Queued and scheduled tasks are dequeued from their remote service
    /// first; pending tasks only exist locally. The persisted document is
    /// deleted, not kept.
    pub async fn remove_task(&self, id: &str) -> Result<(), ControllerError> {
        let mut task = self.fetch_task(id).await?;
        if !task.status.is_removable() {
            return Err(ControllerError::TaskRemoveFailed);
        }

        let params = json!({ "key": task.key, "id": task.id });
        let call = match task.status {
            TaskStatus::Queued => Some(
                self.broker
                    .call(&self.hosts.priority_queue, "remove", params)
                    .await,
            ),
            TaskStatus::Scheduled => Some(
                self.broker
                    .call(&self.hosts.timetable, "remove", params)
                    .await,
            ),
            _ => None,
        };
        if let Some(result) = call {
            let value = result.map_err(|e| ControllerError::Broker(e.message))?;
            if value.as_i64() != Some(0) {
                return Err(ControllerError::TaskRemoveFailed);
            }
        }

        task.status = TaskStatus::Cancelled;
        self.task_store.remove(&task).await?;

        self.emit(Event::task_status(&task, TaskStatus::Cancelled)).await;
        info!(task = %task, "removed task");
        Ok(())
    }

    /// Returns the task with the given id.
    pub async fn get_task(&self, id: &str) -> Result<Task, ControllerError> {
        self.fetch_task(id).await
    }

    /// Proxies the priority queue listing for a key.
    pub async fn list_priority_queue(&self, key: &str) -> Result<Value, ControllerError> {
        self.broker
            .call(&self.hosts.priority_queue, "get", json!({ "key": key }))
            .await
            .map_err(|e| ControllerError::QueueNotFound {
                message: e.message.to_lowercase(),
            })
    }

    /// Proxies the timetable listing for a key.
    pub async fn list_timetable(&self, key: &str) -> Result<Value, ControllerError> {
        self.broker
            .call(&self.hosts.timetable, "get", json!({ "key": key }))
            .await
            .map_err(|e| ControllerError::TimetableNotFound {
                message: e.message.to_lowercase(),
            })
    }

    /// Records one finished execution's runtime for a key.
    pub async fn record_run_time(&self, key: &str, runtime: f64) -> Result<(), ControllerError> {
        self.stat_store.save(&TaskStat::new(key, runtime)).await?;
        Ok(())
    }

    /// Auto-priority hint: mean of the most recent runtimes for a key.
    pub async fn average_run_time(&self, key: &str) -> Result<f64, ControllerError> {
        Ok(model::average_run_time(self.stat_store.as_ref(), key).await?)
    }

    /// Rebuilds in-memory state after a restart: reloads the resource map
    /// and re-stages persisted pending tasks without re-transitioning them.
    pub async fn restore(&self) -> Result<(), ControllerError> {
        let resources = self.resource_store.fetch_all().await?;
        for resource in resources {
            self.resources
                .entry(resource.name.clone())
                .or_insert(resource);
        }

        let pending = self
            .task_store
            .query(QuerySpec::new().filter_eq("status", "pending"))
            .await?;
        for task in pending {
            self.stage_task(task, false).await?;
        }
        info!("controller state restored");
        Ok(())
    }

    async fn fetch_task(&self, id: &str) -> Result<Task, ControllerError> {
        let found = self
            .task_store
            .query(QuerySpec::new().filter_eq("_key", id))
            .await?;
        found.into_iter().next().ok_or(ControllerError::TaskNotFound)
    }

    /// Best-effort event delivery; failures never unwind a transition.
    async fn emit(&self, event: Event) {
        if let Err(err) = self.notifier.notify(&event).await {
            warn!(error = %err, label = err.as_label(), "status change notification failed");
        }
    }
}
