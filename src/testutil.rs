//! Shared test doubles: a scripted service broker and a controller wired to
//! in-memory collections.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::broker::ServiceBroker;
use crate::config::ServiceHosts;
use crate::controller::Controller;
use crate::model::{Resource, Task, TaskStat};
use crate::rpc::protocol::ErrorObject;
use crate::store::MemoryCollection;

pub(crate) const PQ_HOST: &str = "pq.test";
pub(crate) const TT_HOST: &str = "tt.test";
pub(crate) const NOTIFY_HOST: &str = "notify.test";

/// One recorded outbound call.
#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub host: String,
    pub method: String,
    pub params: Value,
}

/// Scripted broker double.
///
/// Responses queue per method; unscripted methods answer `0`, which is the
/// success code every sibling service uses. All calls are recorded.
#[derive(Default)]
pub(crate) struct MockBroker {
    calls: Mutex<Vec<RecordedCall>>,
    scripts: Mutex<HashMap<String, VecDeque<Result<Value, ErrorObject>>>>,
}

impl MockBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the next response for `method`.
    pub fn script(&self, method: &str, response: Result<Value, ErrorObject>) {
        self.scripts
            .lock()
            .expect("lock")
            .entry(method.to_string())
            .or_default()
            .push_back(response);
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("lock").clone()
    }

    /// Params of every call to `method`.
    pub fn calls_for(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter(|c| c.method == method)
            .map(|c| c.params.clone())
            .collect()
    }
}

#[async_trait]
impl ServiceBroker for MockBroker {
    async fn call(&self, host: &str, method: &str, params: Value) -> Result<Value, ErrorObject> {
        self.calls.lock().expect("lock").push(RecordedCall {
            host: host.to_string(),
            method: method.to_string(),
            params,
        });
        self.scripts
            .lock()
            .expect("lock")
            .get_mut(method)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(json!(0)))
    }
}

/// A controller over in-memory collections plus handles for assertions.
pub(crate) struct Harness {
    pub ctrl: Arc<Controller>,
    pub broker: Arc<MockBroker>,
    pub tasks: Arc<MemoryCollection<Task>>,
    pub resources: Arc<MemoryCollection<Resource>>,
    pub stats: Arc<MemoryCollection<TaskStat>>,
}

pub(crate) fn harness() -> Harness {
    let broker = MockBroker::new();
    let tasks = Arc::new(MemoryCollection::<Task>::new());
    let resources = Arc::new(MemoryCollection::<Resource>::new());
    let stats = Arc::new(MemoryCollection::<TaskStat>::new());
    let ctrl = Controller::new(
        ServiceHosts {
            priority_queue: PQ_HOST.to_string(),
            timetable: TT_HOST.to_string(),
            notifier: NOTIFY_HOST.to_string(),
        },
        broker.clone(),
        tasks.clone(),
        resources.clone(),
        stats.clone(),
    );
    Harness {
        ctrl,
        broker,
        tasks,
        resources,
        stats,
    }
}
