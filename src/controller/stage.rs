//! # Stage registry: per-resource hand-off slots.
//!
//! Each registered resource gets at most one [`StageSlot`]: a bounded
//! channel holding the next task awaiting an explicit start. The channel
//! doubles as the synchronization primitive: competing starters serialize
//! through its FIFO order with a probe sentinel (`None`) instead of taking
//! a separate lock around the task itself.
//!
//! ## Rules
//! - A slot holds exactly zero or one non-sentinel task at rest.
//! - Slots are created when a task is staged and deleted when it starts.
//! - The channel capacity absorbs the resting task plus probe sentinels
//!   from concurrent starters, so pushes in the probe protocol never block.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};

use crate::model::Task;

/// Capacity of each stage channel.
pub(super) const STAGE_BUFFER: usize = 10;

/// A slot message: `Some` carries the staged task, `None` is the probe
/// sentinel pushed by starters.
pub(super) type StageMessage = Option<Task>;

/// Single-slot mailbox for one resource key.
pub(super) struct StageSlot {
    tx: mpsc::Sender<StageMessage>,
    /// Receiver half; the mutex serializes competing observers.
    pub(super) rx: Mutex<mpsc::Receiver<StageMessage>>,
}

impl StageSlot {
    fn with_task(task: Task) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(STAGE_BUFFER);
        // fresh channel with free capacity; this send cannot fail
        let _ = tx.try_send(Some(task));
        Arc::new(Self {
            tx,
            rx: Mutex::new(rx),
        })
    }

    /// Pushes a message; the capacity invariant keeps this non-blocking in
    /// the probe protocol.
    pub(super) async fn push(&self, message: StageMessage) {
        let _ = self.tx.send(message).await;
    }
}

/// Concurrent map of stage slots keyed by resource name.
#[derive(Default)]
pub(super) struct StageRegistry {
    slots: DashMap<String, Arc<StageSlot>>,
}

impl StageRegistry {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub(super) fn get(&self, key: &str) -> Option<Arc<StageSlot>> {
        self.slots.get(key).map(|slot| Arc::clone(&slot))
    }

    /// Creates a slot holding `task`, unless one already exists.
    ///
    /// Returns `true` when the slot was freshly created.
    pub(super) fn stage(&self, key: &str, task: Task) -> bool {
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(StageSlot::with_task(task));
                true
            }
        }
    }

    pub(super) fn remove(&self, key: &str) {
        self.slots.remove(key);
    }
}
