//! # Notifier: delivers status-change events to the notifier service.

use std::sync::Arc;

use serde_json::json;

use crate::broker::ServiceBroker;
use crate::error::ControllerError;

use super::Event;

/// Client for the status-change notifier service.
///
/// Wraps the broker's `notify` call. The notifier answers with a numeric
/// code: 0 accepts the event, anything else rejects it.
pub struct Notifier {
    host: String,
    broker: Arc<dyn ServiceBroker>,
}

impl Notifier {
    /// Creates a notifier bound to the given host.
    pub fn new(host: impl Into<String>, broker: Arc<dyn ServiceBroker>) -> Self {
        Self {
            host: host.into(),
            broker,
        }
    }

    /// Sends a status-change event.
    ///
    /// Broker failures carry the broker's message; a non-zero result code
    /// maps to [`ControllerError::NotificationFailed`].
    pub async fn notify(&self, event: &Event) -> Result<(), ControllerError> {
        let params = json!({
            "created": event.created,
            "kind": event.kind,
            "meta": event.meta,
        });
        let result = self
            .broker
            .call(&self.host, "notify", params)
            .await
            .map_err(|e| ControllerError::Broker(e.message))?;
        match result.as_i64() {
            Some(0) => Ok(()),
            _ => Err(ControllerError::NotificationFailed),
        }
    }
}
