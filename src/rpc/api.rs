//! # API v1: maps JSON-RPC methods onto controller operations.
//!
//! Each method decodes its parameters, invokes the controller, and wraps
//! the outcome in the method's own error code and message; the controller
//! error string travels in `data`. `startTask` additionally answers with
//! result `-1` on failure.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::controller::Controller;
use crate::model::Task;

use super::params::{AddResourceParams, AddTaskParams, CompleteTaskParams, KeyParams};
use super::protocol::{
    ErrorObject, RequestObject, ResponseObject, INTERNAL_ERROR_CODE, INTERNAL_ERROR_MSG,
    METHOD_NOT_FOUND_CODE, METHOD_NOT_FOUND_MSG,
};

pub const ADD_TASK_ERROR_CODE: i64 = -32003;
pub const ADD_RESOURCE_ERROR_CODE: i64 = -32004;
pub const COMPLETE_TASK_ERROR_CODE: i64 = -32005;
pub const GET_TASK_ERROR_CODE: i64 = -32006;
pub const LIST_PRIORITY_QUEUE_ERROR_CODE: i64 = -32007;
pub const LIST_TIMETABLE_ERROR_CODE: i64 = -32008;
/// Reserved for notifier-surface failures; no method maps to it today.
pub const NOTIFICATION_FAILED_ERROR_CODE: i64 = -32009;
pub const REMOVE_TASK_ERROR_CODE: i64 = -32010;
pub const START_TASK_ERROR_CODE: i64 = -32011;

pub const ADD_TASK_ERROR_MSG: &str = "error adding new task";
pub const ADD_RESOURCE_ERROR_MSG: &str = "error adding resource";
pub const COMPLETE_TASK_ERROR_MSG: &str = "error completing task";
pub const GET_TASK_ERROR_MSG: &str = "error getting task";
pub const LIST_PRIORITY_QUEUE_ERROR_MSG: &str = "error listing priority queue";
pub const LIST_TIMETABLE_ERROR_MSG: &str = "error list timetable";
/// Reserved alongside [`NOTIFICATION_FAILED_ERROR_CODE`].
pub const NOTIFICATION_FAILED_ERROR_MSG: &str = "error sending notification";
pub const REMOVE_TASK_ERROR_MSG: &str = "error removing task";
pub const START_TASK_ERROR_MSG: &str = "error starting task";

/// Outcome of one method handler: optional result, optional error.
type MethodOutcome = (Option<Value>, Option<ErrorObject>);

/// Version 1 of the controller RPC surface.
pub struct ApiV1 {
    ctrl: Arc<Controller>,
}

impl ApiV1 {
    /// Creates the API over a controller.
    pub fn new(ctrl: Arc<Controller>) -> Self {
        Self { ctrl }
    }

    /// Dispatches one request to its method handler.
    pub async fn dispatch(&self, request: RequestObject) -> ResponseObject {
        let id = request.id.clone().unwrap_or(Value::Null);
        let params = request.params.as_ref();
        let (result, error) = match request.method.as_str() {
            "addResource" => self.add_resource(params).await,
            "addTask" => self.add_task(params).await,
            "startTask" => self.start_task(params).await,
            "completeTask" => self.complete_task(params).await,
            "getTask" => self.get_task(params).await,
            "listPriorityQueue" => self.list_priority_queue(params).await,
            "listTimetable" => self.list_timetable(params).await,
            "removeTask" => self.remove_task(params).await,
            _ => (
                None,
                Some(ErrorObject::new(METHOD_NOT_FOUND_CODE, METHOD_NOT_FOUND_MSG)),
            ),
        };

        match error {
            Some(error) => ResponseObject::error(id, result, error),
            None => ResponseObject::result(id, result.unwrap_or(Value::Null)),
        }
    }

    async fn add_resource(&self, params: Option<&Value>) -> MethodOutcome {
        let p = match AddResourceParams::parse(params) {
            Ok(p) => p,
            Err(e) => return (None, Some(e)),
        };
        match self.ctrl.add_resource(&p.name).await {
            Ok(()) => (Some(json!(0)), None),
            Err(err) => (
                None,
                Some(
                    ErrorObject::new(ADD_RESOURCE_ERROR_CODE, ADD_RESOURCE_ERROR_MSG)
                        .with_data(err.to_string()),
                ),
            ),
        }
    }

    async fn add_task(&self, params: Option<&Value>) -> MethodOutcome {
        let p = match AddTaskParams::parse(params) {
            Ok(p) => p,
            Err(e) => return (None, Some(e)),
        };
        let mut task = Task::new(p.key, p.meta, p.priority.unwrap_or(0.0), p.run_at);
        match self.ctrl.add_task(&mut task).await {
            Ok(()) => (Some(json!(task.id)), None),
            Err(err) => (
                None,
                Some(
                    ErrorObject::new(ADD_TASK_ERROR_CODE, ADD_TASK_ERROR_MSG)
                        .with_data(err.to_string()),
                ),
            ),
        }
    }

    async fn start_task(&self, params: Option<&Value>) -> MethodOutcome {
        let p = match KeyParams::parse(params, "key") {
            Ok(p) => p,
            Err(e) => return (Some(json!(-1)), Some(e)),
        };
        match self.ctrl.start_task(&p.value).await {
            Ok(()) => (Some(json!(0)), None),
            Err(err) => (
                Some(json!(-1)),
                Some(
                    ErrorObject::new(START_TASK_ERROR_CODE, START_TASK_ERROR_MSG)
                        .with_data(err.to_string()),
                ),
            ),
        }
    }

    async fn complete_task(&self, params: Option<&Value>) -> MethodOutcome {
        let p = match CompleteTaskParams::parse(params) {
            Ok(p) => p,
            Err(e) => return (None, Some(e)),
        };
        match self.ctrl.complete_task(&p.id, p.status).await {
            Ok(()) => (Some(json!(0)), None),
            Err(err) => (
                None,
                Some(
                    ErrorObject::new(COMPLETE_TASK_ERROR_CODE, COMPLETE_TASK_ERROR_MSG)
                        .with_data(err.to_string()),
                ),
            ),
        }
    }

    async fn get_task(&self, params: Option<&Value>) -> MethodOutcome {
        let p = match KeyParams::parse(params, "id") {
            Ok(p) => p,
            Err(e) => return (None, Some(e)),
        };
        match self.ctrl.get_task(&p.value).await {
            Ok(task) => match serde_json::to_value(&task) {
                Ok(encoded) => (Some(encoded), None),
                Err(err) => (
                    None,
                    Some(
                        ErrorObject::new(INTERNAL_ERROR_CODE, INTERNAL_ERROR_MSG)
                            .with_data(err.to_string()),
                    ),
                ),
            },
            Err(err) => (
                None,
                Some(
                    ErrorObject::new(GET_TASK_ERROR_CODE, GET_TASK_ERROR_MSG)
                        .with_data(err.to_string()),
                ),
            ),
        }
    }

    async fn list_priority_queue(&self, params: Option<&Value>) -> MethodOutcome {
        let p = match KeyParams::parse(params, "key") {
            Ok(p) => p,
            Err(e) => return (None, Some(e)),
        };
        match self.ctrl.list_priority_queue(&p.value).await {
            Ok(payload) => (Some(payload), None),
            Err(err) => (
                None,
                Some(
                    ErrorObject::new(LIST_PRIORITY_QUEUE_ERROR_CODE, LIST_PRIORITY_QUEUE_ERROR_MSG)
                        .with_data(err.to_string()),
                ),
            ),
        }
    }

    async fn list_timetable(&self, params: Option<&Value>) -> MethodOutcome {
        let p = match KeyParams::parse(params, "key") {
            Ok(p) => p,
            Err(e) => return (None, Some(e)),
        };
        match self.ctrl.list_timetable(&p.value).await {
            Ok(payload) => (Some(payload), None),
            Err(err) => (
                None,
                Some(
                    ErrorObject::new(LIST_TIMETABLE_ERROR_CODE, LIST_TIMETABLE_ERROR_MSG)
                        .with_data(err.to_string()),
                ),
            ),
        }
    }

    async fn remove_task(&self, params: Option<&Value>) -> MethodOutcome {
        let p = match KeyParams::parse(params, "id") {
            Ok(p) => p,
            Err(e) => return (None, Some(e)),
        };
        match self.ctrl.remove_task(&p.value).await {
            Ok(()) => (Some(json!(0)), None),
            Err(err) => (
                None,
                Some(
                    ErrorObject::new(REMOVE_TASK_ERROR_CODE, REMOVE_TASK_ERROR_MSG)
                        .with_data(err.to_string()),
                ),
            ),
        }
    }
}
