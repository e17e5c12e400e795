pub mod resource;
pub mod task;

pub use resource::{Resource, ResourceStatus};
pub use task::{average_run_time, Task, TaskStat, TaskStatus};
