mod controller;
mod error;
mod runtime;
mod work_queue;

pub use controller::LifecycleController;
pub use error::ControllerError;
pub use runtime::TaskRuntime;
pub use work_queue::{WorkItem, WorkKind};
