//! Background worker process: the consumer side of the Task Queue
//! (`SPEC_FULL.md` §4.G). A separate OS process from any foreground API
//! server (`spec.md` §5), sharing state with it only through the database
//! and Redis.

pub mod app;
pub mod flow_handler;
pub mod handler;
pub mod heartbeat;

pub use app::WorkerApp;
pub use flow_handler::{FlowHandler, FlowRegistry};
pub use handler::{HandlerError, HandlerRegistry, TaskHandler};
