//! 核心编排层：可用性跟踪、写作引擎、请求协调、预热状态、错误分类

pub mod availability;
pub mod coordinator;
pub mod deadline;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod prompts;
pub mod task;
pub mod warmup;

pub use availability::{AvailabilitySnapshot, AvailabilityState, AvailabilityTracker};
pub use coordinator::{CoordinatorOptions, RequestCoordinator};
pub use deadline::Deadline;
pub use engine::{CompositionEngine, EngineConfig};
pub use envelope::{Action, Request, RequestData, Response};
pub use error::{ComposeError, ErrorKind};
pub use task::{Task, TaskKind, Tone};
pub use warmup::{WarmupPhase, WarmupState};
