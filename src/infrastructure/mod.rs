// Infrastructure module - Core background services and utilities
pub mod clock;
pub mod heartbeat;
pub mod outbound_queue;
pub mod task_manager;
pub mod timer;

pub use clock::{Clock, RecordingClock, TokioClock};
pub use heartbeat::HeartbeatManager;
pub use outbound_queue::OutboundQueue;
pub use task_manager::TaskManager;
pub use timer::Timer;
