// Decision cycle and the live loop that drives it
pub mod live;
pub mod orchestrator;

pub use live::LiveRunner;
pub use orchestrator::{CycleAction, CycleOrchestrator, CycleReport, CycleSettings};
