//! Protocol orchestration: sequencing, run states and failures.

pub mod error;
pub mod orchestrator;
pub mod state;

pub use error::{ProtocolError, RunFailure};
pub use orchestrator::{Orchestrator, RunReport};
pub use state::{RunControl, RunState, Step};
