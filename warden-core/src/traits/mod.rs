//! Ports to the collaborators the orchestrator depends on but does not own.

pub mod history;
pub mod processor;
