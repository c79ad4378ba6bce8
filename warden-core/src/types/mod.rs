pub mod events;
pub mod job;
pub mod log;
pub mod outcome;
pub mod report;
