use serde::{Deserialize, Serialize};

use super::{log::LogEntry, outcome::ItemOutcome, report::FinalReport};

/// Event fanned out to every subscriber attached to a job.
///
/// Each variant carries a fixed field set; the wire form is tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Log {
        entry: LogEntry,
    },
    ItemCompleted {
        index: usize,
        outcome: ItemOutcome,
        processed: usize,
        requested: usize,
    },
    Paused {
        cursor: usize,
    },
    Resumed {
        cursor: usize,
    },
    Stopping {
        cursor: usize,
    },
    Complete {
        result: FinalReport,
    },
    Failed {
        reason: String,
        result: FinalReport,
    },
    StreamEnd,
}

impl JobEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            JobEvent::Log { .. } => "log",
            JobEvent::ItemCompleted { .. } => "item_completed",
            JobEvent::Paused { .. } => "paused",
            JobEvent::Resumed { .. } => "resumed",
            JobEvent::Stopping { .. } => "stopping",
            JobEvent::Complete { .. } => "complete",
            JobEvent::Failed { .. } => "failed",
            JobEvent::StreamEnd => "stream_end",
        }
    }

    pub fn is_log(&self) -> bool {
        matches!(self, JobEvent::Log { .. })
    }

    /// `complete` or `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Complete { .. } | JobEvent::Failed { .. })
    }
}

/// Lifecycle transition reported through the side-channel notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStage {
    Started,
    Paused,
    Resumed,
    Stopping,
    StoppedEarly,
    Complete,
    Failed,
}

impl NotificationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStage::Started => "started",
            NotificationStage::Paused => "paused",
            NotificationStage::Resumed => "resumed",
            NotificationStage::Stopping => "stopping",
            NotificationStage::StoppedEarly => "stopped_early",
            NotificationStage::Complete => "complete",
            NotificationStage::Failed => "failed",
        }
    }
}
