use axum::http::StatusCode;
use thiserror::Error;
use warden_core::JobStatus;

/// Rejection of a job-store operation. Job state is unchanged when one of
/// these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobControlError {
    #[error("job_not_found")]
    JobNotFound,
    #[error("cannot {action} a job that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: JobStatus,
    },
    #[error("job_already_terminal")]
    JobTerminal,
    #[error("empty_queue")]
    EmptyQueue,
    #[error("queue has {len} identifiers, limit is {limit}")]
    QueueTooLarge { len: usize, limit: usize },
    #[error("invalid notify target: {0}")]
    InvalidNotifyTarget(String),
}

impl JobControlError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            JobControlError::JobNotFound => StatusCode::NOT_FOUND,
            JobControlError::InvalidTransition { .. } => StatusCode::CONFLICT,
            JobControlError::JobTerminal => StatusCode::CONFLICT,
            JobControlError::EmptyQueue => StatusCode::BAD_REQUEST,
            JobControlError::QueueTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            JobControlError::InvalidNotifyTarget(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn is_conflict(&self) -> bool {
        self.status_code() == StatusCode::CONFLICT
    }
}

/// Failure of the orchestration loop itself, as opposed to an upstream lookup
/// failure which is recorded as an outcome. Fatal to the job.
#[derive(Debug, Clone, Error)]
pub enum JobFault {
    #[error("item task for {id} aborted: {reason}")]
    ItemTask { id: String, reason: String },
    #[error(
        "outcome for {got} recorded at index {index}, expected {expected:?}"
    )]
    OrderingViolation {
        index: usize,
        expected: Option<String>,
        got: String,
    },
    #[error("results ({results}) out of step with cursor ({cursor})")]
    CursorDrift { cursor: usize, results: usize },
    #[error("runner started for a job that was never started")]
    NotStarted,
}
