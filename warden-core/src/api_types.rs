//! Request and response bodies shared by the HTTP surface and its clients.

use serde::{Deserialize, Serialize};

use crate::types::{
    job::{JobId, JobStatus},
    report::Report,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_target: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCreatedResponse {
    pub job_id: JobId,
    pub requested: usize,
    pub duplicates_removed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCommandResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialReportResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub cursor: usize,
    pub report: Report,
}

/// Returned by the result endpoint while a job has not reached a terminal
/// state yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRunningResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub running: bool,
    pub processed: usize,
    pub requested: usize,
}
