pub mod handle_jobs;

pub use handle_jobs::{
    JobListResponse, JobPath, build_job_event_stream, create_job_handler,
    job_events_sse_handler, job_result_handler, job_snapshot_handler,
    list_jobs_handler, partial_report_handler, pause_job_handler,
    resume_job_handler, stop_job_handler,
};
