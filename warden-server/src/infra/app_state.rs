use std::sync::Arc;

use super::{config::Config, jobs::JobControlPlane};

#[derive(Clone, Debug)]
pub struct AppState {
    config: Arc<Config>,
    jobs: JobControlPlane,
}

impl AppState {
    pub fn new(config: Arc<Config>, jobs: JobControlPlane) -> Self {
        Self { config, jobs }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn jobs(&self) -> &JobControlPlane {
        &self.jobs
    }
}
