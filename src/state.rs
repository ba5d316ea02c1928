use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::engine::JobCoordinator;
use crate::infrastructure::storage::StorageService;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub coordinator: Arc<JobCoordinator>,
    pub storage: StorageService,
}

impl AppState {
    pub fn new(config: AppConfig, coordinator: Arc<JobCoordinator>, storage: StorageService) -> Self {
        Self {
            config,
            coordinator,
            storage,
        }
    }
}
