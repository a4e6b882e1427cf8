pub mod api;
pub mod correction;
pub mod dispatcher;
pub mod engine;
pub mod handlers;
pub mod model;
pub mod pipeline;
pub mod positions;
pub mod snapshot;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

use std::sync::Arc;

use axum::Router;
use mestra_core::Module;

use dispatcher::TrackingService;

/// Tracking Module — scan-driven shop-floor operation tracking.
pub struct TrackingModule {
    service: Arc<TrackingService>,
}

impl TrackingModule {
    pub fn new(service: TrackingService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

impl Module for TrackingModule {
    fn name(&self) -> &str {
        "tracking"
    }

    fn routes(&self) -> Router {
        api::router(self.service.clone())
    }
}
