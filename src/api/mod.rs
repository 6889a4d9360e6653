pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::ml::PredictionService;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    /// Recommendation actions kept per batch entry
    pub top_recommendations: usize,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<PredictionService>) -> Self {
        Self {
            service,
            top_recommendations: 3,
            started_at: Instant::now(),
        }
    }

    pub fn with_top_recommendations(mut self, n: usize) -> Self {
        self.top_recommendations = n;
        self
    }
}
