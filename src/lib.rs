use std::sync::Arc;

use engine::TicketEngine;

pub mod config;
pub mod engine;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod store;
pub mod utils;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TicketEngine>,
}

impl AppState {
    pub fn new(engine: TicketEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}
