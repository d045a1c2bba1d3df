pub mod collab;
pub mod config;
pub mod pipeline;
pub mod store;
pub mod utils;
pub mod web;

use std::sync::Arc;
use pipeline::{Janitor, Orchestrator};

pub struct AppContext {
    pub orchestrator: Arc<Orchestrator>,
    pub janitor: Arc<Janitor>,
}

pub fn init_env() {
    dotenv::dotenv().ok();
}
