pub mod config;
pub mod drive;
pub mod gemini;
pub mod models;
pub mod prescription;
pub mod service;

pub use config::Config;
pub use service::{AppState, build_router, create_app};
