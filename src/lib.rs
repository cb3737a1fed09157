pub mod allocator;
pub mod bet_slip;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod form;
pub mod goal_model;
pub mod kelly;
pub mod markets;
pub mod pipeline;
pub mod store;

pub use config::ModelConfig;
pub use error::ModelError;

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}
