pub mod commands;
pub mod config;
pub mod core_state;
pub mod crypto;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod settings;
pub mod trends;

use tracing_subscriber::EnvFilter;

/// Initialize tracing once. `RUST_LOG` wins over the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();

    tracing::debug!("{} v{} logging initialized", config::APP_NAME, config::APP_VERSION);
}
