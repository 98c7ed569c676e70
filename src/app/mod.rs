mod bootstrap;
mod config;
mod dispatch;
mod error;
mod heartbeat;
mod logging;
mod reconciler;
mod runtime;

pub use error::AppError;

pub fn run() -> Result<(), AppError> {
    let dotenv = dotenvy::dotenv();

    logging::init()?;

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded environment file"),
        Err(error) if error.not_found() => {}
        Err(error) => tracing::warn!(error = %error, "ignoring unreadable environment file"),
    }

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        relays = config.power_ports.len(),
        detector_port = config.detector_port,
        project_id = %config.store.project_id,
        collection = %config.device_collection,
        cache_path = %config.cache_path.display(),
        heartbeat_interval_ms = config.heartbeat_interval_ms,
        staleness_threshold_ms = config.staleness_threshold_ms,
        rest_level = ?config.relay_rest_level,
        "application bootstrap initialized"
    );

    runtime::run(config)
}
