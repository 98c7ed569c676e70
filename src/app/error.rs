use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
    #[error("missing configuration: {0}")]
    MissingConfiguration(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid hardware specification: {0}")]
    InvalidHardwareSpecification(String),
    #[error("hardware initialization failed: {0}")]
    Hardware(String),
    #[error("invalid cache path: {0}")]
    InvalidCachePath(String),
    #[error("unreadable cache: {0}")]
    UnreadableCache(String),
    #[error("no device registered for machine uid {uid}")]
    DeviceNotRegistered { uid: String },
    #[error("failed to resolve machine identity: {0}")]
    Identity(String),
    #[error("device store unavailable: {0}")]
    Store(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("cable detector failed: {0}")]
    Detector(String),
}

impl AppError {
    pub fn logging_init<E: std::fmt::Display>(error: E) -> Self {
        Self::LoggingInit(error.to_string())
    }

    pub fn missing<E: std::fmt::Display>(error: E) -> Self {
        Self::MissingConfiguration(error.to_string())
    }

    pub fn config<E: std::fmt::Display>(error: E) -> Self {
        Self::Config(error.to_string())
    }

    pub fn hardware_spec<E: std::fmt::Display>(error: E) -> Self {
        Self::InvalidHardwareSpecification(error.to_string())
    }

    pub fn hardware<E: std::fmt::Display>(error: E) -> Self {
        Self::Hardware(error.to_string())
    }

    pub fn identity<E: std::fmt::Display>(error: E) -> Self {
        Self::Identity(error.to_string())
    }

    pub fn store<E: std::fmt::Display>(error: E) -> Self {
        Self::Store(error.to_string())
    }

    pub fn runtime<E: std::fmt::Display>(error: E) -> Self {
        Self::Runtime(error.to_string())
    }

    pub fn detector<E: std::fmt::Display>(error: E) -> Self {
        Self::Detector(error.to_string())
    }
}
