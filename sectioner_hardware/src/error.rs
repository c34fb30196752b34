use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("driver fault: {0}")]
    Driver(String),
    #[error("unknown device: {0}")]
    UnknownDevice(String),
    #[error("stage timeout")]
    Timeout,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
