use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("sensor fault on bay {bay}: {reason}")]
    SensorFault { bay: usize, reason: String },
    #[error("no free bay available")]
    AllocationExhausted,
    #[error("actuator fault: {0}")]
    ActuatorFault(String),
    #[error("malformed command: {0}")]
    MalformedCommand(String),
    #[error("invalid bay index: {0}")]
    InvalidBay(usize),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("watch channel send failed")]
    WatchSend,
    #[error("state lock poisoned")]
    StateLock,
}
