use evbus_core::error::BusError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum RouterError {
    #[error("engine: {0}")]
    Bus(#[from] BusError),

    #[error("engine not found: topic={topic}, engine={engine}")]
    EngineNotFound { topic: String, engine: String },

    #[error("subscription not found in any engine: {id}")]
    SubscriptionNotFound { id: String },

    #[error("unknown engine type: {0}")]
    UnknownEngineType(String),

    #[error("engine type already registered: {0}")]
    AlreadyRegistered(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type RouterResult<T> = Result<T, RouterError>;
