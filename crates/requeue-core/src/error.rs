use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequeueError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("broker: {0}")]
    Broker(String),

    #[error("store: {0}")]
    Store(String),

    #[error("config: {0}")]
    Config(String),
}
