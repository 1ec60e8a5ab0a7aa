use thiserror::Error;

#[derive(Debug, Error)]
pub enum SavolError {
    #[error("pipeline is shut down")]
    Closed,
}
