use crate::{context::DisposeError, queue::QueueError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Dispose(#[from] DisposeError),
}

pub type Result<T> = std::result::Result<T, Error>;
