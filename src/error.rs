// Error kinds for the bootinfo store and its session handle.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootInfoError {
    #[error("Invalid Argument")]
    InvalidArgument,
    #[error("Store is read-only")]
    ReadOnly,
    #[error("Variable not found")]
    NotFound,
    #[error("Variable name too long")]
    NameTooLong,
    #[error("Variable area oversize")]
    Oversize,
    #[error("No candidate storage device found")]
    NoDevice,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to acquire session lock: {0}")]
    LockError(String),
    #[error("Read-only open found no valid store")]
    NoValidStore,
    #[error("Internal error: {0}")]
    Internal(String),
}
