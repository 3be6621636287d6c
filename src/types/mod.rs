pub mod constants;
pub mod error;
pub mod message;

pub use constants::*;
pub use error::{
    ApiError, ApiResult, ConfigError, ErrorKind, RealtimeError, Result, StorageError,
};
pub use message::RealtimeMessage;
