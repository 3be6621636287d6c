// Auth module - credential pair, durable storage and single-flight refresh
pub mod storage;
pub mod store;
pub mod token;

pub use storage::{FileTokenStorage, MemoryTokenStorage, TokenStorage};
pub use store::{AuthEvent, TokenStore};
pub use token::{CredentialPair, decode_expiry, is_expired, is_expired_at};
