// HTTP module - authenticated request pipeline with classified retries
pub mod client;
pub mod envelope;
pub mod retry;

pub use client::{ApiClient, ApiClientBuilder, PendingRequest, RequestConfig, Upload};
pub use envelope::unwrap_envelope;
pub use reqwest::Method;
pub use retry::{ResponseClass, RetryPolicy, parse_retry_after};
