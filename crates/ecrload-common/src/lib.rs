//! ECR Load Common Library
//!
//! Shared ambient utilities for the ECR load workspace:
//!
//! - **Logging**: tracing subscriber configuration and initialization
//! - **Retry**: fixed-delay retry policy for fallible async operations

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod logging;
pub mod retry;

// Re-export commonly used types
pub use retry::RetryPolicy;
