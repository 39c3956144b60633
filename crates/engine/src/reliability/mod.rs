//! Reliability patterns shared by the history reader and the polling loops
//!
//! This module provides:
//! - [`RetryPolicy`] - Bounded retries with fixed or exponential delays

mod retry;

pub use retry::RetryPolicy;
