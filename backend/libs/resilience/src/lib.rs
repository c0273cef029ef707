//! Resilience primitives shared by Nova services
//!
//! - [`retry`]: bounded exponential backoff schedules with jitter
//! - [`timeout`]: deadline wrapper for outbound calls
//!
//! ```rust
//! use resilience::{Backoff, RetryConfig};
//!
//! let mut backoff = Backoff::new(RetryConfig { jitter: false, ..Default::default() });
//! assert!(backoff.next_delay().is_some());
//! ```

pub mod retry;
pub mod timeout;

pub use retry::{Backoff, RetryConfig};
pub use timeout::{with_timeout, TimeoutError};
