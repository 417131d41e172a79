//! Scheduling and transport primitives shared by server and client:
//! the fixed-timestep ticker, the three loop-driver scheduling modes,
//! transport capability traits, and per-second rate limiting.

pub mod error;
pub mod loop_driver;
pub mod rate_limit;
pub mod ticker;
pub mod transport;

pub use error::TransportError;
pub use loop_driver::{DisplayRefreshDriver, ImmediateDriver, LoopDriver, TimedDriver};
pub use rate_limit::RateLimiter;
pub use ticker::{FixedTicker, TickEvent, MAX_CATCHUP_TICKS};
pub use transport::{LoopbackTransport, PeerId, ServerTransport, Transport};
