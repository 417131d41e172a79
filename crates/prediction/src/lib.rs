//! Client-side prediction and reconciliation.
//!
//! [`tracker::IntentTracker`] records unconfirmed intents by tick;
//! [`reconciliator::Reconciliator`] drives the load-state/drop-confirmed/
//! replay-the-rest cycle against it; [`smoother::ErrorSmoother`] is the
//! optional caller-side helper for decaying the visual pop a reconciliation
//! replay leaves behind.

#![deny(unsafe_code)]

pub mod error;
pub mod reconciliator;
pub mod smoother;
pub mod tracker;

pub use error::PredictionError;
pub use reconciliator::Reconciliator;
pub use smoother::ErrorSmoother;
pub use tracker::IntentTracker;
