//! `ClientNetwork`: the single-peer client-side mirror of
//! `flowstate_server::ServerNetwork` — intent send with change detection,
//! snapshot/RPC receipt, the heartbeat watchdog, and optional artificial
//! receive-side lag simulation.

#![deny(unsafe_code)]

pub mod error;
pub mod lag;
pub mod network;

pub use error::ClientNetworkError;
pub use lag::{LagQueue, LagSimulation};
pub use network::{ClientNetwork, ClientNetworkConfig, HandlerId};
