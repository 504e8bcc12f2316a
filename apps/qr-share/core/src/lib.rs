//! Session lifecycle for `qr-share`.
//!
//! A sharing session lives as long as somebody keeps the status page open. Each page
//! holds a WebSocket viewer channel and beats every few seconds; the
//! [`SessionEngine`] tracks those channels, sweeps the silent ones, and publishes a
//! [`ShutdownReason`] once the session is over. The transport and the process exit
//! live in the `qr-share` binary.

mod config;
mod lifecycle;
mod registry;
mod signal;

pub use config::{
    LifecycleConfig, LifecycleConfigError, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_STALE_AFTER,
    DEFAULT_SWEEP_INTERVAL,
};
pub use lifecycle::{SessionEngine, SessionSnapshot, ShutdownSignal, ViewerRegistration};
pub use registry::{ChannelId, SessionEnded};
pub use signal::{SessionPhase, ShutdownReason, ViewerSignal, CLOSE_PAYLOAD, HEARTBEAT_PAYLOAD};
