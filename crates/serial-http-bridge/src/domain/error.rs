//! Error taxonomy for the bridge.
//!
//! Each direction of the bridge has its own error type so that callers can
//! pick the right policy per failure: retry with backoff, log and drop, or
//! fail fast.
//!
//! | Error                     | Raised by              | Policy                         |
//! |---------------------------|------------------------|--------------------------------|
//! | [`DeviceError::Open`]     | device open            | fatal to startup               |
//! | [`DeviceError::Read`]     | frame read             | back off, retry, keep device   |
//! | [`DeviceError::Write`]    | device write           | HTTP 500, keep device          |
//! | [`DeviceError::NotConnected`] | device write       | HTTP 503                       |
//! | [`DeliveryError`]         | forwarding client      | log and drop the frame         |
//! | [`ConfigError`]           | startup validation     | fatal to startup               |
//!
//! End-of-stream is deliberately *not* an error: a frame read returns
//! `Ok(None)` when the device has nothing more to give.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Failures on the serial device side of the bridge.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device could not be opened at startup.
    #[error("failed to open serial device {path} at {baud_rate} baud: {source}")]
    Open {
        path: String,
        baud_rate: u32,
        #[source]
        source: io::Error,
    },

    /// A read from the device failed.  Buffered bytes are kept and the read
    /// may be retried.
    #[error("serial read failed: {0}")]
    Read(#[source] io::Error),

    /// A write (or the flush following it) failed.
    ///
    /// Some bytes may already have reached the transport; completion is
    /// unknown.
    #[error("serial write failed: {0}")]
    Write(#[source] io::Error),

    /// No device connection is open.
    #[error("serial not connected")]
    NotConnected,
}

/// Failures delivering a frame to the forwarding destination.
///
/// Only transport-level failures count.  An HTTP error status is a received
/// response and is reported as a successful delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The request never produced a response (connection refused, reset,
    /// DNS failure, ...).
    #[error("POST to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The forwarding client has been released during shutdown.
    #[error("forwarding client is closed")]
    Closed,
}

/// Invalid startup configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("line delimiter must not be empty")]
    EmptyDelimiter,

    #[error("invalid escape sequence in delimiter: {0}")]
    InvalidEscape(String),

    #[error("invalid forwarding URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("baud rate must be greater than zero")]
    ZeroBaudRate,

    #[error("maximum frame length must be greater than zero")]
    ZeroFrameLimit,

    #[error("serial device path must not be empty")]
    EmptyDevicePath,
}

/// Errors surfaced by the supervisor while starting the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("failed to bind HTTP listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to build forwarding HTTP client: {0}")]
    Client(String),

    /// `start` was called on a supervisor that is already running or has
    /// been shut down.
    #[error("bridge supervisor already started")]
    AlreadyStarted,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
