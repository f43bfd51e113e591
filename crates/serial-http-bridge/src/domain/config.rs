//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! `main.rs` builds it from CLI arguments and environment variables; tests
//! build it directly or start from [`BridgeConfig::default`].
//!
//! The struct is handed to the supervisor at construction time and shared
//! with the relay and the HTTP handler from there.  Nothing reads settings
//! from a global.

use std::net::SocketAddr;
use std::time::Duration;

use super::error::ConfigError;
use super::frame::{Delimiter, DEFAULT_MAX_FRAME_LEN};

/// All runtime configuration for the serial/HTTP bridge.
///
/// # Example
///
/// ```rust
/// use serial_http_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.baud_rate, 9600);
/// assert_eq!(cfg.http_bind_addr.port(), 8000);
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Serial device to open, e.g. `/dev/ttyUSB0` or `COM3`.
    pub device_path: String,

    /// Serial line speed.
    pub baud_rate: u32,

    /// Byte sequence that terminates one frame read from the device.
    pub delimiter: Delimiter,

    /// Longest frame forwarded as-is.  Longer runs without a delimiter are
    /// cut into truncated frames of this size.
    pub max_frame_len: usize,

    /// Destination that receives every device frame as an HTTP POST.
    pub post_url: String,

    /// Address the `POST /to-serial` listener binds to.
    pub http_bind_addr: SocketAddr,

    /// How long the relay waits after a failed device read before retrying.
    pub read_retry_backoff: Duration,

    /// How long shutdown waits for in-flight `POST /to-serial` requests
    /// before abandoning them.
    pub shutdown_grace: Duration,

    /// Keep serving HTTP when the device cannot be opened at startup.
    ///
    /// Off by default: a device that fails to open aborts startup.  When on,
    /// the failure is logged and every `POST /to-serial` answers 503.
    pub allow_missing_device: bool,
}

impl BridgeConfig {
    /// Checks the invariants that the type system does not enforce.
    ///
    /// The delimiter is non-empty by construction; this covers the remaining
    /// fields.  The forwarding URL is only checked for an HTTP scheme here,
    /// full parsing happens when the forwarding client is built.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_path.trim().is_empty() {
            return Err(ConfigError::EmptyDevicePath);
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::ZeroBaudRate);
        }
        if self.max_frame_len == 0 {
            return Err(ConfigError::ZeroFrameLimit);
        }
        if !(self.post_url.starts_with("http://") || self.post_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl {
                url: self.post_url.clone(),
                reason: "scheme must be http or https".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    /// | Field                | Default                              |
    /// |----------------------|--------------------------------------|
    /// | device_path          | `/dev/ttyUSB0`                       |
    /// | baud_rate            | `9600`                               |
    /// | delimiter            | `\n`                                 |
    /// | max_frame_len        | 64 KiB                               |
    /// | post_url             | `http://127.0.0.1:9000/from-serial`  |
    /// | http_bind_addr       | `127.0.0.1:8000`                     |
    /// | read_retry_backoff   | 1 second                             |
    /// | shutdown_grace       | 60 seconds                           |
    /// | allow_missing_device | `false`                              |
    fn default() -> Self {
        Self {
            device_path: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            delimiter: Delimiter::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            post_url: "http://127.0.0.1:9000/from-serial".to_string(),
            http_bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            read_retry_backoff: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(60),
            allow_missing_device: false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
