//! Domain layer for serial-http-bridge.
//!
//! Pure types with no I/O: configuration, frames and delimiters, and the
//! error taxonomy shared by both directions of the bridge.
//!
//! Nothing in here touches `tokio`, sockets, or the serial port.

pub mod config;
pub mod error;
pub mod frame;

pub use config::BridgeConfig;
pub use error::{BridgeError, ConfigError, DeliveryError, DeviceError};
pub use frame::{Delimiter, Frame, FrameBuffer, DEFAULT_MAX_FRAME_LEN};
