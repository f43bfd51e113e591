//! Application layer for serial-http-bridge.
//!
//! Knows *what* the bridge does in each direction and delegates *how* to the
//! traits in [`ports`]:
//!
//! - [`relay`]: read frames from the device, deliver them over HTTP.
//! - [`gateway`]: decide the outcome of one inbound request body.
//!
//! No sockets, serial ports, or HTTP frameworks appear here.

pub mod gateway;
pub mod ports;
pub mod relay;

pub use gateway::{GatewayOutcome, HttpToSerialGateway};
pub use ports::{DeviceSink, Forwarder, FrameSource};
pub use relay::{RelayExit, RelayState, SerialToHttpRelay};
