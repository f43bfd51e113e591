//! Infrastructure layer for serial-http-bridge.
//!
//! Everything that touches the outside world:
//!
//! - [`serial_link`]: opening the serial port, frame reads, serialized writes
//! - [`forwarder`]: the outbound reqwest client
//! - [`http_server`]: the axum listener for `POST /to-serial`
//! - [`relay_task`]: the relay loop as a cancellable background task
//! - [`supervisor`]: startup and shutdown ordering
//!
//! Forwarding and write decisions live in the application layer; this layer
//! only supplies the transports and spawns the tasks.

pub mod forwarder;
pub mod http_server;
pub mod relay_task;
pub mod serial_link;
pub mod supervisor;

pub use forwarder::ForwardingClient;
pub use serial_link::{DeviceLink, DeviceWriter, FrameReader};
pub use supervisor::{run_bridge, BridgeSupervisor};
