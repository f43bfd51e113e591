//! serial-http-bridge library crate.
//!
//! Bridges a line-oriented serial device and an HTTP control plane on the
//! same host:
//!
//! ```text
//! serial device ──frames──▶ SerialToHttpRelay ──POST──▶ forwarding URL
//! serial device ◀──bytes─── HttpToSerialGateway ◀──POST /to-serial── local client
//! ```
//!
//! # Architecture
//!
//! ```text
//! [serial-http-bridge]
//!   ├── domain/           Pure types: BridgeConfig, Delimiter, Frame, errors
//!   ├── application/      Relay loop, gateway decision logic, device/forwarding traits
//!   └── infrastructure/
//!         ├── serial_link/  DeviceLink: tokio-serial, FrameReader, DeviceWriter
//!         ├── forwarder/    ForwardingClient (reqwest)
//!         ├── http_server/  axum listener for POST /to-serial
//!         ├── relay_task/   RelayTask: the relay loop as a stoppable task
//!         └── supervisor/   BridgeSupervisor: startup and shutdown ordering
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and talks to the outside world only
//!   through the [`application::FrameSource`], [`application::DeviceSink`]
//!   and [`application::Forwarder`] traits.
//! - `infrastructure` provides the concrete serial, HTTP client, and HTTP
//!   server implementations and wires everything together.

/// Domain layer: configuration, frames, and error types (no I/O).
pub mod domain;

/// Application layer: relay loop and gateway logic.
pub mod application;

/// Infrastructure layer: serial port, HTTP client, HTTP server, supervisor.
pub mod infrastructure;
