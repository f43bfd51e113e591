//! HttpToSerialGateway: decides what happens to one inbound request body.
//!
//! The HTTP server extracts the raw body and hands it here; the result is a
//! [`GatewayOutcome`] that the server turns into a status line and a short
//! text body.  Keeping the decision out of the HTTP framework lets it be
//! tested against a mocked device.
//!
//! Checks run in this order:
//!
//! 1. device not open → 503, nothing written;
//! 2. empty body → 400, nothing written;
//! 3. exactly one `write(body)` → 200, or 500 if the write fails.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::application::ports::DeviceSink;
use crate::domain::DeviceError;

/// Result of handling one `POST /to-serial` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// The body was written and flushed to the device.
    Written,
    /// No device connection is open.
    NotConnected,
    /// The request carried no bytes.
    EmptyBody,
    /// The device rejected the write.  Completion is unknown.
    WriteFailed,
}

impl GatewayOutcome {
    pub fn status_code(self) -> u16 {
        match self {
            GatewayOutcome::Written => 200,
            GatewayOutcome::EmptyBody => 400,
            GatewayOutcome::WriteFailed => 500,
            GatewayOutcome::NotConnected => 503,
        }
    }

    /// Plain-text response body.
    pub fn message(self) -> &'static str {
        match self {
            GatewayOutcome::Written => "ok",
            GatewayOutcome::EmptyBody => "empty body",
            GatewayOutcome::WriteFailed => "failed to write to serial",
            GatewayOutcome::NotConnected => "serial not connected",
        }
    }
}

/// Writes inbound request bodies to the shared device.
///
/// `device` is `None` when the bridge runs without a device (see
/// `BridgeConfig::allow_missing_device`).
#[derive(Clone)]
pub struct HttpToSerialGateway {
    device: Option<Arc<dyn DeviceSink>>,
}

impl HttpToSerialGateway {
    pub fn new(device: Arc<dyn DeviceSink>) -> Self {
        Self {
            device: Some(device),
        }
    }

    /// A gateway with no device behind it; every request gets 503.
    pub fn disconnected() -> Self {
        Self { device: None }
    }

    pub async fn handle(&self, body: &[u8]) -> GatewayOutcome {
        let Some(device) = self.device.as_ref().filter(|d| d.is_connected()) else {
            return GatewayOutcome::NotConnected;
        };

        if body.is_empty() {
            return GatewayOutcome::EmptyBody;
        }

        match device.write(body).await {
            Ok(()) => {
                info!("wrote {} bytes to serial", body.len());
                debug!("wrote to serial: {}", body.escape_ascii());
                GatewayOutcome::Written
            }
            // The device was closed between the connectivity check and the
            // write (shutdown in progress).
            Err(DeviceError::NotConnected) => GatewayOutcome::NotConnected,
            Err(e) => {
                error!("failed to write to serial: {e}");
                GatewayOutcome::WriteFailed
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    use crate::application::ports::MockDeviceSink;

    fn connected_mock() -> MockDeviceSink {
        let mut mock = MockDeviceSink::new();
        mock.expect_is_connected().return_const(true);
        mock
    }

    #[test]
    fn test_outcome_status_codes() {
        assert_eq!(GatewayOutcome::Written.status_code(), 200);
        assert_eq!(GatewayOutcome::EmptyBody.status_code(), 400);
        assert_eq!(GatewayOutcome::WriteFailed.status_code(), 500);
        assert_eq!(GatewayOutcome::NotConnected.status_code(), 503);
    }

    #[test]
    fn test_outcome_messages() {
        assert_eq!(GatewayOutcome::Written.message(), "ok");
        assert_eq!(GatewayOutcome::EmptyBody.message(), "empty body");
        assert_eq!(GatewayOutcome::WriteFailed.message(), "failed to write to serial");
        assert_eq!(GatewayOutcome::NotConnected.message(), "serial not connected");
    }

    #[tokio::test]
    async fn test_non_empty_body_is_written_exactly_once() {
        // Arrange
        let mut mock = connected_mock();
        mock.expect_write()
            .withf(|bytes: &[u8]| bytes == b"LED ON\n")
            .times(1)
            .returning(|_| Ok(()));
        let gateway = HttpToSerialGateway::new(Arc::new(mock));

        // Act
        let outcome = gateway.handle(b"LED ON\n").await;

        // Assert
        assert_eq!(outcome, GatewayOutcome::Written);
    }

    #[tokio::test]
    async fn test_empty_body_never_writes() {
        // Arrange
        let mut mock = connected_mock();
        mock.expect_write().never();
        let gateway = HttpToSerialGateway::new(Arc::new(mock));

        // Act
        let outcome = gateway.handle(b"").await;

        // Assert
        assert_eq!(outcome, GatewayOutcome::EmptyBody);
    }

    #[tokio::test]
    async fn test_closed_device_never_writes() {
        // Arrange
        let mut mock = MockDeviceSink::new();
        mock.expect_is_connected().return_const(false);
        mock.expect_write().never();
        let gateway = HttpToSerialGateway::new(Arc::new(mock));

        // Act
        let outcome = gateway.handle(b"data").await;

        // Assert
        assert_eq!(outcome, GatewayOutcome::NotConnected);
    }

    #[tokio::test]
    async fn test_not_connected_takes_precedence_over_empty_body() {
        let gateway = HttpToSerialGateway::disconnected();
        assert_eq!(gateway.handle(b"").await, GatewayOutcome::NotConnected);
    }

    #[tokio::test]
    async fn test_disconnected_gateway_answers_503() {
        let gateway = HttpToSerialGateway::disconnected();
        assert_eq!(gateway.handle(b"x").await, GatewayOutcome::NotConnected);
    }

    #[tokio::test]
    async fn test_write_error_maps_to_write_failed_without_retry() {
        // Arrange
        let mut mock = connected_mock();
        mock.expect_write().times(1).returning(|_| {
            Err(DeviceError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device unplugged",
            )))
        });
        let gateway = HttpToSerialGateway::new(Arc::new(mock));

        // Act
        let outcome = gateway.handle(b"abc").await;

        // Assert
        assert_eq!(outcome, GatewayOutcome::WriteFailed);
    }

    #[tokio::test]
    async fn test_close_race_maps_to_not_connected() {
        let mut mock = connected_mock();
        mock.expect_write()
            .times(1)
            .returning(|_| Err(DeviceError::NotConnected));
        let gateway = HttpToSerialGateway::new(Arc::new(mock));

        assert_eq!(gateway.handle(b"abc").await, GatewayOutcome::NotConnected);
    }
}
