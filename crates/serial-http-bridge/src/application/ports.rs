//! Traits at the boundary between the bridge logic and the outside world.
//!
//! The relay and the gateway only know these traits.  `infrastructure`
//! implements them over a real serial port and a real HTTP client; tests
//! implement them with recording doubles or `mockall` mocks.

use async_trait::async_trait;

use crate::domain::{DeliveryError, DeviceError, Frame};

/// Read side of the device: yields one frame per call.
///
/// # Contract
///
/// - `Ok(Some(frame))`: a frame, delimiter included, or a final partial
///   frame when the stream ended without a delimiter.
/// - `Ok(None)`: end of stream.  Every later call returns `Ok(None)` too.
/// - `Err(DeviceError::Read)`: transient failure; already buffered bytes are
///   kept and the call may be retried.
///
/// Implementations must be cancel-safe: dropping a pending `read_frame`
/// future must not lose bytes already received from the device.
#[async_trait]
pub trait FrameSource: Send {
    async fn read_frame(&mut self) -> Result<Option<Frame>, DeviceError>;
}

/// Write side of the device, shared by every concurrent HTTP request.
///
/// `write` must deliver and flush the whole byte sequence before another
/// `write` may start, so that concurrent callers never interleave on the
/// wire.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceSink: Send + Sync {
    /// `false` once the device has been closed (or was never opened).
    fn is_connected(&self) -> bool;

    /// Writes and flushes `bytes` as one ordered unit.
    ///
    /// # Errors
    ///
    /// [`DeviceError::NotConnected`] if the device is closed,
    /// [`DeviceError::Write`] if the transport rejects the bytes.
    async fn write(&self, bytes: &[u8]) -> Result<(), DeviceError>;

    /// Releases the device handle.  Returns `true` if this call closed it,
    /// `false` if it was already closed.
    async fn close(&self) -> bool;
}

/// Delivers device frames to the forwarding destination.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// The URL frames are posted to, for log messages.
    fn destination(&self) -> &str;

    /// POSTs `body` and returns the response status.
    ///
    /// Any received response counts as delivered, including 4xx and 5xx.
    /// No retry is attempted.
    async fn deliver(&self, body: Vec<u8>) -> Result<u16, DeliveryError>;

    /// Releases the underlying HTTP client.  Later deliveries fail with
    /// [`DeliveryError::Closed`].
    fn close(&self);
}
