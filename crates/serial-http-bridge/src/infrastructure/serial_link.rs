//! DeviceLink: the open serial port, split into a frame reader and a
//! serialized writer.
//!
//! # Streaming reads
//!
//! A serial read returns whatever bytes the UART has collected: half a line,
//! or several lines at once.  [`FrameReader`] appends every read to a
//! [`FrameBuffer`] and hands out one delimiter-terminated frame at a time.
//! The buffer lives in the reader, not in the read future, so a pending
//! `read_frame` can be dropped (e.g. by a stop signal) without losing bytes.
//!
//! # Serialized writes
//!
//! Every HTTP request may write concurrently.  [`DeviceWriter`] holds the
//! write half behind a `tokio::sync::Mutex` for the whole `write_all` +
//! `flush`, so two bodies never interleave on the wire.
//!
//! # Independent directions
//!
//! The port is split with `tokio::io::split`; the relay owns the read half
//! outright and never contends with writers for the write mutex.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

use crate::application::ports::{DeviceSink, FrameSource};
use crate::domain::{Delimiter, DeviceError, Frame, FrameBuffer};

/// Size of the scratch buffer for a single read call.
const READ_CHUNK: usize = 4096;

// ── DeviceLink ────────────────────────────────────────────────────────────────

/// An open device, split into its read and write sides.
///
/// The halves are public so the supervisor can move each one to its owner:
/// the reader to the relay task, the writer into the shared gateway handle.
pub struct DeviceLink<S> {
    /// Frame-oriented read side.
    pub reader: FrameReader<ReadHalf<S>>,
    /// Serialized write side.
    pub writer: DeviceWriter<WriteHalf<S>>,
}

impl DeviceLink<SerialStream> {
    /// Opens the serial port at `path` (8N1, no flow control).
    ///
    /// Must be called from within a Tokio runtime: the port is registered
    /// with the reactor.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Open`] if the port does not exist, is busy, or
    /// rejects the settings.
    pub fn open(path: &str, baud_rate: u32, delimiter: Delimiter) -> Result<Self, DeviceError> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| DeviceError::Open {
                path: path.to_string(),
                baud_rate,
                source: e.into(),
            })?;

        info!("serial opened {path} @ {baud_rate}");
        Ok(Self::from_stream(port, delimiter))
    }
}

impl<S> DeviceLink<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wraps any byte stream as a device.  Used for the real serial port and
    /// for in-memory streams in tests.
    pub fn from_stream(stream: S, delimiter: Delimiter) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: FrameReader::new(read_half, delimiter),
            writer: DeviceWriter::new(write_half),
        }
    }

    /// Caps the length of a frame read from the device.
    pub fn with_max_frame_len(self, max_frame_len: usize) -> Self {
        Self {
            reader: self.reader.with_max_frame_len(max_frame_len),
            writer: self.writer,
        }
    }
}

// ── FrameReader ───────────────────────────────────────────────────────────────

/// Reads delimiter-terminated frames from a byte stream.
pub struct FrameReader<R> {
    inner: R,
    buffer: FrameBuffer,
    scratch: Box<[u8]>,
    eof: bool,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(inner: R, delimiter: Delimiter) -> Self {
        Self {
            inner,
            buffer: FrameBuffer::new(delimiter),
            scratch: vec![0u8; READ_CHUNK].into_boxed_slice(),
            eof: false,
        }
    }

    /// Replaces the frame length limit.  Call before the first read.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        let delimiter = self.buffer.delimiter().clone();
        self.buffer = FrameBuffer::with_max_len(delimiter, max_frame_len);
        self
    }

    /// Returns the next frame, a final partial frame, or `None` at end of
    /// stream.  See [`FrameSource`] for the full contract.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, DeviceError> {
        loop {
            if let Some(frame) = self.buffer.next_frame() {
                return Ok(Some(frame));
            }
            if self.eof {
                return Ok(None);
            }

            // `read` is cancel-safe: if this future is dropped while waiting,
            // no bytes have been taken from the stream yet.
            let n = self
                .inner
                .read(&mut self.scratch)
                .await
                .map_err(DeviceError::Read)?;

            if n == 0 {
                self.eof = true;
                debug!(
                    "serial stream ended with {} unterminated bytes",
                    self.buffer.buffered()
                );
                return Ok(self.buffer.finish());
            }

            self.buffer.push(&self.scratch[..n]);
        }
    }
}

#[async_trait]
impl<R> FrameSource for FrameReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_frame(&mut self) -> Result<Option<Frame>, DeviceError> {
        FrameReader::read_frame(self).await
    }
}

// ── DeviceWriter ──────────────────────────────────────────────────────────────

/// Shared, mutually exclusive write access to the device.
///
/// `connected` mirrors whether `inner` still holds a writer so that
/// [`DeviceSink::is_connected`] never has to wait for the lock.
pub struct DeviceWriter<W> {
    inner: Mutex<Option<W>>,
    connected: AtomicBool,
}

impl<W> DeviceWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(Some(inner)),
            connected: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl<W> DeviceSink for DeviceWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or(DeviceError::NotConnected)?;

        writer.write_all(bytes).await.map_err(DeviceError::Write)?;
        writer.flush().await.map_err(DeviceError::Write)
    }

    async fn close(&self) -> bool {
        let mut guard = self.inner.lock().await;
        let Some(mut writer) = guard.take() else {
            return false;
        };
        self.connected.store(false, Ordering::Release);

        if let Err(e) = writer.shutdown().await {
            warn!("error while closing serial writer: {e}");
        }
        true
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
