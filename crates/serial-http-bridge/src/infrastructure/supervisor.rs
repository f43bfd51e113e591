//! BridgeSupervisor: startup and shutdown ordering for the whole bridge.
//!
//! # Startup (fail fast, in order)
//!
//! 1. Open the serial device.
//! 2. Keep the write half as the shared device handle.
//! 3. Spawn the relay task on the read half.
//! 4. Bind the HTTP listener hosting the gateway.
//!
//! If step 4 fails, steps 1-3 are undone before the error is returned.
//!
//! # Shutdown (best effort, in order)
//!
//! 1. Stop the HTTP listener and let in-flight requests finish, abandoning
//!    any still running after `shutdown_grace`.
//! 2. Stop the relay and wait for it.
//! 3. Close the device.
//! 4. Release the forwarding HTTP client.
//!
//! Every step runs even if an earlier one reported a problem.  Shutdown is
//! idempotent and safe after a failed or partial startup.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::application::ports::{DeviceSink, Forwarder, FrameSource};
use crate::application::{HttpToSerialGateway, RelayState, SerialToHttpRelay};
use crate::domain::{BridgeConfig, BridgeError};
use crate::infrastructure::forwarder::ForwardingClient;
use crate::infrastructure::http_server::{spawn_http_server, HttpServerHandle};
use crate::infrastructure::relay_task::RelayTask;
use crate::infrastructure::serial_link::DeviceLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Started,
    ShutDown,
}

/// Owns every long-lived resource of the bridge.
pub struct BridgeSupervisor {
    config: BridgeConfig,
    forwarder: Arc<dyn Forwarder>,
    device: Option<Arc<dyn DeviceSink>>,
    relay: Option<RelayTask>,
    http: Option<HttpServerHandle>,
    phase: Phase,
}

impl BridgeSupervisor {
    /// Validates `config` and builds the forwarding client.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] for invalid settings and
    /// [`BridgeError::Client`] if the HTTP client cannot be built.
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        config.validate()?;
        let forwarder = ForwardingClient::new(&config.post_url)?;
        Ok(Self::with_forwarder(config, Arc::new(forwarder)))
    }

    /// Uses a caller-supplied forwarder instead of the reqwest client.
    pub fn with_forwarder(config: BridgeConfig, forwarder: Arc<dyn Forwarder>) -> Self {
        Self {
            config,
            forwarder,
            device: None,
            relay: None,
            http: None,
            phase: Phase::Idle,
        }
    }

    /// Opens the configured serial device and starts both directions.
    ///
    /// Returns the address the HTTP listener is bound to.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Device`] if the device cannot be opened (unless
    ///   `allow_missing_device` is set);
    /// - [`BridgeError::Bind`] if the listen address is unavailable;
    /// - [`BridgeError::AlreadyStarted`] on a second call.
    pub async fn start(&mut self) -> Result<SocketAddr, BridgeError> {
        self.begin_start()?;

        let opened = DeviceLink::open(
            &self.config.device_path,
            self.config.baud_rate,
            self.config.delimiter.clone(),
        );

        match opened {
            Ok(link) => {
                let link = link.with_max_frame_len(self.config.max_frame_len);
                self.start_parts(link.reader, Arc::new(link.writer)).await
            }
            Err(e) if self.config.allow_missing_device => {
                warn!("{e}; continuing without a device, POST /to-serial will answer 503");
                self.start_listener(HttpToSerialGateway::disconnected()).await
            }
            Err(e) => {
                error!("{e}");
                Err(e.into())
            }
        }
    }

    /// Starts both directions over an already open byte stream instead of
    /// the configured serial port.
    pub async fn start_with_stream<S>(&mut self, stream: S) -> Result<SocketAddr, BridgeError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.begin_start()?;
        let link = DeviceLink::from_stream(stream, self.config.delimiter.clone())
            .with_max_frame_len(self.config.max_frame_len);
        self.start_parts(link.reader, Arc::new(link.writer)).await
    }

    /// Starts both directions over an arbitrary frame source and device sink.
    pub async fn start_with_parts<S>(
        &mut self,
        source: S,
        device: Arc<dyn DeviceSink>,
    ) -> Result<SocketAddr, BridgeError>
    where
        S: FrameSource + 'static,
    {
        self.begin_start()?;
        self.start_parts(source, device).await
    }

    fn begin_start(&mut self) -> Result<(), BridgeError> {
        if self.phase != Phase::Idle {
            return Err(BridgeError::AlreadyStarted);
        }
        self.phase = Phase::Started;
        Ok(())
    }

    async fn start_parts<S>(
        &mut self,
        source: S,
        device: Arc<dyn DeviceSink>,
    ) -> Result<SocketAddr, BridgeError>
    where
        S: FrameSource + 'static,
    {
        self.device = Some(Arc::clone(&device));

        let relay = SerialToHttpRelay::new(
            source,
            Arc::clone(&self.forwarder),
            self.config.read_retry_backoff,
        );
        self.relay = Some(RelayTask::spawn(relay));

        self.start_listener(HttpToSerialGateway::new(device)).await
    }

    async fn start_listener(
        &mut self,
        gateway: HttpToSerialGateway,
    ) -> Result<SocketAddr, BridgeError> {
        let served = spawn_http_server(
            self.config.http_bind_addr,
            Arc::new(gateway),
            self.config.shutdown_grace,
        )
        .await;
        match served {
            Ok(handle) => {
                let addr = handle.local_addr();
                self.http = Some(handle);
                Ok(addr)
            }
            Err(e) => {
                error!("{e}");
                self.shutdown().await;
                Err(e)
            }
        }
    }

    /// Address of the running HTTP listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().map(HttpServerHandle::local_addr)
    }

    /// State of the relay loop, or `None` if no relay was started.
    pub fn relay_state(&self) -> Option<RelayState> {
        self.relay.as_ref().map(RelayTask::state)
    }

    pub fn is_device_connected(&self) -> bool {
        self.device.as_ref().is_some_and(|d| d.is_connected())
    }

    /// Stops everything in order.  See the module docs.
    pub async fn shutdown(&mut self) {
        if self.phase == Phase::ShutDown {
            debug!("bridge already shut down");
            return;
        }
        self.phase = Phase::ShutDown;

        if let Some(mut http) = self.http.take() {
            http.shutdown().await;
        }

        if let Some(mut relay) = self.relay.take() {
            match relay.stop_and_join().await {
                Some(exit) => debug!("relay ended: {exit:?}"),
                None => warn!("relay ended abnormally"),
            }
        }

        if let Some(device) = self.device.take() {
            if device.close().await {
                info!("serial stopped");
            }
        }

        self.forwarder.close();
    }
}

/// Runs the bridge until `shutdown_signal` resolves, then shuts it down.
///
/// # Errors
///
/// Returns the startup error, if any; shutdown itself never fails.
pub async fn run_bridge<F>(config: BridgeConfig, shutdown_signal: F) -> Result<(), BridgeError>
where
    F: Future<Output = ()>,
{
    let mut supervisor = BridgeSupervisor::new(config)?;

    if let Err(e) = supervisor.start().await {
        supervisor.shutdown().await;
        return Err(e);
    }

    shutdown_signal.await;
    info!("shutdown requested");
    supervisor.shutdown().await;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use crate::application::ports::MockDeviceSink;
    use crate::domain::{DeliveryError, DeviceError, Frame};

    #[derive(Default)]
    struct RecordingForwarder {
        bodies: Mutex<Vec<Vec<u8>>>,
        closes: AtomicUsize,
    }

    #[async_trait]
    impl Forwarder for RecordingForwarder {
        fn destination(&self) -> &str {
            "http://127.0.0.1:9000/from-serial"
        }

        async fn deliver(&self, body: Vec<u8>) -> Result<u16, DeliveryError> {
            self.bodies.lock().unwrap().push(body);
            Ok(200)
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct IdleSource;

    #[async_trait]
    impl FrameSource for IdleSource {
        async fn read_frame(&mut self) -> Result<Option<Frame>, DeviceError> {
            std::future::pending().await
        }
    }

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            device_path: "/dev/this-port-does-not-exist".to_string(),
            http_bind_addr: "127.0.0.1:0".parse().unwrap(),
            read_retry_backoff: Duration::from_millis(1),
            ..BridgeConfig::default()
        }
    }

    fn supervisor() -> (BridgeSupervisor, Arc<RecordingForwarder>) {
        let fwd = Arc::new(RecordingForwarder::default());
        let sup =
            BridgeSupervisor::with_forwarder(test_config(), Arc::clone(&fwd) as Arc<dyn Forwarder>);
        (sup, fwd)
    }

    #[tokio::test]
    async fn test_failed_open_is_fatal_by_default() {
        // Arrange
        let (mut sup, _) = supervisor();

        // Act
        let result = sup.start().await;

        // Assert: no listener was started
        assert!(matches!(result, Err(BridgeError::Device(DeviceError::Open { .. }))));
        assert!(sup.local_addr().is_none());
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_device_allowed_serves_503() {
        // Arrange
        let fwd = Arc::new(RecordingForwarder::default());
        let config = BridgeConfig {
            allow_missing_device: true,
            ..test_config()
        };
        let mut sup = BridgeSupervisor::with_forwarder(config, fwd);

        // Act
        let addr = sup.start().await.unwrap();
        let response = reqwest::Client::new()
            .post(format!("http://{addr}/to-serial"))
            .body("hello")
            .send()
            .await
            .unwrap();

        // Assert
        assert_eq!(response.status().as_u16(), 503);
        assert_eq!(response.text().await.unwrap(), "serial not connected");
        assert!(sup.relay_state().is_none());
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_stream_round_trip_both_directions() {
        // Arrange
        let (mut sup, fwd) = supervisor();
        let (mut device, bridge) = tokio::io::duplex(256);
        let addr = sup.start_with_stream(bridge).await.unwrap();

        // Act: device → HTTP
        device.write_all(b"A\nB\n").await.unwrap();
        while fwd.bodies.lock().unwrap().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Act: HTTP → device
        let response = reqwest::Client::new()
            .post(format!("http://{addr}/to-serial"))
            .body("LED ON\n")
            .send()
            .await
            .unwrap();
        let mut written = [0u8; 7];
        device.read_exact(&mut written).await.unwrap();

        // Assert
        assert_eq!(*fwd.bodies.lock().unwrap(), vec![b"A\n".to_vec(), b"B\n".to_vec()]);
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(&written, b"LED ON\n");
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_finishes_while_a_write_is_stuck() {
        // Arrange: a device that never drains its 8-byte input buffer
        let fwd = Arc::new(RecordingForwarder::default());
        let config = BridgeConfig {
            shutdown_grace: Duration::from_millis(50),
            ..test_config()
        };
        let mut sup = BridgeSupervisor::with_forwarder(config, fwd);
        let (_device, bridge) = tokio::io::duplex(8);
        let addr = sup.start_with_stream(bridge).await.unwrap();
        let request = tokio::spawn(async move {
            reqwest::Client::new()
                .post(format!("http://{addr}/to-serial"))
                .body(vec![b'x'; 1000])
                .send()
                .await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Act
        let finished = tokio::time::timeout(Duration::from_secs(5), sup.shutdown()).await;

        // Assert: the write lock was released and the device closed
        assert!(finished.is_ok(), "shutdown hung on the stuck write");
        assert!(!sup.is_device_connected());
        request.abort();
    }

    #[tokio::test]
    async fn test_shutdown_twice_closes_device_once() {
        // Arrange
        let (mut sup, fwd) = supervisor();
        let mut mock = MockDeviceSink::new();
        mock.expect_is_connected().return_const(true);
        mock.expect_close().times(1).returning(|| true);
        sup.start_with_parts(IdleSource, Arc::new(mock)).await.unwrap();

        // Act
        sup.shutdown().await;
        sup.shutdown().await;

        // Assert
        assert_eq!(fwd.closes.load(Ordering::SeqCst), 1);
        assert!(sup.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_stops_relay_before_closing_device() {
        // Arrange
        let (mut sup, _) = supervisor();
        let (_device, bridge) = tokio::io::duplex(64);
        sup.start_with_stream(bridge).await.unwrap();
        assert_eq!(sup.relay_state(), Some(RelayState::Running));
        assert!(sup.is_device_connected());

        // Act
        sup.shutdown().await;

        // Assert: everything released
        assert!(sup.relay_state().is_none());
        assert!(!sup.is_device_connected());
    }

    #[tokio::test]
    async fn test_shutdown_before_start_is_safe() {
        let (mut sup, fwd) = supervisor();
        sup.shutdown().await;
        sup.shutdown().await;
        assert_eq!(fwd.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (mut sup, _) = supervisor();
        let (_device, bridge) = tokio::io::duplex(64);
        sup.start_with_stream(bridge).await.unwrap();

        let (_device2, bridge2) = tokio::io::duplex(64);
        let second = sup.start_with_stream(bridge2).await;

        assert!(matches!(second, Err(BridgeError::AlreadyStarted)));
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_bind_failure_undoes_partial_startup() {
        // Arrange: occupy the listen port
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let fwd = Arc::new(RecordingForwarder::default());
        let config = BridgeConfig {
            http_bind_addr: taken.local_addr().unwrap(),
            ..test_config()
        };
        let mut sup =
            BridgeSupervisor::with_forwarder(config, Arc::clone(&fwd) as Arc<dyn Forwarder>);
        let mut mock = MockDeviceSink::new();
        mock.expect_is_connected().return_const(true);
        mock.expect_close().times(1).returning(|| true);

        // Act
        let result = sup.start_with_parts(IdleSource, Arc::new(mock)).await;

        // Assert: relay stopped, device closed, client released
        assert!(matches!(result, Err(BridgeError::Bind { .. })));
        assert!(sup.relay_state().is_none());
        assert_eq!(fwd.closes.load(Ordering::SeqCst), 1);

        // A later shutdown is still harmless.
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let config = BridgeConfig {
            post_url: "mailto:ops@example.com".to_string(),
            ..test_config()
        };
        assert!(matches!(
            BridgeSupervisor::new(config),
            Err(BridgeError::Config(_))
        ));
    }
}
