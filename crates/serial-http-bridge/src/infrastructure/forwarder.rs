//! ForwardingClient: POSTs device frames to the configured destination.
//!
//! A thin wrapper over `reqwest::Client`.  The only decisions made here are
//! what counts as a failure (no response at all) and what counts as a
//! delivery (any response, whatever its status).  Retry policy belongs to
//! the relay, which has none.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use crate::application::ports::Forwarder;
use crate::domain::{BridgeError, ConfigError, DeliveryError};

pub struct ForwardingClient {
    url: Url,
    url_text: String,
    /// `None` once released by [`Forwarder::close`].
    client: Mutex<Option<Client>>,
}

impl ForwardingClient {
    /// Builds a client for `post_url`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidUrl`] if `post_url` does not parse;
    /// - [`BridgeError::Client`] if the TLS backend cannot be initialised.
    pub fn new(post_url: &str) -> Result<Self, BridgeError> {
        let url = Url::parse(post_url).map_err(|e| ConfigError::InvalidUrl {
            url: post_url.to_string(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .build()
            .map_err(|e| BridgeError::Client(e.to_string()))?;

        Ok(Self {
            url_text: url.to_string(),
            url,
            client: Mutex::new(Some(client)),
        })
    }

    fn client(&self) -> Option<Client> {
        // `Client` is an `Arc` internally; cloning it is cheap and lets the
        // lock be released before the request is awaited.
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Forwarder for ForwardingClient {
    fn destination(&self) -> &str {
        &self.url_text
    }

    async fn deliver(&self, body: Vec<u8>) -> Result<u16, DeliveryError> {
        let client = self.client().ok_or(DeliveryError::Closed)?;

        let response = client
            .post(self.url.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport {
                url: self.url_text.clone(),
                source: Box::new(e),
            })?;

        Ok(response.status().as_u16())
    }

    fn close(&self) {
        let released = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            debug!("forwarding client released");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;

    type Received = Arc<Mutex<Vec<Vec<u8>>>>;

    /// Starts a throwaway HTTP receiver.  `/from-serial` records bodies and
    /// answers 200; `/broken` answers 500.
    async fn spawn_receiver() -> (SocketAddr, Received) {
        let received: Received = Arc::default();
        let app = Router::new()
            .route(
                "/from-serial",
                post(|State(rx): State<Received>, body: Bytes| async move {
                    rx.lock().unwrap().push(body.to_vec());
                    StatusCode::OK
                }),
            )
            .route("/broken", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .with_state(Arc::clone(&received));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, received)
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let result = ForwardingClient::new("not a url");
        assert!(matches!(
            result,
            Err(BridgeError::Config(ConfigError::InvalidUrl { .. }))
        ));
    }

    #[test]
    fn test_destination_is_the_configured_url() {
        let client = ForwardingClient::new("http://127.0.0.1:9000/from-serial").unwrap();
        assert_eq!(client.destination(), "http://127.0.0.1:9000/from-serial");
    }

    #[tokio::test]
    async fn test_deliver_posts_raw_body() {
        // Arrange
        let (addr, received) = spawn_receiver().await;
        let client = ForwardingClient::new(&format!("http://{addr}/from-serial")).unwrap();

        // Act
        let status = client.deliver(b"T=21.5\n".to_vec()).await.unwrap();

        // Assert
        assert_eq!(status, 200);
        assert_eq!(*received.lock().unwrap(), vec![b"T=21.5\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_http_error_status_is_not_a_delivery_failure() {
        // Arrange
        let (addr, _) = spawn_receiver().await;
        let client = ForwardingClient::new(&format!("http://{addr}/broken")).unwrap();

        // Act
        let status = client.deliver(b"x".to_vec()).await;

        // Assert: a 500 response is still a response
        assert_eq!(status.unwrap(), 500);
    }

    #[tokio::test]
    async fn test_unrouted_path_returns_404_status() {
        let (addr, _) = spawn_receiver().await;
        let client = ForwardingClient::new(&format!("http://{addr}/nowhere")).unwrap();

        assert_eq!(client.deliver(b"x".to_vec()).await.unwrap(), 404);
    }

    #[tokio::test]
    async fn test_connection_refused_is_a_transport_error() {
        // Arrange: grab a free port, then close it so nothing is listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = ForwardingClient::new(&format!("http://{addr}/from-serial")).unwrap();

        // Act
        let result = client.deliver(b"x".to_vec()).await;

        // Assert
        assert!(matches!(result, Err(DeliveryError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_deliver_after_close_fails_with_closed() {
        let client = ForwardingClient::new("http://127.0.0.1:9/from-serial").unwrap();
        client.close();
        client.close();

        assert!(matches!(
            client.deliver(b"x".to_vec()).await,
            Err(DeliveryError::Closed)
        ));
    }
}
