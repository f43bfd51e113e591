//! serial-http-bridge: entry point.
//!
//! Forwards every line read from a serial device to an HTTP endpoint, and
//! writes the body of every `POST /to-serial` request to the device.
//!
//! # Usage
//!
//! ```text
//! serial-http-bridge --port <DEVICE> [OPTIONS]
//!
//! Options:
//!   -p, --port <DEVICE>          Serial device (e.g. /dev/ttyUSB0 or COM3)
//!   -b, --baud <BAUD>            Serial baud rate [default: 9600]
//!       --http-host <HOST>       Listen host for POST /to-serial [default: 127.0.0.1]
//!       --http-port <PORT>       Listen port for POST /to-serial [default: 8000]
//!       --post-url <URL>         Where serial frames are POSTed
//!                                [default: http://127.0.0.1:9000/from-serial]
//!       --newline <DELIM>        Frame delimiter, backslash escapes allowed [default: \n]
//!       --read-backoff-ms <MS>   Pause after a failed serial read [default: 1000]
//!       --max-frame-len <BYTES>  Cut frames that grow past this size [default: 65536]
//!       --shutdown-grace-secs <S> Wait for in-flight requests at shutdown [default: 60]
//!       --allow-missing-device   Serve 503 instead of exiting if the device won't open
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence when both are present.
//!
//! | Variable                              | Default                              |
//! |---------------------------------------|--------------------------------------|
//! | `SERIAL_BRIDGE_PORT`                  | (required)                           |
//! | `SERIAL_BRIDGE_BAUD`                  | `9600`                               |
//! | `SERIAL_BRIDGE_HTTP_HOST`             | `127.0.0.1`                          |
//! | `SERIAL_BRIDGE_HTTP_PORT`             | `8000`                               |
//! | `SERIAL_BRIDGE_POST_URL`              | `http://127.0.0.1:9000/from-serial`  |
//! | `SERIAL_BRIDGE_NEWLINE`               | `\n`                                 |
//! | `SERIAL_BRIDGE_READ_BACKOFF_MS`       | `1000`                               |
//! | `SERIAL_BRIDGE_MAX_FRAME_LEN`         | `65536`                              |
//! | `SERIAL_BRIDGE_SHUTDOWN_GRACE_SECS`   | `60`                                 |
//! | `SERIAL_BRIDGE_ALLOW_MISSING_DEVICE`  | `false`                              |

use std::net::ToSocketAddrs;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use serial_http_bridge::domain::{BridgeConfig, Delimiter};
use serial_http_bridge::infrastructure::run_bridge;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Bidirectional bridge between a serial device and HTTP.
#[derive(Debug, Parser)]
#[command(
    name = "serial-http-bridge",
    about = "Bidirectional bridge between a serial device and a local HTTP endpoint",
    version
)]
struct Cli {
    /// Serial device (e.g. /dev/ttyUSB0 or COM3).
    #[arg(long, short = 'p', env = "SERIAL_BRIDGE_PORT")]
    port: String,

    /// Serial baud rate.
    #[arg(long, short = 'b', default_value_t = 9600, env = "SERIAL_BRIDGE_BAUD")]
    baud: u32,

    /// Host for the HTTP server that receives data for the device.
    ///
    /// Hostnames such as `localhost` are resolved; the first address wins.
    #[arg(long, default_value = "127.0.0.1", env = "SERIAL_BRIDGE_HTTP_HOST")]
    http_host: String,

    /// Port for the HTTP server that receives data for the device.
    #[arg(long, default_value_t = 8000, env = "SERIAL_BRIDGE_HTTP_PORT")]
    http_port: u16,

    /// URL that every frame read from the device is POSTed to.
    #[arg(
        long,
        default_value = "http://127.0.0.1:9000/from-serial",
        env = "SERIAL_BRIDGE_POST_URL"
    )]
    post_url: String,

    /// Line delimiter used to cut serial input into frames.
    ///
    /// Accepts `\n`, `\r`, `\t`, `\0`, `\\` and `\xHH` escapes, e.g. `\r\n`.
    #[arg(long, default_value = "\\n", env = "SERIAL_BRIDGE_NEWLINE")]
    newline: String,

    /// Milliseconds to wait after a failed serial read before retrying.
    #[arg(long, default_value_t = 1000, env = "SERIAL_BRIDGE_READ_BACKOFF_MS")]
    read_backoff_ms: u64,

    /// Longest frame forwarded intact; longer runs are cut at this size.
    #[arg(long, default_value_t = 65536, env = "SERIAL_BRIDGE_MAX_FRAME_LEN")]
    max_frame_len: usize,

    /// Seconds shutdown waits for in-flight `POST /to-serial` requests.
    #[arg(long, default_value_t = 60, env = "SERIAL_BRIDGE_SHUTDOWN_GRACE_SECS")]
    shutdown_grace_secs: u64,

    /// Keep serving HTTP (answering 503) if the device cannot be opened.
    #[arg(long, env = "SERIAL_BRIDGE_ALLOW_MISSING_DEVICE")]
    allow_missing_device: bool,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the listen host does not resolve, the delimiter
    /// is empty or malformed, or the resulting config fails validation.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let http_bind_addr = (self.http_host.as_str(), self.http_port)
            .to_socket_addrs()
            .with_context(|| {
                format!(
                    "invalid HTTP listen address: '{}:{}'",
                    self.http_host, self.http_port
                )
            })?
            .next()
            .with_context(|| {
                format!(
                    "HTTP listen host '{}' resolved to no addresses",
                    self.http_host
                )
            })?;

        let delimiter = Delimiter::parse_escaped(&self.newline)
            .with_context(|| format!("invalid --newline value '{}'", self.newline))?;

        let config = BridgeConfig {
            device_path: self.port,
            baud_rate: self.baud,
            delimiter,
            max_frame_len: self.max_frame_len,
            post_url: self.post_url,
            http_bind_addr,
            read_retry_backoff: Duration::from_millis(self.read_backoff_ms),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            allow_missing_device: self.allow_missing_device,
        };
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log level comes from RUST_LOG; `info` when unset or invalid.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_bridge_config()?;

    info!(
        "serial-http-bridge starting: device={} @ {} baud, delimiter=\"{}\"",
        config.device_path, config.baud_rate, config.delimiter
    );
    info!(
        "listening on http://{}, forwarding to {}",
        config.http_bind_addr, config.post_url
    );

    run_bridge(config, shutdown_signal())
        .await
        .context("serial-http-bridge failed to start")?;

    info!("serial-http-bridge stopped");
    Ok(())
}

/// Resolves on Ctrl+C (SIGINT).
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, initiating graceful shutdown"),
        Err(e) => {
            // Without a signal handler the process can only be killed.
            error!("failed to listen for Ctrl+C signal: {e}");
            std::future::pending::<()>().await;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
