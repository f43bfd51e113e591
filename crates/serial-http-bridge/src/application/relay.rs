//! SerialToHttpRelay: the device → HTTP forwarding loop.
//!
//! ```text
//!            stop requested
//! RUNNING ─────────────────▶ STOPPING ──▶ STOPPED
//!    │                                       ▲
//!    └──────────── end of stream ────────────┘
//! ```
//!
//! While running, each iteration reads one frame and delivers it before the
//! next read starts, so frames reach the destination in device order and
//! never in parallel.
//!
//! Failure policy:
//!
//! - read error: log, back off, retry (device stays open);
//! - end of stream: stop, no further reads;
//! - delivery error: log and move on (the frame is dropped).
//!
//! A stop request is honoured while waiting for bytes or backing off, never
//! during a delivery.  The frame source is cancel-safe, so abandoning a
//! pending read loses nothing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::application::ports::{Forwarder, FrameSource};
use crate::domain::Frame;

/// Lifecycle of the relay loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Running,
    Stopping,
    Stopped,
}

/// Why the relay loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// The device stream ended.
    EndOfStream,
    /// A stop was requested by the owner.
    Cancelled,
}

pub struct SerialToHttpRelay<S> {
    source: S,
    forwarder: Arc<dyn Forwarder>,
    backoff: Duration,
    state: watch::Sender<RelayState>,
}

impl<S: FrameSource> SerialToHttpRelay<S> {
    /// Builds a relay reading from `source` and posting through `forwarder`.
    /// `backoff` is the pause after a failed read.
    pub fn new(source: S, forwarder: Arc<dyn Forwarder>, backoff: Duration) -> Self {
        let (state, _) = watch::channel(RelayState::Running);
        Self {
            source,
            forwarder,
            backoff,
            state,
        }
    }

    /// Subscribes to state transitions.
    pub fn state(&self) -> watch::Receiver<RelayState> {
        self.state.subscribe()
    }

    /// Runs the loop until end of stream or until `stop` turns `true` (or
    /// its sender is dropped).
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> RelayExit {
        info!("relay started -> {}", self.forwarder.destination());
        let exit = self.run_inner(&mut stop).await;
        self.state.send_replace(RelayState::Stopped);
        info!("relay stopped ({exit:?})");
        exit
    }

    async fn run_inner(&mut self, stop: &mut watch::Receiver<bool>) -> RelayExit {
        loop {
            if *stop.borrow_and_update() {
                return self.stopping();
            }

            let read = tokio::select! {
                biased;
                _ = stop_requested(stop) => None,
                r = self.source.read_frame() => Some(r),
            };
            let Some(read) = read else {
                return self.stopping();
            };

            match read {
                Ok(Some(frame)) => Self::forward(&*self.forwarder, frame).await,
                Ok(None) => {
                    info!("serial: EOF");
                    return RelayExit::EndOfStream;
                }
                Err(e) => {
                    warn!("serial read error: {e}; retrying in {:?}", self.backoff);
                    let interrupted = tokio::select! {
                        biased;
                        _ = stop_requested(stop) => true,
                        _ = tokio::time::sleep(self.backoff) => false,
                    };
                    if interrupted {
                        return self.stopping();
                    }
                }
            }
        }
    }

    // Takes the forwarder rather than `&self`: the source is `Send` but not
    // necessarily `Sync`, so `&Self` must not be held across the delivery.
    async fn forward(forwarder: &dyn Forwarder, frame: Frame) {
        if frame.is_empty() {
            return;
        }
        if frame.is_truncated() {
            warn!(
                "serial frame reached {} bytes without a delimiter; forwarding it cut",
                frame.as_bytes().len()
            );
        } else if frame.is_partial() {
            debug!("recv partial frame from serial: {frame}");
        } else {
            debug!("recv from serial: {frame}");
        }

        let url = forwarder.destination();
        match forwarder.deliver(frame.into_bytes()).await {
            Ok(status) => info!("posted to {url} -> {status}"),
            Err(e) => warn!("failed to post serial -> http: {e}"),
        }
    }

    fn stopping(&self) -> RelayExit {
        self.state.send_replace(RelayState::Stopping);
        RelayExit::Cancelled
    }
}

/// Resolves once the stop flag is `true` or its sender is gone.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
