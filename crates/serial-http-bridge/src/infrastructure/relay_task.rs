//! RelayTask: the relay loop running as a cancellable background task.
//!
//! Wraps the `JoinHandle` together with the stop signal and the relay's
//! state channel, so the owner has one object to stop, observe, and join.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;

use crate::application::ports::FrameSource;
use crate::application::relay::{RelayExit, RelayState, SerialToHttpRelay};

pub struct RelayTask {
    stop_tx: watch::Sender<bool>,
    state: watch::Receiver<RelayState>,
    handle: Option<JoinHandle<RelayExit>>,
    exit: Option<RelayExit>,
}

impl RelayTask {
    /// Spawns `relay` onto the Tokio runtime.
    pub fn spawn<S>(relay: SerialToHttpRelay<S>) -> Self
    where
        S: FrameSource + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let state = relay.state();
        let handle = tokio::spawn(relay.run(stop_rx));

        Self {
            stop_tx,
            state,
            handle: Some(handle),
            exit: None,
        }
    }

    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    /// Requests a stop.  Returns immediately; use [`RelayTask::join`] to wait.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Waits for the loop to end.  Later calls return the remembered exit
    /// reason without waiting.  `None` if the task panicked.
    pub async fn join(&mut self) -> Option<RelayExit> {
        if let Some(handle) = self.handle.take() {
            match handle.await {
                Ok(exit) => self.exit = Some(exit),
                Err(e) => error!("relay task failed: {e}"),
            }
        }
        self.exit
    }

    pub async fn stop_and_join(&mut self) -> Option<RelayExit> {
        self.stop();
        self.join().await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
