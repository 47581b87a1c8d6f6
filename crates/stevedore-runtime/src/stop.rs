//! Single-slot stop mailbox between a service record and its supervisor.
//!
//! The handle side lives in the registry record and is used by undeploy to
//! request termination and wait for the answer. The listener side is owned
//! by the supervisor, which acknowledges exactly once on its way out.

use std::time::Duration;

use tokio::sync::{mpsc, watch};

/// Result of waiting for a stop acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The supervisor tore everything down.
    Stopped,
    /// The supervisor ended but teardown did not complete.
    Failed,
    /// No acknowledgement arrived in time.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckState {
    Pending,
    Stopped,
    Failed,
}

/// Creates a connected handle/listener pair.
#[must_use]
pub fn stop_mailbox() -> (StopHandle, StopListener) {
    let (request_tx, request_rx) = mpsc::channel(1);
    let (ack_tx, ack_rx) = watch::channel(AckState::Pending);
    (
        StopHandle {
            request: request_tx,
            ack: ack_rx,
        },
        StopListener {
            requests: StopRequests { rx: request_rx },
            ack: StopAck {
                tx: ack_tx,
                sent: false,
            },
        },
    )
}

/// Requesting side, stored in the service record.
#[derive(Debug, Clone)]
pub struct StopHandle {
    request: mpsc::Sender<()>,
    ack: watch::Receiver<AckState>,
}

impl StopHandle {
    /// Asks the supervisor to stop.
    ///
    /// Returns `false` only if the supervisor is already gone. Repeated
    /// requests collapse into the pending one.
    pub fn request_stop(&self) -> bool {
        match self.request.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }

    /// Waits up to `timeout` for the supervisor's acknowledgement.
    ///
    /// A supervisor that vanished without acknowledging counts as failed.
    pub async fn await_stop_result(&self, timeout: Duration) -> StopOutcome {
        let mut ack = self.ack.clone();
        match tokio::time::timeout(timeout, ack.wait_for(|state| *state != AckState::Pending))
            .await
        {
            Ok(Ok(state)) if *state == AckState::Stopped => StopOutcome::Stopped,
            Ok(_) => StopOutcome::Failed,
            Err(_) => StopOutcome::TimedOut,
        }
    }
}

/// Supervisor side of the mailbox.
#[derive(Debug)]
pub struct StopListener {
    requests: StopRequests,
    ack: StopAck,
}

impl StopListener {
    /// Splits the listener so the request side can be polled in a `select!`
    /// while the acknowledgement travels with the cleanup guard.
    #[must_use]
    pub fn into_parts(self) -> (StopRequests, StopAck) {
        (self.requests, self.ack)
    }
}

/// Receiving end of stop requests.
#[derive(Debug)]
pub struct StopRequests {
    rx: mpsc::Receiver<()>,
}

impl StopRequests {
    /// Resolves once a stop has been requested.
    ///
    /// Never resolves if every handle has been dropped.
    pub async fn requested(&mut self) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

/// Acknowledging end, answered at most once.
#[derive(Debug)]
pub struct StopAck {
    tx: watch::Sender<AckState>,
    sent: bool,
}

impl StopAck {
    /// Publishes the teardown result. Later calls are ignored.
    pub fn acknowledge(&mut self, stopped: bool) {
        if self.sent {
            tracing::debug!("stop already acknowledged");
            return;
        }
        self.sent = true;
        let state = if stopped {
            AckState::Stopped
        } else {
            AckState::Failed
        };
        let _ = self.tx.send_replace(state);
    }

    /// Returns whether the acknowledgement has been sent.
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        self.sent
    }
}
