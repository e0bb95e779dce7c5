//! Cooperative cancellation shared between the signal handler and the run loop

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

/// Sending side; dropping it leaves receivers uncancelled
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

/// Receiving side, cheap to clone into every phase
#[derive(Debug, Clone)]
pub struct Cancellation {
    receiver: watch::Receiver<bool>,
    // holds the channel open for tokens without an external handle
    _owner: Option<Arc<watch::Sender<bool>>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // receivers may all be gone already
        let _ = self.sender.send(true);
    }
}

impl Cancellation {
    pub fn new() -> (CancelHandle, Cancellation) {
        let (sender, receiver) = watch::channel(false);
        (
            CancelHandle {
                sender: Arc::new(sender),
            },
            Cancellation {
                receiver,
                _owner: None,
            },
        )
    }

    /// A token that is never cancelled
    pub fn never() -> Cancellation {
        let (sender, receiver) = watch::channel(false);
        Cancellation {
            receiver,
            _owner: Some(Arc::new(sender)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if the handle is dropped
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Cancel on the first Ctrl-C
pub fn install_ctrl_c(handle: CancelHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, finishing the current iteration as cancelled");
                handle.cancel();
            }
            Err(e) => warn!("Unable to listen for Ctrl-C: {}", e),
        }
    });
}
