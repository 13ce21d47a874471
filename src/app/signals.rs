//! Signal handling for graceful shutdown
//!
//! CTRL-C or SIGTERM flips a `watch` flag. Long-running parts of the pipeline
//! hold a [`ShutdownSignal`] and stop at the next safe point: the producer
//! stops fetching orders, workers stop taking jobs and in-flight transfers
//! flush what they have and leave the temporary file for the next run.

use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Sending side of the shutdown flag
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Request shutdown; idempotent
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving side of the shutdown flag
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_trigger, signal) = create_shutdown_channel();
        signal
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested
    ///
    /// If every trigger is dropped without firing, this never resolves.
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Create a connected trigger/signal pair
pub fn create_shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

/// Signal handler for graceful shutdown coordination
pub struct SignalHandler {
    trigger: ShutdownTrigger,
}

impl SignalHandler {
    pub fn new(trigger: ShutdownTrigger) -> Self {
        Self { trigger }
    }

    /// Spawn a task that fires the trigger on CTRL-C or SIGTERM
    pub fn setup(&self) -> JoinHandle<()> {
        let trigger = self.trigger.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => info!("Received Ctrl+C, finishing in-flight chunks and stopping"),
                _ = terminate => info!("Received terminate signal, finishing in-flight chunks and stopping"),
            }

            trigger.trigger();
        })
    }
}
