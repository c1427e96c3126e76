//! Shutdown signal plumbing, mirrored from the teacher's
//! `shutdown_controller` (§5 "Cancellation": background tasks exit promptly
//! on shutdown).

pub struct ShutdownController {
    shutdown: tokio::sync::oneshot::Receiver<()>,
}

struct ShutdownSignal(tokio::sync::oneshot::Sender<()>);

impl ShutdownController {
    /// Reacts to SIGINT/SIGTERM from the OS.
    pub fn new_shutdown_on_signal() -> Self {
        let (sender, receiver) = tokio::sync::oneshot::channel();
        tokio::spawn(Self::wait_for_signal(ShutdownSignal(sender)));
        Self { shutdown: receiver }
    }

    async fn wait_for_signal(shutdown: ShutdownSignal) {
        #[cfg(unix)]
        {
            use tokio::signal::{self, unix};
            let mut sigterm = unix::signal(unix::SignalKind::terminate()).unwrap();
            let ctrl_c = signal::ctrl_c();
            tokio::select! {
                _ = ctrl_c => tracing::info!("received SIGINT"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            tracing::info!("received SIGINT");
        }
        let _ = shutdown.0.send(());
    }

    /// Resolves once a shutdown signal has been received.
    pub async fn wait(self) {
        let _ = self.shutdown.await;
    }
}
