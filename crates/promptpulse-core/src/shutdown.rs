//! Graceful shutdown utilities
//!
//! A worker process waits on SIGINT/SIGTERM, then closes its consumer so
//! in-flight handlers get their grace period before the process exits.

use tokio::sync::watch;

/// What triggered the shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Requested from within the process
    Manual,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
            ShutdownSignal::Manual => write!(f, "Manual"),
        }
    }
}

/// Checks and awaits a process-wide shutdown request
#[derive(Clone)]
pub struct ShutdownToken {
    receiver: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Whether shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until shutdown is requested
    pub async fn cancelled(&mut self) {
        let _ = self.receiver.wait_for(|requested| *requested).await;
    }
}

/// Process-wide shutdown coordinator
pub struct GracefulShutdown {
    sender: watch::Sender<bool>,
}

impl GracefulShutdown {
    /// Create a coordinator; nothing is shut down yet
    pub fn new() -> Self {
        Self {
            sender: watch::channel(false).0,
        }
    }

    /// A token for tasks that should stop on shutdown
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            receiver: self.sender.subscribe(),
        }
    }

    /// Request shutdown from within the process
    pub fn shutdown(&self) {
        let _ = self.sender.send(true);
    }

    /// Wait for SIGINT or SIGTERM, then notify every token
    pub async fn wait(&self) -> ShutdownSignal {
        let signal = wait_for_signal().await;
        tracing::info!(signal = %signal, "Shutdown signal received");
        let _ = self.sender.send(true);
        signal
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for SIGINT or SIGTERM
pub async fn wait_for_signal() -> ShutdownSignal {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint =
            signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => ShutdownSignal::Interrupt,
            _ = sigterm.recv() => ShutdownSignal::Terminate,
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to register Ctrl+C handler");
        ShutdownSignal::Interrupt
    }
}
