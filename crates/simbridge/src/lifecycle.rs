//! Process shutdown handle.
//!
//! Created by the entry point and handed to whatever needs to observe or
//! trigger shutdown. Cancelling the token stops in-flight bridge polls.

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    token: CancellationToken,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token to pass to cancellable work. Cancelled on shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Shutdown requested");
        }
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Register SIGINT and SIGTERM handlers now.
    ///
    /// Signals delivered after this returns are captured even if the listener
    /// has not been polled yet. Must be called inside a tokio runtime.
    pub fn install_signal_handlers(&self) -> std::io::Result<SignalListener> {
        #[cfg(unix)]
        let listener = {
            use tokio::signal::unix::{SignalKind, signal};
            SignalListener {
                lifecycle: self.clone(),
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            }
        };

        #[cfg(windows)]
        let listener = SignalListener {
            lifecycle: self.clone(),
            interrupt: tokio::signal::windows::ctrl_c()?,
        };

        #[cfg(not(any(unix, windows)))]
        let listener = SignalListener {
            lifecycle: self.clone(),
        };

        Ok(listener)
    }

    /// Install the handlers and wait for a signal, then shut down.
    pub async fn listen_for_signals(&self) -> std::io::Result<()> {
        self.install_signal_handlers()?.run().await;
        Ok(())
    }
}

/// Installed signal handlers, waiting to be driven by [`SignalListener::run`].
#[derive(Debug)]
pub struct SignalListener {
    lifecycle: Lifecycle,
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(windows)]
    interrupt: tokio::signal::windows::CtrlC,
}

impl SignalListener {
    /// Wait for SIGINT or SIGTERM, then shut down. Also returns once shutdown
    /// is triggered some other way.
    pub async fn run(mut self) {
        let lifecycle = self.lifecycle.clone();

        #[cfg(unix)]
        let signalled = async {
            tokio::select! {
                _ = self.interrupt.recv() => tracing::info!("Received SIGINT"),
                _ = self.terminate.recv() => tracing::info!("Received SIGTERM"),
            }
        };

        #[cfg(windows)]
        let signalled = async {
            self.interrupt.recv().await;
            tracing::info!("Received Ctrl+C");
        };

        #[cfg(not(any(unix, windows)))]
        let signalled = std::future::pending::<()>();

        tokio::select! {
            _ = signalled => lifecycle.shutdown(),
            _ = lifecycle.cancelled() => {}
        }
    }
}
