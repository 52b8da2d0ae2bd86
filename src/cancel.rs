//! Cooperative cancellation, checked between entries.

use crate::error::{AttrError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag set when the user asks to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(AttrError::Interrupted)` once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AttrError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Arms the token from Ctrl-C.
    ///
    /// A detached thread runs a current-thread tokio runtime that waits for
    /// the signal. A second Ctrl-C while the first is being handled
    /// terminates the process right away.
    pub fn install_ctrl_c_handler(&self) -> std::io::Result<()> {
        let token = self.clone();
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        std::thread::Builder::new()
            .name("ctrl-c".into())
            .spawn(move || {
                runtime.block_on(async move {
                    if tokio::signal::ctrl_c().await.is_err() {
                        return;
                    }
                    tracing::debug!("interrupt received");
                    token.cancel();
                    if tokio::signal::ctrl_c().await.is_ok() {
                        eprintln!("Cancelling...");
                        std::process::exit(crate::error::USER_INTERRUPTED as i32);
                    }
                });
            })?;
        Ok(())
    }
}
