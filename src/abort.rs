// ABOUTME: Shared cancellation flag set on Ctrl-C.
// ABOUTME: Workers poll it between units of work and stop early once it is set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sets the flag when the process receives Ctrl-C.
    pub fn watch_ctrl_c(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing in-flight work");
                signal.trigger();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let signal = AbortSignal::new();
        let worker = signal.clone();
        assert!(!worker.is_triggered());
        signal.trigger();
        assert!(worker.is_triggered());
    }
}
