use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, TransportError};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Process-wide stop flag observed at every blocking wait.
///
/// Cloning shares the flag. Triggering it makes in-flight reads, retry
/// sleeps and connect attempts return [`TransportError::Shutdown`] instead
/// of exhausting their remaining retries.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with [`TransportError::Shutdown`] once triggered.
    pub fn check(&self) -> Result<()> {
        if self.is_triggered() {
            return Err(TransportError::Shutdown);
        }
        Ok(())
    }

    /// Sleep for `duration`, waking early if shutdown is requested.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}
