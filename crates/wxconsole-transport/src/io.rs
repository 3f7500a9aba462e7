use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::shutdown::ShutdownSignal;
use crate::traits::TransportConfig;

/// Longest single blocking read, so shutdown is noticed promptly.
const READ_SLICE: Duration = Duration::from_millis(100);

/// Fill `buf` from `reader` before `timeout` elapses.
///
/// `set_slice` applies the per-read timeout to the underlying handle.
pub(crate) fn read_exact_deadline<R, F>(
    reader: &mut R,
    buf: &mut [u8],
    timeout: Duration,
    shutdown: &ShutdownSignal,
    mut set_slice: F,
) -> Result<()>
where
    R: Read + ?Sized,
    F: FnMut(&mut R, Duration) -> std::io::Result<()>,
{
    let deadline = Instant::now() + timeout;
    let mut filled = 0usize;

    while filled < buf.len() {
        shutdown.check()?;

        let now = Instant::now();
        if now >= deadline {
            return Err(TransportError::Timeout {
                expected: buf.len(),
                received: filled,
                timeout,
            });
        }
        let slice = READ_SLICE.min(deadline - now).max(Duration::from_millis(1));
        set_slice(reader, slice)?;

        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(n) => filled += n,
            Err(err)
                if err.kind() == ErrorKind::WouldBlock
                    || err.kind() == ErrorKind::TimedOut
                    || err.kind() == ErrorKind::Interrupted =>
            {
                continue;
            }
            Err(err) => return Err(TransportError::Io(err)),
        }
    }

    Ok(())
}

/// Run `attempt` until it succeeds or the configured attempts run out.
pub(crate) fn connect_with_retry<T, F>(
    endpoint: &str,
    config: &TransportConfig,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> std::io::Result<T>,
{
    let attempts = config.connect_attempts.max(1);
    let mut last_error = None;

    for n in 1..=attempts {
        config.shutdown.check()?;
        match attempt() {
            Ok(handle) => {
                debug!(endpoint, attempt = n, "connected");
                return Ok(handle);
            }
            Err(err) => {
                warn!(endpoint, attempt = n, error = %err, "connect attempt failed");
                last_error = Some(err);
                if n < attempts {
                    config.shutdown.sleep(config.retry_delay)?;
                }
            }
        }
    }

    Err(TransportError::ConnectFailed {
        endpoint: endpoint.to_string(),
        attempts,
        source: last_error.unwrap_or_else(|| std::io::Error::other("no connect attempt made")),
    })
}
