//! Cancellable fixed waits.
//!
//! Every suspension point in the harness is a fixed-duration wait. Each one
//! doubles as a cancellation point so that a user interrupt is noticed within
//! one wait rather than after the whole batch.

use crate::error::{QoeError, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sleep for `duration`, returning `Err(Cancelled)` if `cancel` fires first.
pub async fn pause(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(QoeError::Cancelled);
    }
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("wait of {:?} interrupted", duration);
            Err(QoeError::Cancelled)
        }
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_pause_elapses() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        pause(&cancel, Duration::from_secs(30)).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_cancelled() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });
        let err = pause(&cancel, Duration::from_secs(60)).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_zero_wait_after_cancel_still_reports() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(pause(&cancel, Duration::ZERO).await.is_err());
    }
}
