use std::future::Future;
use tracing::warn;

use crate::{CoreError, CoreResult};

/// Runs `attempt` until it stops failing with [`CoreError::Conflict`].
///
/// Each call must re-read whatever it validates; a conflict means the
/// records it read were stale when it tried to commit. After `max_attempts`
/// conflicts the last one is returned.
pub async fn retry_on_conflict<T, F, Fut>(
    max_attempts: u32,
    operation: &str,
    mut attempt: F,
) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut tries = 0;

    loop {
        tries += 1;
        match attempt().await {
            Err(CoreError::Conflict(reason)) if tries < max_attempts => {
                warn!("{} hit a version conflict (attempt {}/{}): {}", operation, tries, max_attempts, reason);
            }
            Err(CoreError::Conflict(reason)) => {
                warn!("{} gave up after {} attempts", operation, tries);
                return Err(CoreError::Conflict(format!(
                    "{} lost the race after {} attempts: {}",
                    operation, tries, reason
                )));
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_conflicts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_on_conflict(3, "reserve", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CoreError::Conflict("stale".into()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_conflict() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: CoreResult<()> = retry_on_conflict(3, "reserve", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::Conflict("stale".into()))
        })
        .await;

        assert!(matches!(result, Err(CoreError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: CoreResult<()> = retry_on_conflict(3, "reserve", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::InvalidSeatCount(0))
        })
        .await;

        assert!(matches!(result, Err(CoreError::InvalidSeatCount(0))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
