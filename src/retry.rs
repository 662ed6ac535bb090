//! Fixed-delay, uncapped retry.
//!
//! [`retry_forever`] keeps calling an action until it succeeds, waiting the
//! same delay after every failure. There is no attempt limit; the only other
//! way out is dropping the returned future.

use std::future::Future;
use std::time::Duration;

/// What happened on one attempt, as seen by the observer.
#[derive(Debug)]
pub enum AttemptOutcome<'a, E> {
    Succeeded,
    Failed { error: &'a E, retry_in: Duration },
}

/// Run `action` until it returns `Ok`, sleeping `delay` between failures.
///
/// `on_attempt` is called once per attempt with the 1-based attempt number,
/// before any wait.
pub async fn retry_forever<T, E, F, Fut, O>(mut action: F, delay: Duration, mut on_attempt: O) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    O: FnMut(u32, AttemptOutcome<'_, E>),
{
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        match action().await {
            Ok(value) => {
                on_attempt(attempt, AttemptOutcome::Succeeded);
                return value;
            }
            Err(error) => {
                on_attempt(
                    attempt,
                    AttemptOutcome::Failed {
                        error: &error,
                        retry_in: delay,
                    },
                );
            }
        }
        tokio::time::sleep(delay).await;
    }
}
