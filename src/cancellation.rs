// cancellation.rs
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Hands out one abort signal per connection lifetime.
///
/// The current token is shared by `connect`, `send` and the receive loop of a
/// single lifetime. Once cancelled it stays cancelled; [`reissue`] replaces it
/// so the next lifetime starts with a fresh one.
///
/// [`reissue`]: CancellationController::reissue
#[derive(Debug)]
pub struct CancellationController {
    inner: Mutex<Issued>,
}

#[derive(Debug)]
struct Issued {
    token: CancellationToken,
    generation: u64,
}

impl CancellationController {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Issued {
                token: CancellationToken::new(),
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Issued> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Token of the current lifetime.
    pub fn token(&self) -> CancellationToken {
        self.lock().token.clone()
    }

    /// How many tokens were minted before the current one.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().token.is_cancelled()
    }

    pub fn cancel(&self) {
        let issued = self.lock();
        debug!(generation = issued.generation, "cancelling connection token");
        issued.token.cancel();
    }

    /// Mints a new token for the next lifetime and returns it.
    pub fn reissue(&self) -> CancellationToken {
        let mut issued = self.lock();
        issued.token = CancellationToken::new();
        issued.generation += 1;
        debug!(generation = issued.generation, "minted connection token");
        issued.token.clone()
    }
}

impl Default for CancellationController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_token_is_never_handed_out_again() {
        let controller = CancellationController::new();
        let first = controller.token();
        controller.cancel();
        assert!(first.is_cancelled());
        assert!(controller.is_cancelled());

        let second = controller.reissue();
        assert!(!second.is_cancelled());
        assert!(!controller.token().is_cancelled());
        assert!(first.is_cancelled());
        assert_eq!(controller.generation(), 1);
    }

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let controller = CancellationController::new();
        let token = controller.token();
        let waiter = tokio::spawn(async move { token.cancelled().await });
        controller.cancel();
        waiter.await.unwrap();
    }
}
