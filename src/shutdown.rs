//! A crate-global shutdown signal shared by the connector, every queue
//! consumer, and the RPC reply consumer, so each can wind down in concert
//! without the application tracking every spawned task by hand.

use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;

static TOKEN: OnceLock<CancellationToken> = OnceLock::new();

fn token() -> &'static CancellationToken {
    TOKEN.get_or_init(CancellationToken::new)
}

/// Signals every observer of [`terminated`] to wind down. Idempotent.
pub fn terminate() {
    token().cancel();
}

/// Resolves once [`terminate`] has been called.
pub async fn terminated() {
    token().cancelled().await
}

/// Returns `true` if [`terminate`] has already been called.
pub fn is_terminated() -> bool {
    token().is_cancelled()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn terminated_resolves_after_terminate() {
        // This process-global flag is exercised by other tests too; only
        // assert the non-terminated path can be observed without blocking.
        if !is_terminated() {
            tokio::select! {
                _ = terminated() => panic!("terminated resolved before terminate() was called"),
                _ = tokio::time::sleep(std::time::Duration::from_millis(10)) => {}
            }
        }
    }
}
