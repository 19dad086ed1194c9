//! Best-effort side effects
//!
//! Some work done after a triage, such as recording the suggested fix in the
//! history file, must never change what the user sees or the exit code.
//! [`fail_open`] runs such work and turns an error into a WARN line.
//!
//! Not for evidence resolution, the remote call, or exit code propagation:
//! those failures belong to the user.

use crate::Result;
use std::future::Future;
use tracing::warn;

/// Run `work`, logging and discarding its error
///
/// ```no_run
/// use deflake_core::fail_open::fail_open;
///
/// async fn record_fix() -> deflake_core::Result<()> {
///     Ok(())
/// }
///
/// # async fn demo() {
/// // `None` means the history write failed and was logged
/// let recorded = fail_open("history", record_fix).await;
/// # }
/// ```
pub async fn fail_open<W, Fut, T>(what: &str, work: W) -> Option<T>
where
    W: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    work()
        .await
        .map_err(|e| warn!("Skipping {} after error: {}", what, e))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeflakeError;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_value_passes_through() {
        let written = fail_open("history", || async { Ok::<_, DeflakeError>(3usize) }).await;
        assert_eq!(written, Some(3));
    }

    #[tokio::test]
    async fn test_error_is_swallowed() {
        let written = fail_open("history", || async {
            let path = PathBuf::from("/read-only/.deflake/history.json");
            Err::<(), _>(DeflakeError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("cannot write {}", path.display()),
            )))
        })
        .await;
        assert!(written.is_none());
    }
}
