//! Per-operation cancellation and deadlines.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::TransactionError;

/// Context passed to every transaction operation.
///
/// Each database round trip races against the cancellation token and the
/// deadline. When either fires first the in-flight statement is dropped and
/// the operation fails with [`TransactionError::Cancelled`] or
/// [`TransactionError::DeadlineExceeded`].
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `fut` unless cancellation or the deadline comes first.
    pub(crate) async fn run<F, T>(&self, fut: F) -> Result<T, TransactionError>
    where
        F: Future<Output = Result<T, TransactionError>>,
    {
        if self.is_cancelled() {
            return Err(TransactionError::Cancelled);
        }
        if self.deadline.is_some_and(|d| d <= Instant::now()) {
            return Err(TransactionError::DeadlineExceeded);
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransactionError::Cancelled),
            _ = deadline => Err(TransactionError::DeadlineExceeded),
            result = fut => result,
        }
    }
}
