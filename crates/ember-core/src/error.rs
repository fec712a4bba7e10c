use thiserror::Error;

/// Error taxonomy for the coordination core.
///
/// Duplicate interactions and duplicate match rows are not represented here:
/// every such write is an upsert or `INSERT OR IGNORE`, so a retried call
/// converges instead of erroring.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The backing store was unreachable or a primary write failed. The
    /// caller may retry; best-effort side channels never produce this.
    #[error("store unavailable: {0}")]
    TransientStore(#[source] anyhow::Error),

    /// Expected business rejection: the sender's consumable balance is
    /// exhausted. Shown to the user; not retryable.
    #[error("insufficient credit (balance {balance})")]
    InsufficientCredit { balance: i64 },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("user is not a participant of this room")]
    NotParticipant,

    #[error("bad request: {0}")]
    BadRequest(&'static str),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Wrap a failed primary store operation.
    pub(crate) fn store(e: anyhow::Error) -> Self {
        CoreError::TransientStore(e)
    }
}
