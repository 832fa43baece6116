use thiserror::Error;
use ulid::Ulid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("event not found: '{0}'")]
    TitleNotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("an event titled '{0}' already exists")]
    DuplicateTitle(String),
    #[error("a genre named '{0}' already exists")]
    DuplicateGenre(String),
    #[error("cannot delete event '{0}': it still has bookings")]
    EventHasBookings(String),
    #[error("invalid input: {0}")]
    Invalid(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("timed out waiting for the lock on event {0}")]
    LockTimeout(Ulid),
    #[error("WAL error: {0}")]
    Wal(String),
    #[error("commit task failed: {0}")]
    CommitTask(String),
}
