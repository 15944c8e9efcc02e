use std::io;

/// Failure modes surfaced at `pm_shm`'s public boundary.
///
/// Every OS/IPC syscall failure is wrapped with the `key`/`errno` context
/// that produced it so callers (and the log sink) can narrate exactly what
/// failed without re-deriving it from a bare `io::Error`.
#[derive(Debug, thiserror::Error)]
pub enum ShmError {
    #[error("no segment registered for key {key}")]
    NotFound { key: i32 },

    #[error("address was not found in any descriptor's attachment list")]
    UnknownAddress,

    #[error("shmget failed for key {key}: {source}")]
    ShmGetFailed { key: i32, #[source] source: io::Error },

    #[error("shmat failed for key {key}: {source}")]
    ShmAtFailed { key: i32, #[source] source: io::Error },

    #[error("shmdt failed: {source}")]
    ShmDtFailed { #[source] source: io::Error },

    #[error("shmctl failed for key {key}: {source}")]
    ShmCtlFailed { key: i32, #[source] source: io::Error },

    #[error("semget failed for key {key}: {source}")]
    SemGetFailed { key: i32, #[source] source: io::Error },

    #[error("semop failed for key {key}: {source}")]
    SemOpFailed { key: i32, #[source] source: io::Error },

    #[error("semctl failed for key {key}: {source}")]
    SemCtlFailed { key: i32, #[source] source: io::Error },

    /// The OS-level segment for `key` was already removed by a peer by the
    /// time this process called `destroy`. Local state was still
    /// reconciled (the descriptor was erased); per spec.md §9 (c) this is a
    /// soft error callers may treat as informational.
    #[error("segment for key {key} was already removed by another process")]
    AlreadyRemoved { key: i32 },

    #[error(transparent)]
    Io(#[from] io::Error),
}
