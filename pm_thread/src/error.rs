/// Failure modes surfaced at `pm_thread`'s public boundary. No operation
/// panics on these — each maps to its own sentinel error at the nearest
/// public call, per spec.md §7's "Thread" error kind.
#[derive(Debug, thiserror::Error)]
pub enum ThreadError {
    #[error("no thread record for handle {handle}")]
    UnknownHandle { handle: i32 },

    #[error("thread table is at capacity")]
    TableFull,

    #[error("handle {handle} is already Cancelled or Finished")]
    AlreadyTerminal { handle: i32 },

    #[error("no live thread records to operate on")]
    NoLiveThreads,

    #[error("failed to spawn OS thread: {source}")]
    SpawnFailed {
        #[source]
        source: std::io::Error,
    },
}
