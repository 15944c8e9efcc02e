/// Capacity of the descriptor table's backing [`pm_store::Hash`].
///
/// Carried over from `original_source/include/shared_mem.h`'s
/// `SHM_MAX_SEGMENTS`. This workspace's descriptor table only ever holds the
/// handful of keys a producer/observer pair actually connects to; the bound
/// exists so the table has a fixed capacity the way the legacy hash table
/// did, not because anything here approaches it.
pub const SHM_MAX_SEGMENTS: usize = 4096;

/// Documented, not enforced: the legacy header's comment on Linux's true
/// per-segment attachment ceiling (`SHMSEG`/`shmall`-adjacent limits are
/// usually far higher than callers will ever reach). This workspace's
/// `Vec`-backed attachment list has no practical ceiling of its own.
pub const LINUX_ATTACHMENT_CEILING: usize = 65514;
