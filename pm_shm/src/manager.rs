use std::os::raw::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex};

use pm_log::{log_warn, log_event, Level};
use pm_store::Hash;

use crate::consts::SHM_MAX_SEGMENTS;
use crate::error::ShmError;
use crate::raw;
use crate::segment::Descriptor;

/// Whether newly connected segments get a companion semaphore. Consulted
/// only inside `connect`; per spec.md §4.3/§9 it must be set before the
/// first `connect` and changing it afterward is documented as undefined,
/// not guarded against.
static USE_SEMAPHORES: AtomicBool = AtomicBool::new(true);

struct Manager {
    segments: Hash<Descriptor>,
}

static MANAGER: LazyLock<Mutex<Manager>> = LazyLock::new(|| {
    Mutex::new(Manager {
        segments: Hash::new(SHM_MAX_SEGMENTS),
    })
});

/// Enable or disable the companion semaphore for segments connected after
/// this call. Must be called before the first [`connect`].
pub fn use_semaphores(enable: bool) {
    if !enable {
        log_event(Level::Warning, "Disabling semaphore usage").ok();
    }
    USE_SEMAPHORES.store(enable, Ordering::SeqCst);
}

/// Attach to the segment registered under `key`, creating it (and, if
/// locking is enabled, its companion semaphore) on first use.
///
/// Returns `None` on any OS-level failure; the failure itself is logged.
pub fn connect(key: i32, size: usize) -> Option<*mut c_void> {
    tracing::debug!(key, size, "pm_shm::connect");
    let mut manager = MANAGER.lock().unwrap();

    if let Some(descriptor) = manager.segments.get_mut(key) {
        return match raw::shm_attach(key, descriptor.shm_id) {
            Ok(addr) => {
                descriptor.push_attachment(addr);
                Some(addr as *mut c_void)
            }
            Err(e) => {
                log_warn!("connect: reattach to key {key} failed: {e}");
                None
            }
        };
    }

    let shm_id = match raw::shm_get(key, size) {
        Ok(id) => id,
        Err(e) => {
            log_warn!("connect: shmget for key {key} failed: {e}");
            return None;
        }
    };

    let addr = match raw::shm_attach(key, shm_id) {
        Ok(addr) => addr,
        Err(e) => {
            log_warn!("connect: shmat for key {key} failed: {e}");
            return None;
        }
    };

    let lock_id = if USE_SEMAPHORES.load(Ordering::SeqCst) {
        match raw::sem_create_locked_then_post(key) {
            Ok(sem_id) => Some(sem_id),
            Err(e) => {
                log_warn!("connect: could not create companion semaphore for key {key}: {e}");
                None
            }
        }
    } else {
        None
    };

    let mut descriptor = Descriptor::new(shm_id, lock_id, size);
    descriptor.push_attachment(addr);
    manager.segments.insert(key, descriptor);

    Some(addr as *mut c_void)
}

/// Detach `address`, resolving it back to its owning descriptor by reverse
/// scan (spec.md §9 (b): process-local address uniqueness, not
/// cross-process, is what this relies on — deliberate).
pub fn detach(address: *mut c_void) -> Result<(), ShmError> {
    tracing::debug!(addr = ?address, "pm_shm::detach");
    let addr = address as usize;
    let mut manager = MANAGER.lock().unwrap();

    let mut owning_key = None;
    manager.segments.for_each(|key, descriptor| {
        if descriptor.has_attachment(addr) {
            owning_key = Some(key);
        }
    });
    let key = owning_key.ok_or(ShmError::UnknownAddress)?;

    raw::shm_detach(addr)?;

    let descriptor = manager.segments.get_mut(key).expect("key found above");
    descriptor.remove_attachment(addr);

    let shm_id = descriptor.shm_id;
    let lock_id = descriptor.lock_id;
    let now_empty_locally = descriptor.attachment_count() == 0;

    // Invariant (spec.md §4.3/§9): attachments.len() >= 1 while registered,
    // so a descriptor with no local attachments left is erased here even
    // though the OS segment itself may still be live for other processes.
    if now_empty_locally {
        manager.segments.remove(key);
    }

    if let Ok(0) = raw::shm_nattch(key, shm_id) {
        if let Some(sem_id) = lock_id {
            if let Err(e) = raw::sem_remove(key, sem_id) {
                log_warn!("detach: could not remove companion semaphore for key {key}: {e}");
            }
        }
    }

    Ok(())
}

/// Detach every address this process holds on `key`, tear down the
/// companion semaphore, flag the OS segment for removal, and erase the
/// descriptor regardless of the outcome (best-effort, per spec.md §4.3).
pub fn destroy(key: i32) -> Result<(), ShmError> {
    tracing::debug!(key, "pm_shm::destroy");
    let mut manager = MANAGER.lock().unwrap();
    let descriptor = manager
        .segments
        .get_mut(key)
        .ok_or(ShmError::NotFound { key })?;

    let shm_id = descriptor.shm_id;
    let lock_id = descriptor.lock_id;

    let mut addrs = Vec::new();
    descriptor.for_each_attachment(|a| addrs.push(*a));
    for addr in addrs {
        if let Err(e) = raw::shm_detach(addr) {
            log_warn!("destroy: detach of {addr:#x} for key {key} failed: {e}");
        }
    }

    if let Some(sem_id) = lock_id {
        if let Err(e) = raw::sem_remove(key, sem_id) {
            log_warn!("destroy: could not remove companion semaphore for key {key}: {e}");
        }
    }

    manager.segments.remove(key);

    match raw::shm_remove(key, shm_id) {
        Ok(()) => Ok(()),
        Err(e) => {
            log_warn!("destroy: segment for key {key} was already removed: {e}");
            Err(ShmError::AlreadyRemoved { key })
        }
    }
}

/// Decrement the companion semaphore (block until available). No-op
/// (returns `true`) if locking is disabled system-wide.
pub fn lock(key: i32) -> bool {
    semaphore_op(key, -1)
}

/// Increment the companion semaphore. No-op (returns `true`) if locking is
/// disabled system-wide.
pub fn unlock(key: i32) -> bool {
    semaphore_op(key, 1)
}

fn semaphore_op(key: i32, delta: i16) -> bool {
    if !USE_SEMAPHORES.load(Ordering::SeqCst) {
        return true;
    }
    let manager = MANAGER.lock().unwrap();
    let Some(descriptor) = manager.segments.get(key) else {
        return false;
    };
    let Some(sem_id) = descriptor.lock_id else {
        return false;
    };
    match raw::sem_op(key, sem_id, delta) {
        Ok(()) => true,
        Err(e) => {
            log_event(Level::Fatal, format!("semaphore op on key {key} failed: {e}")).ok();
            false
        }
    }
}

/// Log every registered descriptor — key, shm id, size, and each live
/// attachment address — tree-formatted as the legacy `shared_mem.c` dump
/// rendered it.
pub fn show_segments() {
    let manager = MANAGER.lock().unwrap();
    let mut entries = Vec::new();
    manager.segments.for_each(|key, descriptor| {
        let mut addrs = Vec::new();
        descriptor.for_each_attachment(|a| addrs.push(*a));
        entries.push((key, descriptor.shm_id, descriptor.size, addrs));
    });

    for (key, shm_id, size, addrs) in entries {
        log_event(
            Level::Info,
            format!("segment key={key} shm_id={shm_id} size={size} attachments={}", addrs.len()),
        )
        .ok();
        for (i, addr) in addrs.iter().enumerate() {
            let branch = if i + 1 == addrs.len() { "└──" } else { "├──" };
            log_event(Level::Info, format!("{branch} {addr:#x}")).ok();
        }
    }
}
