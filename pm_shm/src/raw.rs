//! Thin, typed wrappers around the raw System V IPC syscalls. `nix` does not
//! wrap SysV shared memory or semaphores, so this module calls `libc`
//! directly and translates every `-1` return into a [`ShmError`].

use std::io;
use std::os::raw::c_void;

use crate::error::ShmError;

const PERM_0644: libc::c_int = 0o644;

/// `union semun` as defined by `man semctl`; `libc` does not expose it
/// because its shape is a glibc convention, not part of the raw syscall
/// ABI.
#[repr(C)]
union SemUn {
    val: libc::c_int,
    buf: *mut libc::semid_ds,
    array: *mut libc::c_ushort,
}

pub(crate) fn shm_get(key: i32, size: usize) -> Result<i32, ShmError> {
    let id = unsafe { libc::shmget(key, size, libc::IPC_CREAT | PERM_0644) };
    if id < 0 {
        return Err(ShmError::ShmGetFailed {
            key,
            source: io::Error::last_os_error(),
        });
    }
    Ok(id)
}

pub(crate) fn shm_attach(key: i32, shm_id: i32) -> Result<usize, ShmError> {
    let addr = unsafe { libc::shmat(shm_id, std::ptr::null(), 0) };
    if addr as isize == -1 {
        return Err(ShmError::ShmAtFailed {
            key,
            source: io::Error::last_os_error(),
        });
    }
    Ok(addr as usize)
}

pub(crate) fn shm_detach(addr: usize) -> Result<(), ShmError> {
    let rc = unsafe { libc::shmdt(addr as *const c_void) };
    if rc < 0 {
        return Err(ShmError::ShmDtFailed {
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Number of attachments the OS currently reports for `shm_id`, across all
/// processes (`shmid_ds.shm_nattch` via `IPC_STAT`).
pub(crate) fn shm_nattch(key: i32, shm_id: i32) -> Result<u64, ShmError> {
    let mut stat: libc::shmid_ds = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::shmctl(shm_id, libc::IPC_STAT, &mut stat) };
    if rc < 0 {
        return Err(ShmError::ShmCtlFailed {
            key,
            source: io::Error::last_os_error(),
        });
    }
    Ok(stat.shm_nattch as u64)
}

pub(crate) fn shm_remove(key: i32, shm_id: i32) -> Result<(), ShmError> {
    let rc = unsafe { libc::shmctl(shm_id, libc::IPC_RMID, std::ptr::null_mut()) };
    if rc < 0 {
        return Err(ShmError::ShmCtlFailed {
            key,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Create the companion counting semaphore locked (value 0), then post once
/// so it becomes available (value 1), matching spec.md §4.3's "create in
/// the locked state, then post once to make it available".
pub(crate) fn sem_create_locked_then_post(key: i32) -> Result<i32, ShmError> {
    let sem_id = unsafe { libc::semget(key, 1, libc::IPC_CREAT | PERM_0644) };
    if sem_id < 0 {
        return Err(ShmError::SemGetFailed {
            key,
            source: io::Error::last_os_error(),
        });
    }

    let arg = SemUn { val: 0 };
    let rc = unsafe { libc::semctl(sem_id, 0, libc::SETVAL, arg) };
    if rc < 0 {
        return Err(ShmError::SemCtlFailed {
            key,
            source: io::Error::last_os_error(),
        });
    }

    sem_op(key, sem_id, 1)?;
    Ok(sem_id)
}

/// Apply `delta` (+1 to post/unlock, -1 to decrement/lock) to the
/// companion semaphore, with `SEM_UNDO` so an abnormally terminated process
/// releases its hold on the next kernel-driven undo pass.
pub(crate) fn sem_op(key: i32, sem_id: i32, delta: i16) -> Result<(), ShmError> {
    let mut buf = libc::sembuf {
        sem_num: 0,
        sem_op: delta,
        sem_flg: libc::SEM_UNDO as i16,
    };
    let rc = unsafe { libc::semop(sem_id, &mut buf, 1) };
    if rc < 0 {
        return Err(ShmError::SemOpFailed {
            key,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

pub(crate) fn sem_remove(key: i32, sem_id: i32) -> Result<(), ShmError> {
    let arg = SemUn { val: 0 };
    let rc = unsafe { libc::semctl(sem_id, 0, libc::IPC_RMID, arg) };
    if rc < 0 {
        return Err(ShmError::SemCtlFailed {
            key,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}
