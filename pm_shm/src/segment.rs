use pm_store::List;

/// Per-key record the segment manager keeps: the OS handle, the optional
/// companion lock, and every address this process currently holds.
///
/// Addresses are stored as `usize` rather than `*mut c_void` so the
/// descriptor table (and the `Mutex` guarding it) stays `Send`; the public
/// API casts back to `*mut c_void` at the boundary.
pub(crate) struct Descriptor {
    pub(crate) shm_id: i32,
    pub(crate) lock_id: Option<i32>,
    pub(crate) size: usize,
    attachments: List<usize>,
}

impl Descriptor {
    pub(crate) fn new(shm_id: i32, lock_id: Option<i32>, size: usize) -> Self {
        Self {
            shm_id,
            lock_id,
            size,
            attachments: List::new(),
        }
    }

    pub(crate) fn push_attachment(&mut self, addr: usize) {
        self.attachments.push_tail(addr);
    }

    pub(crate) fn has_attachment(&self, addr: usize) -> bool {
        let mut found = false;
        self.attachments.for_each(|a| {
            if *a == addr {
                found = true;
            }
        });
        found
    }

    pub(crate) fn remove_attachment(&mut self, addr: usize) -> bool {
        self.attachments.remove_item(&addr)
    }

    pub(crate) fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    pub(crate) fn for_each_attachment(&self, f: impl FnMut(&usize)) {
        self.attachments.for_each(f);
    }
}
