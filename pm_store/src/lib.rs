//! Fixed-capacity containers shared by [`pm_shm`] and [`pm_thread`].
//!
//! The legacy C implementation this workspace replaces used a `void*`-erased
//! hash table and linked list (see `original_source/include/hash_table.h`
//! and `list.h`) because C has no generics. Rust does, so both containers
//! here are parametric; the external contract (open addressing with linear
//! probing, fixed size, overwrite-on-duplicate-insert, no-tombstone delete)
//! is unchanged.

mod hash;
mod list;

pub use hash::Hash;
pub use list::List;
