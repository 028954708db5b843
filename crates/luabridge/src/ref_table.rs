//! Reference-table handle ownership.
//!
//! Two indirection tables keep the runtimes' objects alive across the
//! boundary:
//!
//! - [`HostRefTable`] maps integer handles to host values so VM userdata
//!   can point back at them. A handle is valid from acquisition until its
//!   single release; releasing twice, or looking up a released handle, is
//!   a defect, not a recoverable condition.
//! - The VM's own registry holds VM values referenced from the host. Each
//!   registry key obtained by the bridge is owned by a [`RegistryRef`],
//!   whose drop enqueues the key on a shared [`ReleaseQueue`]. The bridge
//!   drains the queue whenever it next runs with VM access, so release
//!   happens at an unspecified later time and a queue that is never
//!   drained before VM teardown is a bounded leak, not a dangling use.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::decoration::Decoration;
use crate::lua_api::{HostRef, RefId};

/// Host-side reference table: handle -> decorated host value.
pub struct HostRefTable {
    slots: AHashMap<u32, Rc<Decoration>>,
    next: u32,
}

impl HostRefTable {
    pub fn new() -> Self {
        HostRefTable {
            slots: AHashMap::new(),
            next: 1,
        }
    }

    /// Store a decoration and return its fresh handle.
    pub fn acquire(&mut self, decoration: Rc<Decoration>) -> HostRef {
        let handle = HostRef(self.next);
        self.next = self.next.wrapping_add(1).max(1);
        self.slots.insert(handle.0, decoration);
        handle
    }

    pub fn get(&self, handle: HostRef) -> Option<Rc<Decoration>> {
        self.slots.get(&handle.0).cloned()
    }

    /// Release a handle. Exactly once per acquisition.
    pub fn release(&mut self, handle: HostRef) {
        let removed = self.slots.remove(&handle.0);
        assert!(
            removed.is_some(),
            "host ref {} released twice or never acquired",
            handle.0
        );
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for HostRefTable {
    fn default() -> Self {
        HostRefTable::new()
    }
}

/// Registry keys waiting to be released on the next boundary crossing.
pub type ReleaseQueue = RefCell<Vec<RefId>>;

/// Scoped owner of one VM registry key.
///
/// The key stays valid while this guard is alive. Dropping the guard does
/// not touch the VM (there is no VM access at drop time); it hands the key
/// to the [`ReleaseQueue`], whose owner unrefs it exactly once when it next
/// has the VM in hand. If the queue is already gone the key leaks with the
/// VM instance, which is about to disappear anyway.
pub struct RegistryRef {
    ref_id: RefId,
    queue: Weak<ReleaseQueue>,
    released: Cell<bool>,
}

impl RegistryRef {
    pub fn new(ref_id: RefId, queue: &Rc<ReleaseQueue>) -> Self {
        RegistryRef {
            ref_id,
            queue: Rc::downgrade(queue),
            released: Cell::new(false),
        }
    }

    #[inline]
    pub fn id(&self) -> RefId {
        self.ref_id
    }
}

impl Drop for RegistryRef {
    fn drop(&mut self) {
        if self.released.replace(true) {
            return;
        }
        if let Some(queue) = self.queue.upgrade() {
            queue.borrow_mut().push(self.ref_id);
        }
    }
}

impl std::fmt::Debug for RegistryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RegistryRef(ref_id={})", self.ref_id)
    }
}
