//! Per-VM-instance bridge state and conversion dispatch.
//!
//! One [`Bridge`] exists per VM instance. It owns the ordered extension
//! list, the host-side reference table, and the deferred-release queue for
//! VM registry keys. All conversion traffic funnels through
//! [`push_value`]/[`get_value`] so the queue gets drained whenever the
//! bridge runs with VM access.
//!
//! [`push_value`]: Bridge::push_value
//! [`get_value`]: Bridge::get_value

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::decoration::Decoration;
use crate::error::{BridgeError, BridgeResult};
use crate::lua_api::{HostRef, LuaApi, LuaStateId};
use crate::ref_table::{HostRefTable, ReleaseQueue};
use crate::thread::Thread;
use crate::type_extension::TypeExtension;
use crate::value::Value;

pub struct Bridge {
    main_state: LuaStateId,
    extensions: RefCell<Vec<Rc<dyn TypeExtension>>>,
    host_refs: RefCell<HostRefTable>,
    release_queue: Rc<ReleaseQueue>,
    closed: Cell<bool>,
}

impl Bridge {
    pub fn new(vm: &dyn LuaApi) -> Rc<Bridge> {
        Rc::new(Bridge {
            main_state: vm.main_state(),
            extensions: RefCell::new(Vec::new()),
            host_refs: RefCell::new(HostRefTable::new()),
            release_queue: Rc::new(ReleaseQueue::new(Vec::new())),
            closed: Cell::new(false),
        })
    }

    #[inline]
    pub fn main_state(&self) -> LuaStateId {
        self.main_state
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// The queue that drop-based cleanup hands registry keys to.
    pub fn release_queue(&self) -> Rc<ReleaseQueue> {
        Rc::clone(&self.release_queue)
    }

    /// Register an extension. Registration order is dispatch order; the
    /// first extension to claim a value wins.
    pub fn register_extension(&self, extension: Rc<dyn TypeExtension>) {
        self.extensions.borrow_mut().push(extension);
    }

    // ===== Host reference table =====

    pub fn acquire_host_ref(&self, decoration: Rc<Decoration>) -> HostRef {
        self.host_refs.borrow_mut().acquire(decoration)
    }

    pub fn host_decoration(&self, handle: HostRef) -> Option<Rc<Decoration>> {
        self.host_refs.borrow().get(handle)
    }

    pub fn release_host_ref(&self, handle: HostRef) {
        self.host_refs.borrow_mut().release(handle);
    }

    pub fn host_ref_count(&self) -> usize {
        self.host_refs.borrow().len()
    }

    // ===== Conversion dispatch =====

    /// Push a plain host value (empty decoration) onto `thread`'s stack.
    pub fn push_value(
        &self,
        vm: &mut dyn LuaApi,
        thread: &Thread,
        value: &Value,
    ) -> BridgeResult<()> {
        self.push_decorated(vm, thread, &Decoration::plain(value.clone()))
    }

    /// Push a decorated host value onto `thread`'s stack.
    pub fn push_decorated(
        &self,
        vm: &mut dyn LuaApi,
        thread: &Thread,
        decoration: &Decoration,
    ) -> BridgeResult<()> {
        self.drain_released(vm);
        let extensions = self.extensions.borrow().clone();
        for extension in extensions {
            if extension.push_value(vm, thread, decoration)? {
                return Ok(());
            }
        }
        Err(BridgeError::runtime(format!(
            "no type extension accepts a {} value",
            decoration.target.type_name()
        )))
    }

    /// Read the VM value at `index` on `thread` back into a host value.
    pub fn get_value(
        &self,
        vm: &mut dyn LuaApi,
        thread: &Thread,
        index: i32,
    ) -> BridgeResult<Value> {
        self.drain_released(vm);
        let lua_type = vm.type_of(thread.state(), index);
        let extensions = self.extensions.borrow().clone();
        for extension in extensions {
            if extension.is_type(vm, thread.state(), index, lua_type) {
                return extension.get_value(vm, thread, index);
            }
        }
        Err(BridgeError::UnsupportedType(lua_type))
    }

    // ===== Deferred release =====

    /// Unref every registry key queued by dropped [`RegistryRef`]s.
    ///
    /// Registry keys are process-wide, so releasing through the main state
    /// is valid regardless of which context created them.
    ///
    /// [`RegistryRef`]: crate::ref_table::RegistryRef
    pub fn drain_released(&self, vm: &mut dyn LuaApi) {
        if self.closed.get() {
            // The registry died with the VM instance; nothing to unref.
            self.release_queue.borrow_mut().clear();
            return;
        }
        loop {
            let next = self.release_queue.borrow_mut().pop();
            match next {
                Some(ref_id) => vm.registry_unref(self.main_state, ref_id),
                None => break,
            }
        }
    }

    /// Shut the bridge down: flush pending releases, close every extension
    /// in registration order, then refuse further VM access.
    pub fn close(&self, vm: &mut dyn LuaApi) {
        if self.closed.get() {
            return;
        }
        self.drain_released(vm);
        let extensions = self.extensions.borrow().clone();
        for extension in extensions {
            extension.close(vm);
        }
        self.closed.set(true);
    }
}
