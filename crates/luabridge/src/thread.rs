//! Execution contexts.
//!
//! A [`Thread`] is a lightweight handle onto one VM execution stack. Each
//! bridged call runs on its own context so a failing or reentrant call
//! cannot corrupt an unrelated call's stack: nested calls spawn a child
//! context instead of reusing the active one.

use std::cell::Cell;
use std::rc::Rc;

use crate::lua_api::{LuaApi, LuaStateId};

#[derive(Debug, Clone)]
pub struct Thread {
    state: LuaStateId,
    parent: Option<LuaStateId>,
    closed: Rc<Cell<bool>>,
}

impl Thread {
    /// Handle onto an already-existing execution stack (e.g. the state the
    /// VM passed into a native callback).
    pub fn from_state(state: LuaStateId) -> Self {
        Thread {
            state,
            parent: None,
            closed: Rc::new(Cell::new(false)),
        }
    }

    /// Spawn a child context. The VM pushes the new thread object onto this
    /// context's stack, which keeps it alive until [`pop_from_parent`]
    /// (or a registry reference) takes over.
    ///
    /// [`pop_from_parent`]: Self::pop_from_parent
    pub fn spawn_child(&self, vm: &mut dyn LuaApi) -> Thread {
        let child = vm.new_thread(self.state);
        Thread {
            state: child,
            parent: Some(self.state),
            closed: Rc::new(Cell::new(false)),
        }
    }

    #[inline]
    pub fn state(&self) -> LuaStateId {
        self.state
    }

    #[inline]
    pub fn parent(&self) -> Option<LuaStateId> {
        self.parent
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Close this context: clear any armed deadline and discard the stack.
    /// Idempotent; every exit path of a bridged call goes through here.
    pub fn close(&self, vm: &mut dyn LuaApi) {
        if self.closed.replace(true) {
            return;
        }
        vm.clear_deadline(self.state);
        vm.close_thread(self.state);
    }

    /// Restore the parent context's stack depth by popping the thread
    /// object pushed at spawn time.
    pub fn pop_from_parent(&self, vm: &mut dyn LuaApi) {
        if let Some(parent) = self.parent {
            vm.pop(parent, 1);
        }
    }

    pub fn get_top(&self, vm: &dyn LuaApi) -> i32 {
        vm.get_top(self.state)
    }

    pub fn pop(&self, vm: &mut dyn LuaApi, n: i32) {
        vm.pop(self.state, n);
    }

    /// Arm the per-call deadline (epoch milliseconds) on this context.
    pub fn set_deadline(&self, vm: &mut dyn LuaApi, deadline_epoch_ms: i64) {
        vm.set_deadline(self.state, deadline_epoch_ms);
    }
}

impl PartialEq for Thread {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
    }
}
