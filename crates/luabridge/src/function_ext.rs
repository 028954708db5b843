//! The function bridge: callable values in both directions.
//!
//! Host -> VM: a host function is stored in the host reference table, its
//! handle is written into a VM userdata cell, and the cell becomes the sole
//! upvalue of a closure over one shared trampoline. The cell's metatable
//! carries a `__gc` finalizer that releases the handle when the VM's
//! collector reclaims the cell.
//!
//! VM -> host: the VM value is pinned in the registry and wrapped in a
//! [`LuaFunctionRef`]. Every host-initiated call runs on a fresh child of a
//! long-lived callback context, so a call made after its creation-time
//! context died still has somewhere safe to execute.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use chrono::Utc;
use log::warn;
use smol_str::SmolStr;

use crate::bridge::Bridge;
use crate::decoration::Decoration;
use crate::error::{BridgeError, BridgeResult};
use crate::lua_api::{
    LuaApi, LuaStateId, LuaStatus, LuaType, NativeFnPtr, NativeOutcome, RefId, LUA_MULTRET,
};
use crate::ref_table::{RegistryRef, ReleaseQueue};
use crate::thread::Thread;
use crate::type_extension::TypeExtension;
use crate::value::{CallResult, Value};

/// Metatable namespace owned by the function extension.
pub const FUNCTION_METATABLE: &str = "rust_function";

#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionTypeExtensionOptions {
    /// Per-call deadline for host-initiated VM calls, in milliseconds.
    pub function_timeout: Option<u64>,
}

/// State shared between the extension, its trampolines, and every
/// [`LuaFunctionRef`] it hands out.
struct FnExtShared {
    bridge: Weak<Bridge>,
    /// One long-lived context per VM instance, spawned at initialization
    /// and pinned in the registry. Reentrant VM->host->VM calls originate
    /// here, never from the context active at ref-creation time: that
    /// context may have been torn down since.
    callback_context: Thread,
    callback_context_ref: RefId,
    options: FunctionTypeExtensionOptions,
    release_queue: Rc<ReleaseQueue>,
    main_state: LuaStateId,
}

pub struct FunctionTypeExtension {
    shared: Rc<FnExtShared>,
    gc_ptr: NativeFnPtr,
    trampoline_ptr: NativeFnPtr,
    closed: Cell<bool>,
}

/// Build the function extension for one VM instance.
///
/// Registers the two native entry points (finalizer and trampoline),
/// installs the extension metatable, and spawns the callback context.
pub fn create_function_extension(
    vm: &mut dyn LuaApi,
    bridge: &Rc<Bridge>,
    options: FunctionTypeExtensionOptions,
) -> Rc<FunctionTypeExtension> {
    let main_state = vm.main_state();

    // Callback context: spawned off the main state, then popped from the
    // main stack but kept alive through its own registry key.
    let main = Thread::from_state(main_state);
    let callback_context = main.spawn_child(vm);
    let callback_context_ref = vm.registry_ref(main_state);

    let shared = Rc::new(FnExtShared {
        bridge: Rc::downgrade(bridge),
        callback_context,
        callback_context_ref,
        options,
        release_queue: bridge.release_queue(),
        main_state,
    });

    // Finalizer: the VM collector reclaimed a userdata cell, so the host
    // reference it carries must be released.
    let gc_bridge = Rc::downgrade(bridge);
    let gc_ptr = vm.register_native(Rc::new(move |vm, called| {
        let Some(payload) = vm.userdata_payload(called, 1, FUNCTION_METATABLE) else {
            vm.push_string(called, "bad argument to __gc: rust_function expected");
            return NativeOutcome::Error;
        };
        if let Some(bridge) = gc_bridge.upgrade() {
            bridge.release_host_ref(payload);
        }
        NativeOutcome::Return(0)
    }));

    if vm.new_metatable(main_state, FUNCTION_METATABLE) {
        vm.push_closure(main_state, gc_ptr, 0);
        vm.set_field(main_state, -2, "__gc");
        vm.push_string(main_state, "protected metatable");
        vm.set_field(main_state, -2, "__metatable");
    }
    vm.pop(main_state, 1);

    // One shared trampoline serves every bridged host function; the
    // specific target is read from the closure's upvalue.
    let trampoline_shared = Rc::downgrade(&shared);
    let trampoline_ptr = vm.register_native(Rc::new(move |vm, called| {
        trampoline(vm, called, &trampoline_shared)
    }));

    Rc::new(FunctionTypeExtension {
        shared,
        gc_ptr,
        trampoline_ptr,
        closed: Cell::new(false),
    })
}

impl TypeExtension for FunctionTypeExtension {
    fn name(&self) -> &'static str {
        FUNCTION_METATABLE
    }

    fn is_type(&self, _vm: &dyn LuaApi, _state: LuaStateId, _index: i32, lua_type: LuaType) -> bool {
        lua_type == LuaType::Function
    }

    fn push_value(
        &self,
        vm: &mut dyn LuaApi,
        thread: &Thread,
        decoration: &Decoration,
    ) -> BridgeResult<bool> {
        match &decoration.target {
            Value::Function(_) => {
                let bridge = self
                    .shared
                    .bridge
                    .upgrade()
                    .ok_or_else(|| BridgeError::runtime("function bridge is gone"))?;
                let state = thread.state();

                let payload = bridge.acquire_host_ref(Rc::new(decoration.clone()));
                vm.new_userdata(state, payload);

                if vm.get_named_metatable(state, FUNCTION_METATABLE) == LuaType::Nil {
                    // Extension was never installed on this VM instance.
                    // Drop the pushed nil and the userdata, release the
                    // handle so nothing leaks, and report the defect.
                    vm.pop(state, 2);
                    bridge.release_host_ref(payload);
                    return Err(BridgeError::MetatableMissing(SmolStr::new_static(
                        FUNCTION_METATABLE,
                    )));
                }
                vm.set_metatable(state, -2);

                // Pops the userdata, pushes the closure bound to it.
                vm.push_closure(state, self.trampoline_ptr, 1);
                Ok(true)
            }
            // A function that originally came from the VM goes back by
            // handle, so the VM sees its own value again.
            Value::LuaFunction(func) => {
                func.push(vm, thread)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn get_value(&self, vm: &mut dyn LuaApi, thread: &Thread, index: i32) -> BridgeResult<Value> {
        let state = thread.state();
        // Duplicate the slot; the registry key keeps the VM value alive
        // independent of its original stack position.
        vm.push_copy(state, index);
        let ref_id = vm.registry_ref(state);
        Ok(Value::LuaFunction(Rc::new(LuaFunctionRef::new(
            ref_id,
            &self.shared,
        ))))
    }

    fn close(&self, vm: &mut dyn LuaApi) {
        if self.closed.replace(true) {
            return;
        }
        vm.deregister_native(self.trampoline_ptr);
        vm.deregister_native(self.gc_ptr);
        self.shared.callback_context.close(vm);
        vm.registry_unref(self.shared.main_state, self.shared.callback_context_ref);
    }
}

/// Shared native entry point for every bridged host function.
fn trampoline(
    vm: &mut dyn LuaApi,
    called: LuaStateId,
    shared: &Weak<FnExtShared>,
) -> NativeOutcome {
    let Some(shared) = shared.upgrade() else {
        vm.push_string(called, "function bridge is gone");
        return NativeOutcome::Error;
    };
    let Some(bridge) = shared.bridge.upgrade() else {
        vm.push_string(called, "function bridge is gone");
        return NativeOutcome::Error;
    };

    let upvalue = vm.upvalue_index(1);
    let Some(payload) = vm.userdata_payload(called, upvalue, FUNCTION_METATABLE) else {
        vm.push_string(called, "bridged function upvalue is not a rust_function cell");
        return NativeOutcome::Error;
    };
    let Some(decoration) = bridge.host_decoration(payload) else {
        vm.push_string(called, "bridged function refers to a released host value");
        return NativeOutcome::Error;
    };
    let Value::Function(target) = &decoration.target else {
        vm.push_string(called, "bridged value is not a function");
        return NativeOutcome::Error;
    };

    let thread = Thread::from_state(called);
    let arg_count = vm.get_top(called);
    let mut args: Vec<Value> = Vec::new();

    if decoration.options.receive_thread {
        args.push(Value::Thread(thread.clone()));
    }

    if decoration.options.receive_args_quantity {
        args.push(Value::Integer(arg_count as i64));
    } else {
        for i in 1..=arg_count {
            let value = match bridge.get_value(vm, &thread, i) {
                Ok(value) => value,
                Err(err) => return raise(vm, &bridge, &thread, err),
            };
            // A first argument equal to the bound receiver is the receiver
            // slot, not a real argument.
            if i != 1 || decoration.options.self_value.as_ref() != Some(&value) {
                args.push(value);
            }
        }
    }

    match target.call(vm, &args) {
        Ok(CallResult::None) => NativeOutcome::Return(0),
        Ok(CallResult::Raw(count)) => NativeOutcome::Return(count),
        Ok(CallResult::Multiple(values)) => {
            let count = values.len() as i32;
            for value in &values {
                if let Err(err) = bridge.push_value(vm, &thread, value) {
                    return raise(vm, &bridge, &thread, err);
                }
            }
            NativeOutcome::Return(count)
        }
        Ok(CallResult::Single(value)) => match bridge.push_value(vm, &thread, &value) {
            Ok(()) => NativeOutcome::Return(1),
            Err(err) => raise(vm, &bridge, &thread, err),
        },
        Err(err) => raise(vm, &bridge, &thread, err),
    }
}

/// Convert a host failure into the VM's error mechanism. Interrupts are
/// re-raised untouched: they denote a forced abort, not a catchable error.
fn raise(vm: &mut dyn LuaApi, bridge: &Rc<Bridge>, thread: &Thread, err: BridgeError) -> NativeOutcome {
    if err.is_interrupt() {
        return NativeOutcome::Interrupt;
    }
    let value = err.into_error_value();
    if bridge.push_value(vm, thread, &value).is_err() {
        vm.push_string(thread.state(), "error value could not be converted");
    }
    NativeOutcome::Error
}

/// A VM callable captured by registry handle.
///
/// Cleanup is drop-based: releasing the handle is deferred to the bridge's
/// release queue, so a ref that is never dropped (or dropped after the VM
/// went away) is a bounded leak rather than a dangling use.
pub struct LuaFunctionRef {
    shared: Weak<FnExtShared>,
    func_ref: RegistryRef,
}

impl LuaFunctionRef {
    fn new(ref_id: RefId, shared: &Rc<FnExtShared>) -> Self {
        LuaFunctionRef {
            shared: Rc::downgrade(shared),
            func_ref: RegistryRef::new(ref_id, &shared.release_queue),
        }
    }

    #[inline]
    pub fn ref_id(&self) -> RefId {
        self.func_ref.id()
    }

    /// Push the referenced VM value onto `thread`'s stack.
    pub(crate) fn push(&self, vm: &mut dyn LuaApi, thread: &Thread) -> BridgeResult<()> {
        if self.shared.upgrade().is_none() {
            return Err(BridgeError::runtime(
                "tried to push a function after closing the lua state",
            ));
        }
        let state = thread.state();
        let lua_type = vm.registry_get(state, self.func_ref.id());
        if lua_type == LuaType::Nil || lua_type == LuaType::None {
            vm.pop(state, 1);
            return Err(BridgeError::runtime("stale lua function reference"));
        }
        Ok(())
    }

    /// Call the referenced VM value with `args`, returning all results in
    /// declared order.
    pub fn call(&self, vm: &mut dyn LuaApi, args: &[Value]) -> BridgeResult<Vec<Value>> {
        let Some(shared) = self.shared.upgrade() else {
            warn!("tried to call a function after closing the lua state");
            return Ok(Vec::new());
        };
        let Some(bridge) = shared.bridge.upgrade() else {
            warn!("tried to call a function after closing the lua state");
            return Ok(Vec::new());
        };
        if shared.callback_context.is_closed() || bridge.is_closed() {
            warn!("tried to call a function after closing the lua state");
            return Ok(Vec::new());
        }

        bridge.drain_released(vm);

        // Every call gets its own context: the one this ref was created on
        // may be gone, and a failing call must not corrupt anyone else's
        // stack.
        let call_thread = shared.callback_context.spawn_child(vm);
        let result = self.call_on(vm, &bridge, &shared, &call_thread, args);
        call_thread.close(vm);
        call_thread.pop_from_parent(vm);
        result
    }

    /// Call and keep only the first result (nil when there are none).
    pub fn call1(&self, vm: &mut dyn LuaApi, args: &[Value]) -> BridgeResult<Value> {
        Ok(self
            .call(vm, args)?
            .into_iter()
            .next()
            .unwrap_or(Value::Nil))
    }

    fn call_on(
        &self,
        vm: &mut dyn LuaApi,
        bridge: &Rc<Bridge>,
        shared: &Rc<FnExtShared>,
        call_thread: &Thread,
        args: &[Value],
    ) -> BridgeResult<Vec<Value>> {
        let state = call_thread.state();

        let lua_type = vm.registry_get(state, self.func_ref.id());
        if lua_type != LuaType::Function {
            let metafield = vm.get_metafield(state, -1, "__call");
            if metafield != LuaType::None {
                // The protected call resolves __call itself; only the
                // probed field needs to go.
                vm.pop(state, 1);
            }
            if metafield != LuaType::Function {
                vm.pop(state, 1);
                return Err(BridgeError::NotCallable(lua_type));
            }
        }

        for arg in args {
            bridge.push_value(vm, call_thread, arg)?;
        }

        if let Some(timeout_ms) = shared.options.function_timeout {
            let deadline = Utc::now().timestamp_millis() + timeout_ms as i64;
            call_thread.set_deadline(vm, deadline);
        }

        let status = vm.pcall(state, args.len() as i32, LUA_MULTRET);
        match status {
            LuaStatus::Ok => {
                let count = vm.get_top(state);
                let mut results = Vec::with_capacity(count as usize);
                for i in 1..=count {
                    results.push(bridge.get_value(vm, call_thread, i)?);
                }
                Ok(results)
            }
            LuaStatus::Yield => Err(BridgeError::UnsupportedYield),
            LuaStatus::Interrupted => Err(BridgeError::Interrupt),
            LuaStatus::RuntimeError | LuaStatus::MemoryError => {
                let error_value = bridge
                    .get_value(vm, call_thread, -1)
                    .unwrap_or_else(|_| Value::string("unknown lua error"));
                vm.pop(state, 1);
                Err(BridgeError::Lua(error_value))
            }
        }
    }
}

impl std::fmt::Debug for LuaFunctionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LuaFunctionRef(ref_id={})", self.func_ref.id())
    }
}
