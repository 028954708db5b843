//! Shutdown, dead-context calls, timeouts and yield rejection.

use crate::error::BridgeError;
use crate::function_ext::FunctionTypeExtensionOptions;
use crate::lua_api::{LuaApi, LuaStatus};
use crate::test::fake_vm::ScriptOutcome;
use crate::test::{logger, setup};
use crate::thread::Thread;
use crate::value::{CallResult, HostFunction, Value};

#[test]
fn calls_after_close_warn_once_per_call_and_return_nothing() {
    logger::install();
    let (mut vm, bridge, _ext) = setup(Default::default());
    let ms = vm.main_state();
    let main = Thread::from_state(ms);

    vm.push_script(ms, |vm, state| {
        vm.push_integer(state, 1);
        ScriptOutcome::Return(1)
    });
    let func = bridge
        .get_value(&mut vm, &main, -1)
        .unwrap()
        .as_lua_function()
        .unwrap()
        .clone();

    bridge.close(&mut vm);

    let before = logger::warnings_containing("after closing");
    let results = func.call(&mut vm, &[]).unwrap();
    assert!(results.is_empty(), "dead-context call must be a no-op");
    assert_eq!(logger::warnings_containing("after closing"), before + 1);

    let first = func.call1(&mut vm, &[]).unwrap();
    assert_eq!(first, Value::Nil);
    assert_eq!(logger::warnings_containing("after closing"), before + 2);
}

#[test]
fn close_releases_every_registry_handle() {
    let (mut vm, bridge, _ext) = setup(Default::default());
    let ms = vm.main_state();
    let main = Thread::from_state(ms);

    // One handle pins the callback context.
    assert_eq!(vm.live_registry_refs(), 1);

    vm.push_script(ms, |_vm, _state| ScriptOutcome::Return(0));
    let func = bridge.get_value(&mut vm, &main, -1).unwrap();
    assert_eq!(vm.live_registry_refs(), 2);

    // Drop-based cleanup hands the key to the release queue; close drains
    // it and then releases the callback context's own handle.
    drop(func);
    bridge.close(&mut vm);
    assert_eq!(vm.live_registry_refs(), 0);
}

#[test]
fn timeout_interrupts_a_spinning_call() {
    let (mut vm, bridge, _ext) = setup(FunctionTypeExtensionOptions {
        function_timeout: Some(10),
    });
    let ms = vm.main_state();
    let main = Thread::from_state(ms);

    // Loops until the armed deadline expires; without the instruction-hook
    // deadline this call would never return.
    vm.push_script(ms, |vm, state| {
        loop {
            if vm.deadline_expired(state) {
                return ScriptOutcome::Interrupt;
            }
        }
    });
    let func = bridge
        .get_value(&mut vm, &main, -1)
        .unwrap()
        .as_lua_function()
        .unwrap()
        .clone();

    let err = func.call(&mut vm, &[]).unwrap_err();
    assert!(matches!(err, BridgeError::Interrupt), "got {:?}", err);
}

#[test]
fn interrupt_is_reraised_not_converted_through_the_trampoline() {
    let (mut vm, bridge, _ext) = setup(FunctionTypeExtensionOptions {
        function_timeout: Some(10),
    });
    let ms = vm.main_state();
    let main = Thread::from_state(ms);

    vm.push_script(ms, |vm, state| {
        loop {
            if vm.deadline_expired(state) {
                return ScriptOutcome::Interrupt;
            }
        }
    });
    let spin = bridge
        .get_value(&mut vm, &main, -1)
        .unwrap()
        .as_lua_function()
        .unwrap()
        .clone();
    vm.pop(ms, 1);

    // Host callback hits the timeout while the VM is calling it. The
    // interrupt must pass through the trampoline as an interrupt, not be
    // caught and converted into an ordinary error.
    let f = HostFunction::new(move |vm, _args| {
        spin.call(vm, &[])?;
        Ok(CallResult::None)
    });
    bridge
        .push_value(&mut vm, &main, &Value::Function(f))
        .unwrap();

    vm.push_copy(ms, -1);
    let status = vm.pcall(ms, 0, 0);
    assert_eq!(
        status,
        LuaStatus::Interrupted,
        "the trampoline must re-raise the interrupt"
    );
}

#[test]
fn deadline_does_not_linger_after_a_completed_call() {
    let (mut vm, bridge, _ext) = setup(FunctionTypeExtensionOptions {
        function_timeout: Some(1000),
    });
    let ms = vm.main_state();
    let main = Thread::from_state(ms);

    vm.push_script(ms, |vm, state| {
        vm.push_integer(state, 1);
        ScriptOutcome::Return(1)
    });
    let func = bridge
        .get_value(&mut vm, &main, -1)
        .unwrap()
        .as_lua_function()
        .unwrap()
        .clone();

    // Two timed calls in a row: each arms and clears its own deadline.
    assert_eq!(func.call(&mut vm, &[]).unwrap(), vec![Value::Integer(1)]);
    assert_eq!(func.call(&mut vm, &[]).unwrap(), vec![Value::Integer(1)]);
    assert!(!vm.has_deadline(ms));
}

#[test]
fn yield_from_a_host_initiated_call_is_rejected() {
    let (mut vm, bridge, _ext) = setup(Default::default());
    let ms = vm.main_state();
    let main = Thread::from_state(ms);

    vm.push_script(ms, |_vm, _state| ScriptOutcome::Yield);
    let func = bridge
        .get_value(&mut vm, &main, -1)
        .unwrap()
        .as_lua_function()
        .unwrap()
        .clone();

    let err = func.call(&mut vm, &[]).unwrap_err();
    assert!(matches!(err, BridgeError::UnsupportedYield));
    assert!(err.to_string().contains("cannot yield"));
}
