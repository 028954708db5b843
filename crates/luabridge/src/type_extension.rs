//! The polymorphic contract every marshaled type implements.
//!
//! Extensions are registered once per VM instance on the [`Bridge`] and
//! looked up by value kind during every marshal/unmarshal; the first
//! extension to claim a value wins.
//!
//! [`Bridge`]: crate::bridge::Bridge

use crate::decoration::Decoration;
use crate::error::BridgeResult;
use crate::lua_api::{LuaApi, LuaStateId, LuaType};
use crate::thread::Thread;
use crate::value::Value;

pub trait TypeExtension {
    /// Name of this extension (also the metatable namespace it owns).
    fn name(&self) -> &'static str;

    /// Cheap, non-converting classification of the VM value at `index`.
    fn is_type(&self, vm: &dyn LuaApi, state: LuaStateId, index: i32, lua_type: LuaType) -> bool;

    /// Push the decorated host value onto `thread`'s stack.
    ///
    /// Returns `Ok(false)`, with no stack mutation, when the value's shape
    /// is not this extension's responsibility, so the dispatch chain moves
    /// on to the next extension.
    fn push_value(
        &self,
        vm: &mut dyn LuaApi,
        thread: &Thread,
        decoration: &Decoration,
    ) -> BridgeResult<bool>;

    /// Read the VM value at `index` back into a host value.
    fn get_value(&self, vm: &mut dyn LuaApi, thread: &Thread, index: i32) -> BridgeResult<Value>;

    /// Lifecycle hook invoked when the VM instance shuts down.
    fn close(&self, vm: &mut dyn LuaApi) {
        let _ = vm;
    }
}
