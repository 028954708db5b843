//! Marshaling for nil, boolean, number and string.
//!
//! The simple pattern: no handles, no lifetime coordination, just direct
//! stack reads and writes. The function bridge leans on this extension to
//! convert arguments, results and error values.

use smol_str::SmolStr;

use crate::decoration::Decoration;
use crate::error::{BridgeError, BridgeResult};
use crate::lua_api::{LuaApi, LuaStateId, LuaType};
use crate::thread::Thread;
use crate::type_extension::TypeExtension;
use crate::value::Value;

pub struct PrimitiveTypeExtension;

impl TypeExtension for PrimitiveTypeExtension {
    fn name(&self) -> &'static str {
        "primitive"
    }

    fn is_type(&self, _vm: &dyn LuaApi, _state: LuaStateId, _index: i32, lua_type: LuaType) -> bool {
        matches!(
            lua_type,
            LuaType::Nil | LuaType::Boolean | LuaType::Number | LuaType::String
        )
    }

    fn push_value(
        &self,
        vm: &mut dyn LuaApi,
        thread: &Thread,
        decoration: &Decoration,
    ) -> BridgeResult<bool> {
        let state = thread.state();
        match &decoration.target {
            Value::Nil => vm.push_nil(state),
            Value::Boolean(b) => vm.push_boolean(state, *b),
            Value::Integer(i) => vm.push_integer(state, *i),
            Value::Number(n) => vm.push_number(state, *n),
            Value::String(s) => vm.push_string(state, s),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn get_value(&self, vm: &mut dyn LuaApi, thread: &Thread, index: i32) -> BridgeResult<Value> {
        let state = thread.state();
        match vm.type_of(state, index) {
            LuaType::Nil => Ok(Value::Nil),
            LuaType::Boolean => Ok(Value::Boolean(vm.to_boolean(state, index))),
            LuaType::Number => {
                // Preserve the integer subtype when the VM has one
                if let Some(i) = vm.to_integer(state, index) {
                    Ok(Value::Integer(i))
                } else if let Some(n) = vm.to_number(state, index) {
                    Ok(Value::Number(n))
                } else {
                    Err(BridgeError::runtime("number slot failed to convert"))
                }
            }
            LuaType::String => match vm.to_str(state, index) {
                Some(s) => Ok(Value::String(SmolStr::new(s))),
                None => Err(BridgeError::runtime("string slot failed to convert")),
            },
            other => Err(BridgeError::UnsupportedType(other)),
        }
    }
}
