use smol_str::SmolStr;

use crate::lua_api::LuaType;
use crate::value::Value;

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced at the host/VM boundary.
///
/// Conversions are eager: by the time a `BridgeError` is returned, any VM
/// error value has already been read back into a host [`Value`].
#[derive(Debug, Clone)]
pub enum BridgeError {
    /// The VM raised an error while a host-initiated call was in flight.
    /// Carries the converted error value.
    Lua(Value),
    /// A host-initiated call targeted a VM value that is not callable and
    /// has no `__call` metafield.
    NotCallable(LuaType),
    /// A host-initiated call attempted to suspend the VM.
    UnsupportedYield,
    /// The extension metatable was not found at push time. This means the
    /// extension was never installed on this VM instance, a programming
    /// defect rather than a runtime condition.
    MetatableMissing(SmolStr),
    /// No registered type extension claims the value kind.
    UnsupportedType(LuaType),
    /// A host function failed while being invoked from the VM.
    Runtime(String),
    /// Forced interrupt (deadline expiry). Must be re-raised, never
    /// converted into an ordinary error value.
    Interrupt,
}

impl BridgeError {
    pub fn runtime(message: impl Into<String>) -> Self {
        BridgeError::Runtime(message.into())
    }

    #[inline]
    pub fn is_interrupt(&self) -> bool {
        matches!(self, BridgeError::Interrupt)
    }

    /// The value pushed into the VM when this error crosses the boundary.
    ///
    /// Callers must check [`is_interrupt`](Self::is_interrupt) first; an
    /// interrupt has no value representation.
    pub fn into_error_value(self) -> Value {
        match self {
            BridgeError::Lua(value) => value,
            BridgeError::Runtime(message) => Value::String(SmolStr::new(message)),
            other => Value::String(SmolStr::new(other.to_string())),
        }
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::Lua(value) => write!(f, "lua error: {}", value),
            BridgeError::NotCallable(lua_type) => {
                write!(
                    f,
                    "a value of type '{}' was referenced but it is not callable",
                    lua_type.name()
                )
            }
            BridgeError::UnsupportedYield => {
                write!(f, "cannot yield in callbacks from the host")
            }
            BridgeError::MetatableMissing(name) => write!(f, "metatable not found: {}", name),
            BridgeError::UnsupportedType(lua_type) => {
                write!(
                    f,
                    "no type extension claims values of type '{}'",
                    lua_type.name()
                )
            }
            BridgeError::Runtime(message) => write!(f, "{}", message),
            BridgeError::Interrupt => write!(f, "function call interrupted"),
        }
    }
}

impl std::error::Error for BridgeError {}
