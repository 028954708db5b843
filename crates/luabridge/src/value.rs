//! Host-side value model.
//!
//! [`Value`] is the currency that crosses the boundary in both directions.
//! Host functions receive their arguments as `Value`s and report results
//! through [`CallResult`], a closed tagged variant dispatched by exhaustive
//! match instead of runtime type probing.

use std::fmt;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::error::BridgeResult;
use crate::function_ext::LuaFunctionRef;
use crate::lua_api::LuaApi;
use crate::thread::Thread;

/// A host function exposed to the VM.
///
/// The callback receives VM access so that it can call back into the VM
/// (mutual reentrancy is bounded only by native stack space), plus its
/// already-converted arguments. Equality is pointer identity.
#[derive(Clone)]
pub struct HostFunction {
    inner: Rc<dyn Fn(&mut dyn LuaApi, &[Value]) -> BridgeResult<CallResult>>,
}

impl HostFunction {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut dyn LuaApi, &[Value]) -> BridgeResult<CallResult> + 'static,
    {
        HostFunction {
            inner: Rc::new(func),
        }
    }

    #[inline]
    pub fn call(&self, vm: &mut dyn LuaApi, args: &[Value]) -> BridgeResult<CallResult> {
        (self.inner)(vm, args)
    }

    #[inline]
    pub fn ptr_eq(&self, other: &HostFunction) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFunction({:p})", Rc::as_ptr(&self.inner))
    }
}

/// A value crossing the host/VM boundary.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(SmolStr),
    /// A host closure to be exposed as a VM callable.
    Function(HostFunction),
    /// A VM callable captured by registry handle, callable from the host.
    LuaFunction(Rc<LuaFunctionRef>),
    /// An execution-context handle (passed to `receive_thread` callbacks).
    Thread(Thread),
}

impl Value {
    pub fn string(text: impl AsRef<str>) -> Value {
        Value::String(SmolStr::new(text))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_lua_function(&self) -> Option<&Rc<LuaFunctionRef>> {
        match self {
            Value::LuaFunction(func) => Some(func),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) | Value::LuaFunction(_) => "function",
            Value::Thread(_) => "thread",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            // Lua numbers compare across the integer/float split
            (Value::Integer(a), Value::Number(b)) | (Value::Number(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::LuaFunction(a), Value::LuaFunction(b)) => Rc::ptr_eq(a, b),
            (Value::Thread(a), Value::Thread(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Boolean(b) => f.write_str(if *b { "true" } else { "false" }),
            Value::Integer(i) => {
                let mut buffer = itoa::Buffer::new();
                f.write_str(buffer.format(*i))
            }
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s),
            Value::Function(func) => write!(f, "function: {:?}", func),
            Value::LuaFunction(func) => write!(f, "function: ref#{}", func.ref_id()),
            Value::Thread(thread) => write!(f, "thread: #{}", thread.state().0),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(SmolStr::new(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(SmolStr::new(value))
    }
}

/// Result shape reported by a bridged host function.
///
/// Replaces the original design's sentinel marker objects with a closed
/// variant so the trampoline dispatches by exhaustive match.
#[derive(Debug)]
pub enum CallResult {
    /// No return values.
    None,
    /// One value, converted and pushed by the bridge.
    Single(Value),
    /// Multiple values, pushed in declared order.
    Multiple(Vec<Value>),
    /// The function already pushed this many VM values itself; the bridge
    /// must not convert anything.
    Raw(i32),
}
