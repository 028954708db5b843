//! Marshaling metadata attached to a value before it crosses the boundary.
//!
//! A [`Decoration`] pairs a target value with an options record. The
//! constructors perform no side effects and no validation beyond structure:
//! options that do not apply to the target's kind are simply inert.

use smol_str::SmolStr;

use crate::value::{HostFunction, Value};

/// Flat options record recognized at the boundary.
///
/// Function targets consult `receive_thread`, `receive_args_quantity` and
/// `self_value`; non-function targets consult `reference` and `metatable`.
#[derive(Debug, Clone, Default)]
pub struct DecorationOptions {
    /// Prepend the active execution context to the argument list.
    pub receive_thread: bool,
    /// Pass only the raw argument count instead of the unpacked arguments.
    pub receive_args_quantity: bool,
    /// Bound receiver. When the first raw argument equals this value it is
    /// excluded from the unpacked argument list. The equality test is a
    /// known ambiguity: a caller that legitimately passes a value equal to
    /// the receiver as argument 1 will have it skipped too.
    pub self_value: Option<Value>,
    /// Pass by VM-side reference rather than by deep conversion.
    pub reference: bool,
    /// Metatable fields to attach to the pushed value.
    pub metatable: Option<Vec<(SmolStr, Value)>>,
}

/// An immutable wrapper carrying a value and its marshaling options across
/// the boundary. Lives as long as the wrapper object that holds it.
#[derive(Debug, Clone)]
pub struct Decoration {
    pub target: Value,
    pub options: DecorationOptions,
}

impl Decoration {
    pub fn new(target: Value, options: DecorationOptions) -> Self {
        Decoration { target, options }
    }

    /// Wrap a value with default (empty) options.
    pub fn plain(target: Value) -> Self {
        Decoration {
            target,
            options: DecorationOptions::default(),
        }
    }
}

/// Decorate a host function before pushing it into the VM.
pub fn decorate_function(target: HostFunction, options: DecorationOptions) -> Decoration {
    Decoration::new(Value::Function(target), options)
}

/// Decorate a non-function value before pushing it into the VM.
pub fn decorate(target: Value, options: DecorationOptions) -> Decoration {
    Decoration::new(target, options)
}
