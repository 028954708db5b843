// Host/VM bridge
// Marshals values and callables across an embedded Lua C-style API

#[cfg(test)]
mod test;

pub mod bridge;
pub mod decoration;
pub mod error;
pub mod function_ext;
pub mod lua_api;
pub mod primitive_ext;
pub mod ref_table;
pub mod thread;
pub mod type_extension;
pub mod value;

pub use bridge::Bridge;
pub use decoration::{Decoration, DecorationOptions, decorate, decorate_function};
pub use error::{BridgeError, BridgeResult};
pub use function_ext::{
    FUNCTION_METATABLE, FunctionTypeExtension, FunctionTypeExtensionOptions, LuaFunctionRef,
    create_function_extension,
};
pub use lua_api::{
    HostRef, LUA_MULTRET, LUA_NOREF, LUA_REFNIL, LuaApi, LuaStateId, LuaStatus, LuaType, NativeFn,
    NativeFnPtr, NativeOutcome, RefId,
};
pub use primitive_ext::PrimitiveTypeExtension;
pub use ref_table::{HostRefTable, RegistryRef, ReleaseQueue};
pub use thread::Thread;
pub use type_extension::TypeExtension;
pub use value::{CallResult, HostFunction, Value};
