pub mod logger;

pub mod test_lifecycle;

use std::rc::Rc;

use crate::bridge::Bridge;
use crate::function_ext::{
    FunctionTypeExtension, FunctionTypeExtensionOptions, create_function_extension,
};
use crate::primitive_ext::PrimitiveTypeExtension;
use fake_vm::FakeVm;

/// Fresh VM + bridge with the primitive and function extensions installed.
pub(crate) fn setup(
    options: FunctionTypeExtensionOptions,
) -> (FakeVm, Rc<Bridge>, Rc<FunctionTypeExtension>) {
    let mut vm = FakeVm::new();
    let bridge = Bridge::new(&vm);
    bridge.register_extension(Rc::new(PrimitiveTypeExtension));
    let func_ext = create_function_extension(&mut vm, &bridge, options);
    bridge.register_extension(func_ext.clone());
    (vm, bridge, func_ext)
}
