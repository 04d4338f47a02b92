pub mod call_stack;
pub mod data_stack;
pub mod register;
pub mod runtime_error;
pub mod vm;

pub use call_stack::{CallStack, Frame};
pub use data_stack::DataStack;
pub use register::Register;
pub use runtime_error::{ErrorKind, RuntimeError};
pub use vm::{Vm, VmConfig};
