//! Bytecode interpreter
//!
//! Executes methods of a [`ts_bytecode::Class`] on a simple stack machine.
//! Switch instructions are decoded at run time from the code bytes, padding
//! and all, so the interpreter exercises the same layout the assembler
//! produces.

pub mod frame;
pub mod interpreter;
pub mod native;
pub mod value;

pub use frame::Frame;
pub use interpreter::{Interpreter, InterpreterError, MAX_CALL_DEPTH};
pub use native::NativeClass;
pub use value::{NativeObject, Value};
