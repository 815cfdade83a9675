//! Bytecode for the table switch machine
//!
//! A subset of JVM bytecode: enough to express integer switches, static
//! calls and `System.out.println`. Symbolic instructions are assembled into
//! real code bytes, with `tableswitch` and `lookupswitch` laid out exactly
//! as a class file would carry them, and decoded back for execution and
//! disassembly. Classes can be written to and read from class files.

pub mod assemble;
pub mod class;
pub mod classfile;
pub mod constant_pool;
pub mod decode;
pub mod descriptor;
pub mod disasm;
pub mod insn;
pub mod lower;
pub mod opcode;

pub use assemble::{AsmError, Assembler, MAX_CODE_LEN, assemble};
pub use class::{AccessFlags, Class, Method, OBJECT_CLASS};
pub use classfile::{ClassFileError, read_class, write_class};
pub use constant_pool::{Constant, ConstantPool, MAX_POOL_SLOTS, MemberRef, PoolError, PoolIndex};
pub use decode::{DecodeError, Decoded, Operands, decode, decode_at};
pub use descriptor::{DescriptorError, FieldType, MethodDescriptor};
pub use disasm::{DisasmError, MethodListing, disassemble, disassemble_method, listing};
pub use insn::{Insn, Label};
pub use lower::{SwitchKind, lower_switch, switch_kind};
pub use opcode::Opcode;
