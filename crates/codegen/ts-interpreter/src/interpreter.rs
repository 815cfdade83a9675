//! Bytecode interpreter

use crate::frame::Frame;
use crate::native::{self, NativeClass, Streams};
use crate::value::Value;
use std::io::{self, Write};
use thiserror::Error;
use tracing::{debug, debug_span, trace};
use ts_bytecode::{
    Class, DecodeError, DescriptorError, MemberRef, Method, MethodDescriptor, Opcode, Operands,
    PoolIndex, decode_at,
};

/// Deepest call chain before execution is abandoned
pub const MAX_CALL_DEPTH: usize = 256;

/// Interpreter error
#[derive(Debug, Error)]
pub enum InterpreterError {
    /// Push past `max_stack`
    #[error("operand stack overflow in {method} at pc {pc}")]
    StackOverflow {
        /// Method name
        method: String,
        /// Instruction pc
        pc: u32,
    },
    /// Pop from an empty stack
    #[error("operand stack underflow in {method} at pc {pc}")]
    StackUnderflow {
        /// Method name
        method: String,
        /// Instruction pc
        pc: u32,
    },
    /// Local slot past `max_locals`
    #[error("local {index} is out of range in {method}")]
    LocalOutOfRange {
        /// Method name
        method: String,
        /// Slot index
        index: usize,
    },
    /// Read of a local that was never written
    #[error("local {index} is read before it is written in {method}")]
    UninitializedLocal {
        /// Method name
        method: String,
        /// Slot index
        index: usize,
    },
    /// Value of the wrong kind
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected kind
        expected: &'static str,
        /// Actual kind
        got: &'static str,
    },
    /// Execution ran off the code or jumped outside it
    #[error("pc {pc} is outside the code of {method}")]
    PcOutOfBounds {
        /// Method name
        method: String,
        /// Offending pc
        pc: u32,
    },
    /// Code that does not decode
    #[error("bad code in {method}")]
    Decode {
        /// Method name
        method: String,
        /// Decoder error
        #[source]
        source: DecodeError,
    },
    /// Method lookup failed
    #[error("could not find method {class}.{name}{descriptor}")]
    MethodNotFound {
        /// Class name
        class: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },
    /// `invoke_static` on an instance method
    #[error("method {0} is not static")]
    NotStatic(String),
    /// Wrong number of arguments for a method
    #[error("{method} takes {expected} arguments, got {got}")]
    ArgumentCount {
        /// Method name
        method: String,
        /// Parameters declared
        expected: usize,
        /// Arguments supplied
        got: usize,
    },
    /// Static field that no class provides
    #[error("unknown field {0}")]
    UnknownField(String),
    /// Library method with no host implementation
    #[error("no native implementation for {0}")]
    UnknownNative(String),
    /// Pool index of the wrong kind or out of range
    #[error("constant pool entry #{0} is missing or has the wrong kind")]
    BadConstant(PoolIndex),
    /// String index out of range
    #[error("string index {0} out of bounds")]
    IndexOutOfBounds(i32),
    /// Construct the interpreter does not model
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Malformed method descriptor
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    /// Call chain deeper than [`MAX_CALL_DEPTH`]
    #[error("call depth exceeded {MAX_CALL_DEPTH}")]
    CallDepthExceeded,
    /// Writing program output failed
    #[error("output error")]
    Io(#[from] io::Error),
}

/// Interpreter state
///
/// Program output goes to the two sinks standing in for `System.out` and
/// `System.err`.
pub struct Interpreter<'io> {
    streams: Streams<'io>,
    depth: usize,
    steps: u64,
}

impl<'io> Interpreter<'io> {
    /// Create an interpreter writing to the given sinks
    #[must_use]
    pub fn new(out: &'io mut dyn Write, err: &'io mut dyn Write) -> Self {
        Self {
            streams: Streams { out, err },
            depth: 0,
            steps: 0,
        }
    }

    /// Instructions executed so far
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Invoke a static method by name and descriptor
    ///
    /// Returns the method's result, or `None` for a void method.
    ///
    /// # Errors
    ///
    /// Returns `InterpreterError` if the method is missing or not static, or
    /// if execution fails
    pub fn invoke_static(
        &mut self,
        class: &Class,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, InterpreterError> {
        let method = find_method(class, name, descriptor)?;
        if !method.is_static() {
            return Err(InterpreterError::NotStatic(method.name.clone()));
        }
        self.call(class, method, args)
    }

    /// Invoke any method by name and descriptor
    ///
    /// For instance methods the receiver comes first in `args`.
    ///
    /// # Errors
    ///
    /// Returns `InterpreterError` if the method is missing or execution fails
    pub fn invoke(
        &mut self,
        class: &Class,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, InterpreterError> {
        let method = find_method(class, name, descriptor)?;
        self.call(class, method, args)
    }

    fn call(
        &mut self,
        class: &Class,
        method: &Method,
        args: Vec<Value>,
    ) -> Result<Option<Value>, InterpreterError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(InterpreterError::CallDepthExceeded);
        }
        let expected = arg_slots(method)?;
        if args.len() != expected {
            return Err(InterpreterError::ArgumentCount {
                method: method.name.clone(),
                expected,
                got: args.len(),
            });
        }

        self.depth += 1;
        let result = self.execute(class, method, args);
        self.depth -= 1;
        result
    }

    fn execute(
        &mut self,
        class: &Class,
        method: &Method,
        args: Vec<Value>,
    ) -> Result<Option<Value>, InterpreterError> {
        let _span = debug_span!(
            "invoke",
            class = %class.name,
            method = %method.name,
            descriptor = %method.descriptor,
            depth = self.depth
        )
        .entered();
        debug!("entering method");
        let mut frame = Frame::new(method, args)?;

        loop {
            let insn = decode_at(&method.code, frame.pc).map_err(|source| match source {
                DecodeError::PcOutOfBounds(pc) => InterpreterError::PcOutOfBounds {
                    method: method.name.clone(),
                    pc,
                },
                source => InterpreterError::Decode {
                    method: method.name.clone(),
                    source,
                },
            })?;
            self.steps += 1;
            trace!(pc = insn.pc, opcode = %insn.opcode, stack = frame.depth(), "step");

            let mut next = insn.next_pc();
            match (insn.opcode, &insn.operands) {
                (
                    Opcode::IconstM1
                    | Opcode::Iconst0
                    | Opcode::Iconst1
                    | Opcode::Iconst2
                    | Opcode::Iconst3
                    | Opcode::Iconst4
                    | Opcode::Iconst5
                    | Opcode::Bipush
                    | Opcode::Sipush,
                    Operands::Int { value },
                ) => frame.push(Value::Int(*value))?,
                (Opcode::Ldc | Opcode::LdcW, Operands::Pool { index }) => {
                    let value = class
                        .pool
                        .integer(*index)
                        .map(Value::Int)
                        .or_else(|| {
                            let text = class.pool.string(*index)?;
                            Some(Value::Str(text.to_owned()))
                        })
                        .ok_or(InterpreterError::BadConstant(*index))?;
                    frame.push(value)?;
                }
                (
                    Opcode::Iload
                    | Opcode::Iload0
                    | Opcode::Iload1
                    | Opcode::Iload2
                    | Opcode::Iload3,
                    Operands::Local { index },
                ) => {
                    let value = frame.load(usize::from(*index))?;
                    if value.as_int().is_none() {
                        return Err(InterpreterError::TypeMismatch {
                            expected: "int",
                            got: value.kind(),
                        });
                    }
                    frame.push(value)?;
                }
                (
                    Opcode::Istore
                    | Opcode::Istore0
                    | Opcode::Istore1
                    | Opcode::Istore2
                    | Opcode::Istore3,
                    Operands::Local { index },
                ) => {
                    let value = frame.pop_int()?;
                    frame.store(usize::from(*index), Value::Int(value))?;
                }
                (Opcode::Aload0, _) => {
                    let value = frame.load(0)?;
                    frame.push(value)?;
                }
                (Opcode::Iadd, _) => {
                    let right = frame.pop_int()?;
                    let left = frame.pop_int()?;
                    frame.push(Value::Int(left.wrapping_add(right)))?;
                }
                (Opcode::Isub, _) => {
                    let right = frame.pop_int()?;
                    let left = frame.pop_int()?;
                    frame.push(Value::Int(left.wrapping_sub(right)))?;
                }
                (Opcode::Goto, Operands::Branch { target }) => next = *target,
                (Opcode::Tableswitch | Opcode::Lookupswitch, _) => {
                    let key = frame.pop_int()?;
                    next = insn.switch_target(key).ok_or_else(|| {
                        InterpreterError::Unsupported(format!(
                            "{} without a jump table",
                            insn.opcode
                        ))
                    })?;
                    debug!(pc = insn.pc, key, target = next, "switch");
                }
                (Opcode::Ireturn, _) => {
                    let value = frame.pop_int()?;
                    debug!(result = value, "returning");
                    return Ok(Some(Value::Int(value)));
                }
                (Opcode::Return, _) => {
                    debug!("returning void");
                    return Ok(None);
                }
                (Opcode::Getstatic, Operands::Pool { index }) => {
                    let member = resolve_member(class, *index)?;
                    let value = NativeClass::resolve(member.class)
                        .and_then(|native| native::get_static(native, &member))
                        .ok_or_else(|| InterpreterError::UnknownField(member.to_string()))?;
                    frame.push(value)?;
                }
                (Opcode::Invokevirtual, Operands::Pool { index }) => {
                    let member = resolve_member(class, *index)?;
                    let Some(native) = NativeClass::resolve(member.class) else {
                        return Err(InterpreterError::Unsupported(format!(
                            "invokevirtual on non-native method {member}"
                        )));
                    };
                    native::invoke_virtual(native, &member, &mut frame, &mut self.streams)?;
                }
                (Opcode::Invokespecial, Operands::Pool { index }) => {
                    let member = resolve_member(class, *index)?;
                    if member.class == "java/lang/Object" && member.name == "<init>" {
                        frame.pop()?;
                    } else {
                        self.invoke_local(class, &member, &mut frame, true)?;
                    }
                }
                (Opcode::Invokestatic, Operands::Pool { index }) => {
                    let member = resolve_member(class, *index)?;
                    self.invoke_local(class, &member, &mut frame, false)?;
                }
                (opcode, operands) => {
                    return Err(InterpreterError::Unsupported(format!(
                        "{opcode} with operands {operands:?}"
                    )));
                }
            }
            frame.pc = next;
        }
    }

    /// Call a method of the executing class, taking arguments from `frame`
    fn invoke_local(
        &mut self,
        class: &Class,
        member: &MemberRef<'_>,
        frame: &mut Frame<'_>,
        has_receiver: bool,
    ) -> Result<(), InterpreterError> {
        if member.class != class.name {
            return Err(InterpreterError::MethodNotFound {
                class: member.class.to_owned(),
                name: member.name.to_owned(),
                descriptor: member.descriptor.to_owned(),
            });
        }
        let callee = find_method(class, member.name, member.descriptor)?;
        if callee.is_static() == has_receiver {
            return Err(InterpreterError::Unsupported(format!(
                "static-ness of {member} does not match its call site"
            )));
        }
        let descriptor = MethodDescriptor::parse(member.descriptor)?;
        let args = frame.pop_many(arg_slots(callee)?)?;
        let result = self.call(class, callee, args)?;
        match (descriptor.ret, result) {
            (Some(_), Some(value)) => frame.push(value),
            (None, None) => Ok(()),
            (Some(_), None) => Err(InterpreterError::TypeMismatch {
                expected: "return value",
                got: "void",
            }),
            (None, Some(value)) => Err(InterpreterError::TypeMismatch {
                expected: "void",
                got: value.kind(),
            }),
        }
    }
}

fn find_method<'class>(
    class: &'class Class,
    name: &str,
    descriptor: &str,
) -> Result<&'class Method, InterpreterError> {
    class
        .method(name, descriptor)
        .ok_or_else(|| InterpreterError::MethodNotFound {
            class: class.name.clone(),
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
        })
}

fn resolve_member(class: &Class, index: PoolIndex) -> Result<MemberRef<'_>, InterpreterError> {
    class
        .pool
        .member(index)
        .ok_or(InterpreterError::BadConstant(index))
}

/// Argument slots a method expects, receiver included
fn arg_slots(method: &Method) -> Result<usize, InterpreterError> {
    let descriptor = MethodDescriptor::parse(&method.descriptor)?;
    if let Some(wide) = descriptor
        .params
        .iter()
        .find(|param| !param.is_int_like() && !param.is_reference())
    {
        return Err(InterpreterError::Unsupported(format!(
            "parameter type {wide} in {}{}",
            method.name, method.descriptor
        )));
    }
    Ok(descriptor.params.len() + usize::from(!method.is_static()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ts_bytecode::{AccessFlags, Assembler, Insn, lower_switch};

    type Outcome = (Result<Option<Value>, InterpreterError>, String);

    fn run_static(class: &Class, name: &str, descriptor: &str, args: Vec<Value>) -> Outcome {
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let result =
            Interpreter::new(&mut out, &mut err).invoke_static(class, name, descriptor, args);
        (result, String::from_utf8(out).unwrap())
    }

    /// Sink whose writes always fail
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn static_method(name: &str, descriptor: &str, max_stack: u16, asm: &Assembler) -> Method {
        Method::assemble(name, descriptor, AccessFlags::STATIC, (max_stack, 0), asm).unwrap()
    }

    fn print_class(name: &str) -> (Class, PoolIndex, PoolIndex) {
        let mut class = Class::new(name);
        let out = class
            .pool
            .add_field_ref("java/lang/System", "out", "Ljava/io/PrintStream;")
            .unwrap();
        let println = class
            .pool
            .add_method_ref("java/io/PrintStream", "println", "(I)V")
            .unwrap();
        (class, out, println)
    }

    fn switch_class(cases: &[(i32, i32)], fallback: i32) -> Class {
        let mut asm = Assembler::new();
        let default = asm.new_label();
        let arms: Vec<_> = cases.iter().map(|(key, _)| (*key, asm.new_label())).collect();
        asm.push(Insn::ILoad(0));
        asm.push(lower_switch(&arms, default).unwrap());
        for ((_, result), (_, label)) in cases.iter().zip(&arms) {
            asm.bind(*label).push(Insn::IConst(*result)).push(Insn::IReturn);
        }
        asm.bind(default).push(Insn::IConst(fallback)).push(Insn::IReturn);

        let mut class = Class::new("Switch");
        let pick = Method::assemble("pick", "(I)I", AccessFlags::STATIC, (1, 1), &asm).unwrap();
        class.add_method(pick);
        class
    }

    #[test]
    fn test_tableswitch_execution() {
        let class = switch_class(&[(0, 10), (1, 11), (2, 12)], -1);
        for (input, expected) in [(-1, -1), (0, 10), (1, 11), (2, 12), (3, -1)] {
            let (result, _) = run_static(&class, "pick", "(I)I", vec![Value::Int(input)]);
            assert_eq!(result.unwrap(), Some(Value::Int(expected)), "input {input}");
        }
    }

    #[test]
    fn test_lookupswitch_execution() {
        let class = switch_class(&[(-1000, 1), (7, 2), (10_000, 3)], 0);
        for (input, expected) in [(-1000, 1), (7, 2), (10_000, 3), (8, 0), (i32::MAX, 0)] {
            let (result, _) = run_static(&class, "pick", "(I)I", vec![Value::Int(input)]);
            assert_eq!(result.unwrap(), Some(Value::Int(expected)), "input {input}");
        }
    }

    #[test]
    fn test_static_call_and_println() {
        let (mut class, out, println) = print_class("Calls");
        let twice = class.pool.add_method_ref("Calls", "twice", "(I)I").unwrap();

        let mut body = Assembler::new();
        body.push(Insn::ILoad(0))
            .push(Insn::ILoad(0))
            .push(Insn::IAdd)
            .push(Insn::IReturn);
        let twice_method =
            Method::assemble("twice", "(I)I", AccessFlags::STATIC, (2, 1), &body).unwrap();
        class.add_method(twice_method);

        let mut main = Assembler::new();
        main.push(Insn::GetStatic(out))
            .push(Insn::IConst(21))
            .push(Insn::InvokeStatic(twice))
            .push(Insn::InvokeVirtual(println))
            .push(Insn::Return);
        class.add_method(static_method("main", "()V", 2, &main));

        let (result, output) = run_static(&class, "main", "()V", Vec::new());
        assert_eq!(result.unwrap(), None);
        assert_eq!(output, "42\n");
    }

    #[test]
    fn test_ldc_pushes_integer_constants() {
        let (mut class, out, println) = print_class("Big");
        let big = class.pool.add_integer(1_000_000).unwrap();
        let mut asm = Assembler::new();
        asm.push(Insn::GetStatic(out))
            .push(Insn::Ldc(big))
            .push(Insn::InvokeVirtual(println))
            .push(Insn::Return);
        class.add_method(static_method("main", "()V", 2, &asm));

        let (result, output) = run_static(&class, "main", "()V", Vec::new());
        assert_eq!(result.unwrap(), None);
        assert_eq!(output, "1000000\n");
    }

    #[test]
    fn test_failed_output_is_an_io_error() {
        let (mut class, out, println) = print_class("Loud");
        let mut asm = Assembler::new();
        asm.push(Insn::GetStatic(out))
            .push(Insn::IConst(1))
            .push(Insn::InvokeVirtual(println))
            .push(Insn::Return);
        class.add_method(static_method("main", "()V", 2, &asm));

        let (mut out_sink, mut err_sink) = (ClosedPipe, Vec::new());
        let result = Interpreter::new(&mut out_sink, &mut err_sink)
            .invoke_static(&class, "main", "()V", Vec::new());
        let Err(InterpreterError::Io(error)) = result else {
            panic!("expected an output error, got {result:?}");
        };
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_unknown_static_field() {
        let mut class = Class::new("Reads");
        let input = class
            .pool
            .add_field_ref("java/lang/System", "in", "Ljava/io/InputStream;")
            .unwrap();
        let mut asm = Assembler::new();
        asm.push(Insn::GetStatic(input)).push(Insn::Return);
        class.add_method(static_method("main", "()V", 1, &asm));

        let (result, _) = run_static(&class, "main", "()V", Vec::new());
        let Err(InterpreterError::UnknownField(field)) = result else {
            panic!("expected an unknown field, got {result:?}");
        };
        assert_eq!(field, "java/lang/System.in:Ljava/io/InputStream;");
    }

    #[test]
    fn test_missing_return_runs_off_the_code() {
        let mut asm = Assembler::new();
        asm.push(Insn::IConst(1)).push(Insn::IStore(0));
        let mut class = Class::new("Broken");
        let method = Method::assemble("f", "()V", AccessFlags::STATIC, (1, 1), &asm).unwrap();
        class.add_method(method);

        let (result, _) = run_static(&class, "f", "()V", Vec::new());
        assert!(matches!(result, Err(InterpreterError::PcOutOfBounds { pc: 2, .. })));
    }

    #[test]
    fn test_stack_underflow_is_reported() {
        let mut asm = Assembler::new();
        asm.push(Insn::IReturn);
        let mut class = Class::new("Broken");
        class.add_method(static_method("f", "()I", 1, &asm));

        let (result, _) = run_static(&class, "f", "()I", Vec::new());
        assert!(matches!(result, Err(InterpreterError::StackUnderflow { pc: 0, .. })));
    }

    #[test]
    fn test_unbounded_recursion_is_cut_off() {
        let mut class = Class::new("Loop");
        let itself = class.pool.add_method_ref("Loop", "f", "()V").unwrap();
        let mut asm = Assembler::new();
        asm.push(Insn::InvokeStatic(itself)).push(Insn::Return);
        class.add_method(static_method("f", "()V", 0, &asm));

        let (result, _) = run_static(&class, "f", "()V", Vec::new());
        assert!(matches!(result, Err(InterpreterError::CallDepthExceeded)));
    }

    #[test]
    fn test_lookup_errors() {
        let class = switch_class(&[(0, 0)], 1);
        let (result, _) = run_static(&class, "missing", "()V", Vec::new());
        assert!(matches!(result, Err(InterpreterError::MethodNotFound { .. })));

        let (result, _) = run_static(&class, "pick", "(I)I", Vec::new());
        assert!(matches!(
            result,
            Err(InterpreterError::ArgumentCount { expected: 1, got: 0, .. })
        ));

        let (result, _) = run_static(&class, "pick", "(I)I", vec![Value::Null]);
        assert!(matches!(
            result,
            Err(InterpreterError::TypeMismatch { expected: "int", got: "null" })
        ));
    }

    #[test]
    fn test_instance_method_needs_invoke() {
        let mut asm = Assembler::new();
        asm.push(Insn::Return);
        let mut class = Class::new("Obj");
        let init = Method::assemble("<init>", "()V", AccessFlags::PUBLIC, (1, 1), &asm).unwrap();
        class.add_method(init);

        let (result, _) = run_static(&class, "<init>", "()V", Vec::new());
        assert!(matches!(result, Err(InterpreterError::NotStatic(_))));

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let mut interpreter = Interpreter::new(&mut out, &mut err);
        let result = interpreter.invoke(&class, "<init>", "()V", vec![Value::Null]);
        assert_eq!(result.unwrap(), None);
        assert_eq!(interpreter.steps(), 1);
    }
}
