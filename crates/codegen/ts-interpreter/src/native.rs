//! Host implementations of the few library classes programs may touch

use crate::frame::Frame;
use crate::interpreter::InterpreterError;
use crate::value::{NativeObject, Value};
use std::io::Write;
use ts_bytecode::MemberRef;

/// A library class implemented by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeClass {
    /// `java/lang/System`
    System,
    /// `java/lang/String`
    String,
    /// `java/io/PrintStream`
    PrintStream,
}

impl NativeClass {
    /// Resolve an internal class name
    #[must_use]
    pub fn resolve(name: &str) -> Option<Self> {
        match name {
            "java/lang/System" => Some(Self::System),
            "java/lang/String" => Some(Self::String),
            "java/io/PrintStream" => Some(Self::PrintStream),
            _ => None,
        }
    }
}

/// Output sinks backing `System.out` and `System.err`
pub struct Streams<'io> {
    /// `System.out`
    pub out: &'io mut dyn Write,
    /// `System.err`
    pub err: &'io mut dyn Write,
}

impl Streams<'_> {
    fn select(&mut self, receiver: &Value) -> Result<&mut dyn Write, InterpreterError> {
        match receiver {
            Value::Native(NativeObject::StdOut) => Ok(&mut *self.out),
            Value::Native(NativeObject::StdErr) => Ok(&mut *self.err),
            other => Err(InterpreterError::TypeMismatch {
                expected: "print stream",
                got: other.kind(),
            }),
        }
    }
}

/// Read a static field of a native class
#[must_use]
pub fn get_static(class: NativeClass, member: &MemberRef<'_>) -> Option<Value> {
    match (class, member.name, member.descriptor) {
        (NativeClass::System, "out", "Ljava/io/PrintStream;") => {
            Some(Value::Native(NativeObject::StdOut))
        }
        (NativeClass::System, "err", "Ljava/io/PrintStream;") => {
            Some(Value::Native(NativeObject::StdErr))
        }
        _ => None,
    }
}

/// Invoke an instance method of a native class
///
/// Arguments and the receiver are taken from the frame's stack and any
/// result is pushed back.
///
/// # Errors
///
/// Returns `InterpreterError::UnknownNative` for unimplemented methods, and
/// stack, type or I/O errors raised while running one
pub fn invoke_virtual(
    class: NativeClass,
    member: &MemberRef<'_>,
    frame: &mut Frame<'_>,
    streams: &mut Streams<'_>,
) -> Result<(), InterpreterError> {
    match (class, member.name) {
        (NativeClass::PrintStream, "println") => print(member, frame, streams, true),
        (NativeClass::PrintStream, "print") => print(member, frame, streams, false),
        (NativeClass::String, "length") if member.descriptor == "()I" => {
            let text = pop_string(frame)?;
            let length = text.encode_utf16().count();
            frame.push(Value::Int(length as i32))
        }
        (NativeClass::String, "charAt") if member.descriptor == "(I)C" => {
            let index = frame.pop_int()?;
            let text = pop_string(frame)?;
            let unit = usize::try_from(index)
                .ok()
                .and_then(|slot| text.encode_utf16().nth(slot))
                .ok_or(InterpreterError::IndexOutOfBounds(index))?;
            frame.push(Value::Int(i32::from(unit)))
        }
        _ => Err(InterpreterError::UnknownNative(member.to_string())),
    }
}

fn pop_string(frame: &mut Frame<'_>) -> Result<String, InterpreterError> {
    match frame.pop()? {
        Value::Str(text) => Ok(text),
        other => Err(InterpreterError::TypeMismatch {
            expected: "string",
            got: other.kind(),
        }),
    }
}

fn print(
    member: &MemberRef<'_>,
    frame: &mut Frame<'_>,
    streams: &mut Streams<'_>,
    newline: bool,
) -> Result<(), InterpreterError> {
    let text = match member.descriptor {
        "()V" => String::new(),
        "(I)V" | "(B)V" | "(S)V" => frame.pop_int()?.to_string(),
        "(Z)V" => (frame.pop_int()? != 0).to_string(),
        "(C)V" => {
            let unit = frame.pop_int()?;
            char::from_u32(unit as u32)
                .unwrap_or(char::REPLACEMENT_CHARACTER)
                .to_string()
        }
        "(Ljava/lang/String;)V" => match frame.pop()? {
            Value::Str(text) => text,
            Value::Null => "null".to_owned(),
            other => {
                return Err(InterpreterError::TypeMismatch {
                    expected: "string",
                    got: other.kind(),
                });
            }
        },
        _ => return Err(InterpreterError::UnknownNative(member.to_string())),
    };
    let receiver = frame.pop()?;
    let sink = streams.select(&receiver)?;
    if newline {
        writeln!(sink, "{text}")?;
    } else {
        write!(sink, "{text}")?;
    }
    Ok(())
}
