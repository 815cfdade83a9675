//! Activation frames: operand stack, locals and pc

use crate::interpreter::InterpreterError;
use crate::value::Value;
use ts_bytecode::Method;

/// One method activation
#[derive(Debug)]
pub struct Frame<'code> {
    /// The executing method
    pub method: &'code Method,
    /// Address of the next instruction
    pub pc: u32,
    stack: Vec<Value>,
    locals: Vec<Option<Value>>,
}

impl<'code> Frame<'code> {
    /// Create a frame with `args` bound to the first locals
    ///
    /// # Errors
    ///
    /// Returns `InterpreterError::LocalOutOfRange` if there are more
    /// arguments than local slots
    pub fn new(method: &'code Method, args: Vec<Value>) -> Result<Self, InterpreterError> {
        let max_locals = usize::from(method.max_locals);
        if args.len() > max_locals {
            return Err(InterpreterError::LocalOutOfRange {
                method: method.name.clone(),
                index: args.len() - 1,
            });
        }
        let mut locals: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        locals.resize(max_locals, None);
        Ok(Self {
            method,
            pc: 0,
            stack: Vec::with_capacity(usize::from(method.max_stack)),
            locals,
        })
    }

    /// Current operand stack depth
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Push onto the operand stack
    ///
    /// # Errors
    ///
    /// Returns `InterpreterError::StackOverflow` past `max_stack`
    pub fn push(&mut self, value: Value) -> Result<(), InterpreterError> {
        if self.stack.len() >= usize::from(self.method.max_stack) {
            return Err(InterpreterError::StackOverflow {
                method: self.method.name.clone(),
                pc: self.pc,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pop from the operand stack
    ///
    /// # Errors
    ///
    /// Returns `InterpreterError::StackUnderflow` on an empty stack
    pub fn pop(&mut self) -> Result<Value, InterpreterError> {
        self.stack.pop().ok_or_else(|| InterpreterError::StackUnderflow {
            method: self.method.name.clone(),
            pc: self.pc,
        })
    }

    /// Pop an int
    ///
    /// # Errors
    ///
    /// Returns `InterpreterError` on underflow or if the top is not an int
    pub fn pop_int(&mut self) -> Result<i32, InterpreterError> {
        let value = self.pop()?;
        value.as_int().ok_or(InterpreterError::TypeMismatch {
            expected: "int",
            got: value.kind(),
        })
    }

    /// Pop `count` values, returned in push order
    ///
    /// # Errors
    ///
    /// Returns `InterpreterError::StackUnderflow` if fewer are available
    pub fn pop_many(&mut self, count: usize) -> Result<Vec<Value>, InterpreterError> {
        let Some(split) = self.stack.len().checked_sub(count) else {
            return Err(InterpreterError::StackUnderflow {
                method: self.method.name.clone(),
                pc: self.pc,
            });
        };
        Ok(self.stack.split_off(split))
    }

    /// Read a local
    ///
    /// # Errors
    ///
    /// Returns `InterpreterError` if the slot is out of range or unset
    pub fn load(&self, index: usize) -> Result<Value, InterpreterError> {
        match self.locals.get(index) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(InterpreterError::UninitializedLocal {
                method: self.method.name.clone(),
                index,
            }),
            None => Err(InterpreterError::LocalOutOfRange {
                method: self.method.name.clone(),
                index,
            }),
        }
    }

    /// Write a local
    ///
    /// # Errors
    ///
    /// Returns `InterpreterError::LocalOutOfRange` past `max_locals`
    pub fn store(&mut self, index: usize, value: Value) -> Result<(), InterpreterError> {
        let slot = self
            .locals
            .get_mut(index)
            .ok_or_else(|| InterpreterError::LocalOutOfRange {
                method: self.method.name.clone(),
                index,
            })?;
        *slot = Some(value);
        Ok(())
    }
}
