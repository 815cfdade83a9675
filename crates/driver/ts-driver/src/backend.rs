//! Ways of evaluating the chooser

use crate::chooser;
use crate::driver::{DriverError, INPUTS};
use crate::fixture::{self, CHOOSE_DESCRIPTOR, MAIN_DESCRIPTOR};
use std::io::{self, Write};
use tracing::debug;
use ts_bytecode::Class;
use ts_interpreter::{Interpreter, Value};

/// A way of evaluating the chooser
pub trait Backend {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Evaluate the chooser for one input
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if evaluation fails
    fn choose(&mut self, n: i32) -> Result<i32, DriverError>;

    /// Run the fixed driver sequence, one result per line
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if evaluation or writing fails
    fn run(&mut self, out: &mut dyn Write) -> Result<(), DriverError> {
        for input in INPUTS {
            let result = self.choose(input)?;
            debug!(input, result, "chose");
            writeln!(out, "{result}")?;
        }
        Ok(())
    }
}

/// Calls [`chooser::choose`] directly
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl Backend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn choose(&mut self, n: i32) -> Result<i32, DriverError> {
        Ok(chooser::choose(n))
    }
}

/// Executes the fixture class on the bytecode interpreter
#[derive(Debug, Clone)]
pub struct InterpreterBackend {
    class: Class,
}

impl InterpreterBackend {
    /// Assemble the fixture class
    ///
    /// # Errors
    ///
    /// Returns `DriverError::Asm` if the fixture fails to assemble
    pub fn new() -> Result<Self, DriverError> {
        Ok(Self::with_class(fixture::table_switch_class()?))
    }

    /// Use an already built class exposing `choose` and `main`
    #[must_use]
    pub fn with_class(class: Class) -> Self {
        Self { class }
    }

    /// The class being executed
    #[must_use]
    pub fn class(&self) -> &Class {
        &self.class
    }
}

impl Backend for InterpreterBackend {
    fn name(&self) -> &'static str {
        "interpreter"
    }

    fn choose(&mut self, n: i32) -> Result<i32, DriverError> {
        let (mut out, mut err) = (io::sink(), io::sink());
        let result = Interpreter::new(&mut out, &mut err).invoke_static(
            &self.class,
            "choose",
            CHOOSE_DESCRIPTOR,
            vec![Value::Int(n)],
        )?;
        match result {
            Some(Value::Int(value)) => Ok(value),
            other => Err(DriverError::UnexpectedResult {
                input: n,
                got: format!("{other:?}"),
            }),
        }
    }

    fn run(&mut self, out: &mut dyn Write) -> Result<(), DriverError> {
        let mut err = io::stderr();
        let mut interpreter = Interpreter::new(out, &mut err);
        interpreter.invoke_static(&self.class, "main", MAIN_DESCRIPTOR, vec![Value::Null])?;
        debug!(steps = interpreter.steps(), "main finished");
        Ok(())
    }
}

/// Which backend to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// [`NativeBackend`]
    #[default]
    Native,
    /// [`InterpreterBackend`]
    Interpreter,
}

impl BackendKind {
    /// Construct the backend
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the backend cannot be set up
    pub fn create(self) -> Result<Box<dyn Backend>, DriverError> {
        Ok(match self {
            Self::Native => Box::new(NativeBackend),
            Self::Interpreter => Box::new(InterpreterBackend::new()?),
        })
    }
}
