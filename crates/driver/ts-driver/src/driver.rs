//! The fixed driver sequence

use crate::backend::Backend;
use std::io::{self, Write};
use thiserror::Error;
use tracing::info_span;
use ts_bytecode::AsmError;
use ts_interpreter::InterpreterError;

/// Inputs the driver passes to the chooser, in order
pub const INPUTS: [i32; 5] = [-1, 0, 1, 2, 3];

/// Driver error
#[derive(Debug, Error)]
pub enum DriverError {
    /// The fixture class failed to assemble
    #[error("failed to assemble the fixture class")]
    Asm(#[from] AsmError),
    /// Bytecode execution failed
    #[error("interpreter failed")]
    Interpreter(#[from] InterpreterError),
    /// Writing output failed
    #[error("failed to write output")]
    Io(#[from] io::Error),
    /// `choose` produced something other than an int
    #[error("choose({input}) returned {got}")]
    UnexpectedResult {
        /// Input passed
        input: i32,
        /// What came back
        got: String,
    },
}

/// Run the driver on `backend`, writing results to `out`
///
/// # Errors
///
/// Returns `DriverError` if the backend fails or output cannot be written
pub fn run(backend: &mut dyn Backend, out: &mut dyn Write) -> Result<(), DriverError> {
    let _span = info_span!("driver", backend = backend.name()).entered();
    backend.run(out)?;
    out.flush()?;
    Ok(())
}

/// Run the driver and collect its output
///
/// # Errors
///
/// Returns `DriverError` if the backend fails
pub fn run_to_string(backend: &mut dyn Backend) -> Result<String, DriverError> {
    let mut out = Vec::new();
    run(backend, &mut out)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}
