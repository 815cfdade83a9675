//! Table switch driver
//!
//! The chooser maps `0`, `1` and `2` to themselves and everything else to
//! `-1`. The driver feeds it `-1, 0, 1, 2, 3` and prints each result on its
//! own line. A [`Backend`] decides how the chooser is evaluated: natively,
//! or by running the `TableSwitch` fixture class on the interpreter.

pub mod backend;
pub mod chooser;
pub mod driver;
pub mod fixture;

pub use backend::{Backend, BackendKind, InterpreterBackend, NativeBackend};
pub use chooser::choose;
pub use driver::{DriverError, INPUTS, run, run_to_string};
pub use fixture::table_switch_class;
