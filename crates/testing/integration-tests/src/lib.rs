//! Integration test utilities for the table switch crates

use anyhow::{Result, bail};
use ts_bytecode::{AccessFlags, Assembler, Class, Insn, Method, lower_switch};
use ts_interpreter::{Interpreter, InterpreterError, Value};

/// Name of the class built by [`SwitchFixture`]
pub const SWITCH_CLASS: &str = "Switch";

/// A class with one static `pick(I)I` method built from switch arms
pub struct SwitchFixture {
    /// The assembled class
    pub class: Class,
    /// Arms as `(key, result)`, in the order given
    pub arms: Vec<(i32, i16)>,
    /// Result for unmatched keys
    pub default: i16,
}

impl SwitchFixture {
    /// Build `pick` so that each key returns its result and anything else
    /// returns `default`
    ///
    /// # Errors
    ///
    /// Returns an error if lowering or assembly fails
    pub fn new(arms: &[(i32, i16)], default: i16) -> Result<Self> {
        let mut asm = Assembler::new();
        let default_label = asm.new_label();
        let labelled: Vec<_> = arms
            .iter()
            .map(|&(key, result)| (key, result, asm.new_label()))
            .collect();
        let cases: Vec<_> = labelled.iter().map(|&(key, _, label)| (key, label)).collect();

        asm.push(Insn::ILoad(0));
        asm.push(lower_switch(&cases, default_label)?);
        for &(_, result, label) in &labelled {
            asm.bind(label)
                .push(Insn::IConst(i32::from(result)))
                .push(Insn::IReturn);
        }
        asm.bind(default_label)
            .push(Insn::IConst(i32::from(default)))
            .push(Insn::IReturn);

        let pick = Method::assemble(
            "pick",
            "(I)I",
            AccessFlags::PUBLIC | AccessFlags::STATIC,
            (1, 1),
            &asm,
        )?;
        let mut class = Class::new(SWITCH_CLASS);
        class.add_method(pick);
        Ok(Self {
            class,
            arms: arms.to_vec(),
            default,
        })
    }

    /// What `pick` should return for `key`
    #[must_use]
    pub fn expected(&self, key: i32) -> i32 {
        self.arms
            .iter()
            .find(|(arm, _)| *arm == key)
            .map_or(i32::from(self.default), |(_, result)| i32::from(*result))
    }

    /// Run `pick` on the interpreter
    ///
    /// # Errors
    ///
    /// Returns an error if execution fails or does not produce an int
    pub fn pick(&self, key: i32) -> Result<i32> {
        match run_static(&self.class, "pick", "(I)I", vec![Value::Int(key)])?.result {
            Some(Value::Int(value)) => Ok(value),
            other => bail!("pick({key}) returned {other:?}"),
        }
    }
}

/// Everything observable from one interpreter run
#[derive(Debug)]
pub struct Run {
    /// The method's return value
    pub result: Option<Value>,
    /// Text written to `System.out`
    pub stdout: String,
    /// Text written to `System.err`
    pub stderr: String,
}

/// Invoke a static method with captured output streams
///
/// # Errors
///
/// Returns an error if execution fails
pub fn run_static(class: &Class, name: &str, descriptor: &str, args: Vec<Value>) -> Result<Run> {
    run_with(|interpreter| interpreter.invoke_static(class, name, descriptor, args))
}

/// Invoke any method with captured output streams
///
/// # Errors
///
/// Returns an error if execution fails
pub fn run_method(class: &Class, name: &str, descriptor: &str, args: Vec<Value>) -> Result<Run> {
    run_with(|interpreter| interpreter.invoke(class, name, descriptor, args))
}

fn run_with(
    call: impl FnOnce(&mut Interpreter<'_>) -> Result<Option<Value>, InterpreterError>,
) -> Result<Run> {
    let (mut out, mut err) = (Vec::new(), Vec::new());
    let result = {
        let mut interpreter = Interpreter::new(&mut out, &mut err);
        call(&mut interpreter)?
    };
    Ok(Run {
        result,
        stdout: String::from_utf8(out)?,
        stderr: String::from_utf8(err)?,
    })
}
