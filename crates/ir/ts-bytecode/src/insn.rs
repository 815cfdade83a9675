//! Symbolic instructions consumed by the assembler

use crate::constant_pool::PoolIndex;
use std::fmt;

/// Branch target placeholder, bound to a position with [`Insn::Label`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    #[allow(clippy::min_ident_chars, reason = "`f` matches the `Display` signature")]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A symbolic instruction
///
/// Branches name labels instead of offsets, and `IConst` picks the shortest
/// encoding for its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insn {
    /// Bind a label to the current position
    Label(Label),
    /// Push an int constant (`iconst_*`, `bipush` or `sipush`)
    IConst(i32),
    /// Push a pool constant (`ldc` or `ldc_w`)
    Ldc(PoolIndex),
    /// Load int local (`iload_n` or `iload`)
    ILoad(u8),
    /// Store int local (`istore_n` or `istore`)
    IStore(u8),
    /// Load reference local 0
    ALoad0,
    /// Add two ints
    IAdd,
    /// Subtract two ints
    ISub,
    /// Unconditional branch
    Goto(Label),
    /// Dense jump table over `low..=high`
    TableSwitch {
        /// Lowest key
        low: i32,
        /// Highest key
        high: i32,
        /// Target for keys outside the range
        default: Label,
        /// One target per key, in key order
        targets: Vec<Label>,
    },
    /// Sparse jump table
    LookupSwitch {
        /// Target for unmatched keys
        default: Label,
        /// Key/target pairs sorted by key
        pairs: Vec<(i32, Label)>,
    },
    /// Return int
    IReturn,
    /// Return void
    Return,
    /// Read a static field
    GetStatic(PoolIndex),
    /// Invoke an instance method
    InvokeVirtual(PoolIndex),
    /// Invoke a constructor or private method
    InvokeSpecial(PoolIndex),
    /// Invoke a static method
    InvokeStatic(PoolIndex),
}

/// Number of zero bytes between a switch opcode at `pc` and its first operand
///
/// Operands start at the next multiple of 4 measured from the start of the
/// code array.
#[must_use]
pub const fn switch_padding(pc: u32) -> u32 {
    (4 - (pc + 1) % 4) % 4
}
