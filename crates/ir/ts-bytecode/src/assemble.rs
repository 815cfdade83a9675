//! Two-pass assembler from symbolic instructions to code bytes
//!
//! The first pass validates instructions and lays them out, recording the pc
//! of every label. Switch padding depends on the opcode's pc, so layout has
//! to run in order. The second pass emits bytes with label references
//! resolved to offsets relative to the referring opcode.

use crate::constant_pool::PoolError;
use crate::insn::{Insn, Label, switch_padding};
use crate::opcode::Opcode;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Largest code array a method may carry
pub const MAX_CODE_LEN: usize = 65_535;

/// Assembler error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    /// A branch names a label that is never bound
    #[error("label {0} is never bound")]
    UndefinedLabel(Label),
    /// A label is bound twice
    #[error("label {0} is bound more than once")]
    DuplicateLabel(Label),
    /// A `goto` offset does not fit in 16 bits
    #[error("branch from pc {from} to pc {to} does not fit in a 16-bit offset")]
    BranchTooFar {
        /// Opcode pc
        from: u32,
        /// Target pc
        to: u32,
    },
    /// `tableswitch` with `high < low`
    #[error("tableswitch range {low}..={high} is empty")]
    EmptyTableRange {
        /// Lowest key
        low: i32,
        /// Highest key
        high: i32,
    },
    /// `tableswitch` target count does not match its range
    #[error("tableswitch over {expected} keys has {got} targets")]
    TableTargetCount {
        /// `high - low + 1`
        expected: u64,
        /// Targets supplied
        got: usize,
    },
    /// `lookupswitch` keys not strictly ascending
    #[error("lookupswitch key {key} follows {previous}; keys must be strictly ascending")]
    UnsortedLookupKeys {
        /// Preceding key
        previous: i32,
        /// Offending key
        key: i32,
    },
    /// Duplicate case key handed to switch lowering
    #[error("duplicate case key {0}")]
    DuplicateCase(i32),
    /// `IConst` value does not fit in `sipush`
    #[error("int constant {0} does not fit in an immediate operand")]
    ImmediateOutOfRange(i32),
    /// Code exceeds the method size limit
    #[error("code length {0} exceeds the {MAX_CODE_LEN}-byte limit")]
    CodeTooLarge(usize),
    /// A constant needed by the code did not fit in the pool
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Incremental builder for an instruction sequence
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    insns: Vec<Insn>,
    next_label: u32,
}

impl Assembler {
    /// Create an empty assembler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh, unbound label
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Append an instruction
    pub fn push(&mut self, insn: Insn) -> &mut Self {
        self.insns.push(insn);
        self
    }

    /// Bind a label at the current position
    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.push(Insn::Label(label))
    }

    /// Assemble the collected instructions
    ///
    /// # Errors
    ///
    /// Returns `AsmError` if the instructions are invalid
    pub fn finish(&self) -> Result<Vec<u8>, AsmError> {
        assemble(&self.insns)
    }
}

/// Assemble a sequence of instructions into code bytes
///
/// # Errors
///
/// Returns `AsmError` if a label is unbound or bound twice, a switch is
/// malformed, an immediate or branch offset is out of range, or the code
/// exceeds [`MAX_CODE_LEN`]
pub fn assemble(insns: &[Insn]) -> Result<Vec<u8>, AsmError> {
    let labels = layout(insns)?;
    let mut code = Vec::new();
    for insn in insns {
        emit(&mut code, insn, &labels)?;
    }
    Ok(code)
}

fn layout(insns: &[Insn]) -> Result<FxHashMap<Label, u32>, AsmError> {
    let mut labels = FxHashMap::default();
    let mut pc: usize = 0;
    for insn in insns {
        validate(insn)?;
        if let Insn::Label(label) = insn
            && labels.insert(*label, pc as u32).is_some()
        {
            return Err(AsmError::DuplicateLabel(*label));
        }
        pc += encoded_len(insn, pc as u32)?;
        if pc > MAX_CODE_LEN {
            return Err(AsmError::CodeTooLarge(pc));
        }
    }
    Ok(labels)
}

fn validate(insn: &Insn) -> Result<(), AsmError> {
    match insn {
        Insn::TableSwitch {
            low, high, targets, ..
        } => {
            if high < low {
                return Err(AsmError::EmptyTableRange {
                    low: *low,
                    high: *high,
                });
            }
            let expected = (i64::from(*high) - i64::from(*low) + 1) as u64;
            if expected != targets.len() as u64 {
                return Err(AsmError::TableTargetCount {
                    expected,
                    got: targets.len(),
                });
            }
        }
        Insn::LookupSwitch { pairs, .. } => {
            for window in pairs.windows(2) {
                if let [(previous, _), (key, _)] = window
                    && key <= previous
                {
                    return Err(AsmError::UnsortedLookupKeys {
                        previous: *previous,
                        key: *key,
                    });
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn encoded_len(insn: &Insn, pc: u32) -> Result<usize, AsmError> {
    let len = match insn {
        Insn::Label(_) => 0,
        Insn::IConst(value) => match *value {
            -1..=5 => 1,
            byte if i8::try_from(byte).is_ok() => 2,
            short if i16::try_from(short).is_ok() => 3,
            other => return Err(AsmError::ImmediateOutOfRange(other)),
        },
        Insn::Ldc(index) => {
            if *index <= u16::from(u8::MAX) {
                2
            } else {
                3
            }
        }
        Insn::ILoad(local) | Insn::IStore(local) => {
            if *local <= 3 {
                1
            } else {
                2
            }
        }
        Insn::ALoad0 | Insn::IAdd | Insn::ISub | Insn::IReturn | Insn::Return => 1,
        Insn::Goto(_)
        | Insn::GetStatic(_)
        | Insn::InvokeVirtual(_)
        | Insn::InvokeSpecial(_)
        | Insn::InvokeStatic(_) => 3,
        Insn::TableSwitch { targets, .. } => {
            1 + switch_padding(pc) as usize + 12 + 4 * targets.len()
        }
        Insn::LookupSwitch { pairs, .. } => 1 + switch_padding(pc) as usize + 8 + 8 * pairs.len(),
    };
    Ok(len)
}

fn resolve(labels: &FxHashMap<Label, u32>, label: Label) -> Result<u32, AsmError> {
    labels
        .get(&label)
        .copied()
        .ok_or(AsmError::UndefinedLabel(label))
}

fn offset(labels: &FxHashMap<Label, u32>, base: u32, label: Label) -> Result<i32, AsmError> {
    let target = resolve(labels, label)?;
    Ok((i64::from(target) - i64::from(base)) as i32)
}

fn emit(code: &mut Vec<u8>, insn: &Insn, labels: &FxHashMap<Label, u32>) -> Result<(), AsmError> {
    let base = code.len() as u32;
    match insn {
        Insn::Label(_) => {}
        Insn::IConst(value) => match *value {
            -1 => code.push(Opcode::IconstM1.byte()),
            0..=5 => code.push(Opcode::Iconst0.byte() + *value as u8),
            other => {
                if let Ok(byte) = i8::try_from(other) {
                    code.push(Opcode::Bipush.byte());
                    code.extend_from_slice(&byte.to_be_bytes());
                } else if let Ok(short) = i16::try_from(other) {
                    code.push(Opcode::Sipush.byte());
                    code.extend_from_slice(&short.to_be_bytes());
                } else {
                    return Err(AsmError::ImmediateOutOfRange(other));
                }
            }
        },
        Insn::Ldc(index) => {
            if let Ok(narrow) = u8::try_from(*index) {
                code.extend_from_slice(&[Opcode::Ldc.byte(), narrow]);
            } else {
                code.push(Opcode::LdcW.byte());
                code.extend_from_slice(&index.to_be_bytes());
            }
        }
        Insn::ILoad(local) => emit_local(code, Opcode::Iload, Opcode::Iload0, *local),
        Insn::IStore(local) => emit_local(code, Opcode::Istore, Opcode::Istore0, *local),
        Insn::ALoad0 => code.push(Opcode::Aload0.byte()),
        Insn::IAdd => code.push(Opcode::Iadd.byte()),
        Insn::ISub => code.push(Opcode::Isub.byte()),
        Insn::IReturn => code.push(Opcode::Ireturn.byte()),
        Insn::Return => code.push(Opcode::Return.byte()),
        Insn::Goto(label) => {
            let to = resolve(labels, *label)?;
            let delta = i16::try_from(offset(labels, base, *label)?)
                .map_err(|_| AsmError::BranchTooFar { from: base, to })?;
            code.push(Opcode::Goto.byte());
            code.extend_from_slice(&delta.to_be_bytes());
        }
        Insn::GetStatic(index) => emit_pool(code, Opcode::Getstatic, *index),
        Insn::InvokeVirtual(index) => emit_pool(code, Opcode::Invokevirtual, *index),
        Insn::InvokeSpecial(index) => emit_pool(code, Opcode::Invokespecial, *index),
        Insn::InvokeStatic(index) => emit_pool(code, Opcode::Invokestatic, *index),
        Insn::TableSwitch {
            low,
            high,
            default,
            targets,
        } => {
            emit_switch_header(code, Opcode::Tableswitch, base);
            emit_i32(code, offset(labels, base, *default)?);
            emit_i32(code, *low);
            emit_i32(code, *high);
            for target in targets {
                emit_i32(code, offset(labels, base, *target)?);
            }
        }
        Insn::LookupSwitch { default, pairs } => {
            emit_switch_header(code, Opcode::Lookupswitch, base);
            emit_i32(code, offset(labels, base, *default)?);
            emit_i32(code, pairs.len() as i32);
            for (key, target) in pairs {
                emit_i32(code, *key);
                emit_i32(code, offset(labels, base, *target)?);
            }
        }
    }
    Ok(())
}

fn emit_local(code: &mut Vec<u8>, wide: Opcode, short_base: Opcode, local: u8) {
    if local <= 3 {
        code.push(short_base.byte() + local);
    } else {
        code.extend_from_slice(&[wide.byte(), local]);
    }
}

fn emit_pool(code: &mut Vec<u8>, opcode: Opcode, index: u16) {
    code.push(opcode.byte());
    code.extend_from_slice(&index.to_be_bytes());
}

fn emit_switch_header(code: &mut Vec<u8>, opcode: Opcode, base: u32) {
    code.push(opcode.byte());
    for _ in 0..switch_padding(base) {
        code.push(0);
    }
}

fn emit_i32(code: &mut Vec<u8>, value: i32) {
    code.extend_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iconst_encodings() {
        let code = assemble(&[
            Insn::IConst(-1),
            Insn::IConst(3),
            Insn::IConst(-2),
            Insn::IConst(300),
        ])
        .unwrap();
        assert_eq!(code, vec![0x02, 0x06, 0x10, 0xfe, 0x11, 0x01, 0x2c]);
    }

    #[test]
    fn test_immediate_out_of_range() {
        assert_eq!(
            assemble(&[Insn::IConst(40_000)]),
            Err(AsmError::ImmediateOutOfRange(40_000))
        );
    }

    #[test]
    fn test_tableswitch_padding_and_offsets() {
        let mut asm = Assembler::new();
        let (zero, one, other) = (asm.new_label(), asm.new_label(), asm.new_label());
        asm.push(Insn::ILoad(0))
            .push(Insn::TableSwitch {
                low: 0,
                high: 1,
                default: other,
                targets: vec![zero, one],
            })
            .bind(zero)
            .push(Insn::IConst(0))
            .push(Insn::IReturn)
            .bind(one)
            .push(Insn::IConst(1))
            .push(Insn::IReturn)
            .bind(other)
            .push(Insn::IConst(-1))
            .push(Insn::IReturn);
        let code = asm.finish().unwrap();

        // iload_0 at 0, tableswitch at 1, two padding bytes, operands at 4
        assert_eq!(&code[..4], &[0x1a, 0xaa, 0, 0]);
        // default, low, high
        assert_eq!(&code[4..8], &27i32.to_be_bytes());
        assert_eq!(&code[8..12], &0i32.to_be_bytes());
        assert_eq!(&code[12..16], &1i32.to_be_bytes());
        // targets for 0 and 1, relative to the opcode at pc 1
        assert_eq!(&code[16..20], &23i32.to_be_bytes());
        assert_eq!(&code[20..24], &25i32.to_be_bytes());
        assert_eq!(code.len(), 30);
    }

    #[test]
    fn test_lookupswitch_layout() {
        let mut asm = Assembler::new();
        let (hit, miss) = (asm.new_label(), asm.new_label());
        asm.push(Insn::LookupSwitch {
            default: miss,
            pairs: vec![(-5, hit), (100, hit)],
        })
        .bind(hit)
        .push(Insn::Return)
        .bind(miss)
        .push(Insn::Return);
        let code = asm.finish().unwrap();

        assert_eq!(&code[..4], &[0xab, 0, 0, 0]);
        assert_eq!(&code[8..12], &2i32.to_be_bytes());
        assert_eq!(&code[12..16], &(-5i32).to_be_bytes());
        assert_eq!(&code[16..20], &28i32.to_be_bytes());
        assert_eq!(&code[4..8], &29i32.to_be_bytes());
        assert_eq!(code.len(), 30);
    }

    #[test]
    fn test_backward_goto() {
        let mut asm = Assembler::new();
        let top = asm.new_label();
        asm.bind(top).push(Insn::IConst(1)).push(Insn::Goto(top));
        let code = asm.finish().unwrap();
        assert_eq!(code, vec![0x04, 0xa7, 0xff, 0xff]);
    }

    #[test]
    fn test_label_errors() {
        assert_eq!(
            assemble(&[Insn::Goto(Label(7))]),
            Err(AsmError::UndefinedLabel(Label(7)))
        );
        assert_eq!(
            assemble(&[Insn::Label(Label(1)), Insn::Label(Label(1))]),
            Err(AsmError::DuplicateLabel(Label(1)))
        );
    }

    #[test]
    fn test_malformed_switches() {
        let label = Label(0);
        assert_eq!(
            assemble(&[Insn::TableSwitch {
                low: 3,
                high: 1,
                default: label,
                targets: Vec::new(),
            }]),
            Err(AsmError::EmptyTableRange { low: 3, high: 1 })
        );
        assert_eq!(
            assemble(&[Insn::TableSwitch {
                low: 0,
                high: 2,
                default: label,
                targets: vec![label],
            }]),
            Err(AsmError::TableTargetCount {
                expected: 3,
                got: 1
            })
        );
        assert_eq!(
            assemble(&[Insn::LookupSwitch {
                default: label,
                pairs: vec![(4, label), (4, label)],
            }]),
            Err(AsmError::UnsortedLookupKeys {
                previous: 4,
                key: 4
            })
        );
    }

    #[test]
    fn test_code_too_large() {
        let label = Label(0);
        // 1 opcode + 3 padding + 12 header + 4 * 16_384 targets
        let huge = Insn::TableSwitch {
            low: 0,
            high: 16_383,
            default: label,
            targets: vec![label; 16_384],
        };
        assert_eq!(
            assemble(&[huge, Insn::Label(label), Insn::Return]),
            Err(AsmError::CodeTooLarge(65_552))
        );

        let mut asm = Assembler::new();
        for _ in 0..21_845 {
            asm.push(Insn::IConst(300));
        }
        assert_eq!(asm.finish().map(|code| code.len()), Ok(65_535));
        asm.push(Insn::Return);
        assert_eq!(asm.finish(), Err(AsmError::CodeTooLarge(65_536)));
    }

    #[test]
    fn test_wide_pool_and_local_forms() {
        let code = assemble(&[Insn::Ldc(300), Insn::ILoad(9), Insn::IStore(2)]).unwrap();
        assert_eq!(code, vec![0x13, 0x01, 0x2c, 0x15, 9, 0x3d]);
    }
}
