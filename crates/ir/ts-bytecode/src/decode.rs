//! Decoding code bytes back into instructions
//!
//! [`decode_at`] is shared by the disassembler and the interpreter, so both
//! read switch padding and base-relative offsets the same way.

use crate::constant_pool::PoolIndex;
use crate::insn::switch_padding;
use crate::opcode::Opcode;
use serde::Serialize;
use thiserror::Error;

/// Decoder error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// `pc` does not address a byte of the code
    #[error("pc {0} is outside the code")]
    PcOutOfBounds(u32),
    /// Byte at `pc` is not a supported opcode
    #[error("unknown opcode 0x{byte:02x} at pc {pc}")]
    UnknownOpcode {
        /// Offending pc
        pc: u32,
        /// The byte found there
        byte: u8,
    },
    /// Operands run past the end of the code
    #[error("truncated {opcode} at pc {pc}")]
    Truncated {
        /// Instruction pc
        pc: u32,
        /// Instruction being decoded
        opcode: Opcode,
    },
    /// A branch offset points before the start of the code
    #[error("branch at pc {pc} has offset {offset} before the start of the code")]
    NegativeTarget {
        /// Instruction pc
        pc: u32,
        /// Relative offset
        offset: i32,
    },
    /// `tableswitch` with `high < low`
    #[error("tableswitch at pc {pc} has empty range {low}..={high}")]
    EmptyTableRange {
        /// Instruction pc
        pc: u32,
        /// Lowest key
        low: i32,
        /// Highest key
        high: i32,
    },
    /// `lookupswitch` with a negative pair count
    #[error("lookupswitch at pc {pc} has negative pair count {npairs}")]
    NegativePairCount {
        /// Instruction pc
        pc: u32,
        /// Pair count read from the code
        npairs: i32,
    },
    /// `lookupswitch` keys not strictly ascending
    #[error("lookupswitch at pc {pc} has key {key} after {previous}")]
    UnsortedLookupKeys {
        /// Instruction pc
        pc: u32,
        /// Preceding key
        previous: i32,
        /// Offending key
        key: i32,
    },
}

/// Decoded operands, with branch targets made absolute
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operands {
    /// No operands
    None,
    /// Immediate int
    Int {
        /// Value
        value: i32,
    },
    /// Local variable slot
    Local {
        /// Slot index
        index: u8,
    },
    /// Constant pool reference
    Pool {
        /// Pool index
        index: PoolIndex,
    },
    /// Branch target
    Branch {
        /// Absolute target pc
        target: u32,
    },
    /// `tableswitch` operands
    Table {
        /// Lowest key
        low: i32,
        /// Highest key
        high: i32,
        /// Absolute default target
        default: u32,
        /// Absolute target per key in `low..=high`
        targets: Vec<u32>,
    },
    /// `lookupswitch` operands
    Lookup {
        /// Absolute default target
        default: u32,
        /// Key and absolute target pairs
        pairs: Vec<(i32, u32)>,
    },
}

/// One decoded instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decoded {
    /// Address of the opcode byte
    pub pc: u32,
    /// Encoded length including padding
    pub len: u32,
    /// The opcode
    pub opcode: Opcode,
    /// Its operands
    pub operands: Operands,
}

impl Decoded {
    /// Address of the following instruction
    #[must_use]
    pub const fn next_pc(&self) -> u32 {
        self.pc + self.len
    }

    /// Resolve the target for a switch key
    ///
    /// Returns `None` if this is not a switch instruction.
    #[must_use]
    pub fn switch_target(&self, key: i32) -> Option<u32> {
        match &self.operands {
            Operands::Table {
                low,
                high,
                default,
                targets,
            } => {
                if (*low..=*high).contains(&key) {
                    let slot = (i64::from(key) - i64::from(*low)) as usize;
                    targets.get(slot).copied().or(Some(*default))
                } else {
                    Some(*default)
                }
            }
            Operands::Lookup { default, pairs } => Some(
                pairs
                    .binary_search_by_key(&key, |&(case, _)| case)
                    .map_or(*default, |slot| pairs[slot].1),
            ),
            _ => None,
        }
    }
}

struct Reader<'code> {
    code: &'code [u8],
    start: u32,
    cursor: usize,
    opcode: Opcode,
}

impl Reader<'_> {
    fn truncated(&self) -> DecodeError {
        DecodeError::Truncated {
            pc: self.start,
            opcode: self.opcode,
        }
    }

    fn bytes<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.cursor + N;
        let slice = self.code.get(self.cursor..end).ok_or_else(|| self.truncated())?;
        self.cursor = end;
        let mut out = [0; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.bytes::<1>()?[0])
    }

    fn i8(&mut self) -> Result<i8, DecodeError> {
        Ok(i8::from_be_bytes(self.bytes()?))
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.bytes()?))
    }

    fn i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_be_bytes(self.bytes()?))
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.bytes()?))
    }

    fn skip(&mut self, count: u32) -> Result<(), DecodeError> {
        let end = self.cursor + count as usize;
        if end > self.code.len() {
            return Err(self.truncated());
        }
        self.cursor = end;
        Ok(())
    }

    fn target(&self, offset: i32) -> Result<u32, DecodeError> {
        u32::try_from(i64::from(self.start) + i64::from(offset)).map_err(|_| {
            DecodeError::NegativeTarget {
                pc: self.start,
                offset,
            }
        })
    }
}

/// Decode the instruction starting at `pc`
///
/// # Errors
///
/// Returns `DecodeError` if the opcode is unknown, the operands are
/// truncated, or a branch lands before the start of the code
pub fn decode_at(code: &[u8], pc: u32) -> Result<Decoded, DecodeError> {
    let byte = *code.get(pc as usize).ok_or(DecodeError::PcOutOfBounds(pc))?;
    let opcode = Opcode::from_byte(byte).ok_or(DecodeError::UnknownOpcode { pc, byte })?;
    let mut reader = Reader {
        code,
        start: pc,
        cursor: pc as usize + 1,
        opcode,
    };

    let operands = match opcode {
        Opcode::IconstM1
        | Opcode::Iconst0
        | Opcode::Iconst1
        | Opcode::Iconst2
        | Opcode::Iconst3
        | Opcode::Iconst4
        | Opcode::Iconst5 => Operands::Int {
            value: i32::from(byte) - i32::from(Opcode::Iconst0.byte()),
        },
        Opcode::Bipush => Operands::Int {
            value: i32::from(reader.i8()?),
        },
        Opcode::Sipush => Operands::Int {
            value: i32::from(reader.i16()?),
        },
        Opcode::Ldc => Operands::Pool {
            index: PoolIndex::from(reader.u8()?),
        },
        Opcode::LdcW
        | Opcode::Getstatic
        | Opcode::Invokevirtual
        | Opcode::Invokespecial
        | Opcode::Invokestatic => Operands::Pool {
            index: reader.u16()?,
        },
        Opcode::Iload | Opcode::Istore => Operands::Local { index: reader.u8()? },
        Opcode::Iload0 | Opcode::Iload1 | Opcode::Iload2 | Opcode::Iload3 => Operands::Local {
            index: byte - Opcode::Iload0.byte(),
        },
        Opcode::Istore0 | Opcode::Istore1 | Opcode::Istore2 | Opcode::Istore3 => {
            Operands::Local {
                index: byte - Opcode::Istore0.byte(),
            }
        }
        Opcode::Aload0 | Opcode::Iadd | Opcode::Isub | Opcode::Ireturn | Opcode::Return => {
            Operands::None
        }
        Opcode::Goto => {
            let offset = i32::from(reader.i16()?);
            Operands::Branch {
                target: reader.target(offset)?,
            }
        }
        Opcode::Tableswitch => {
            reader.skip(switch_padding(pc))?;
            let default = reader.i32()?;
            let low = reader.i32()?;
            let high = reader.i32()?;
            if high < low {
                return Err(DecodeError::EmptyTableRange { pc, low, high });
            }
            let count = i64::from(high) - i64::from(low) + 1;
            if count as usize > code.len() / 4 {
                return Err(reader.truncated());
            }
            let mut targets = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let offset = reader.i32()?;
                targets.push(reader.target(offset)?);
            }
            Operands::Table {
                low,
                high,
                default: reader.target(default)?,
                targets,
            }
        }
        Opcode::Lookupswitch => {
            reader.skip(switch_padding(pc))?;
            let default = reader.i32()?;
            let npairs = reader.i32()?;
            let count =
                usize::try_from(npairs).map_err(|_| DecodeError::NegativePairCount { pc, npairs })?;
            if count > code.len() / 8 {
                return Err(reader.truncated());
            }
            let mut pairs: Vec<(i32, u32)> = Vec::with_capacity(count);
            for _ in 0..count {
                let key = reader.i32()?;
                let offset = reader.i32()?;
                if let Some(&(previous, _)) = pairs.last()
                    && key <= previous
                {
                    return Err(DecodeError::UnsortedLookupKeys { pc, previous, key });
                }
                pairs.push((key, reader.target(offset)?));
            }
            Operands::Lookup {
                default: reader.target(default)?,
                pairs,
            }
        }
    };

    Ok(Decoded {
        pc,
        len: (reader.cursor - pc as usize) as u32,
        opcode,
        operands,
    })
}

/// Decode an entire code array
///
/// # Errors
///
/// Returns the first `DecodeError` encountered
pub fn decode(code: &[u8]) -> Result<Vec<Decoded>, DecodeError> {
    let mut decoded = Vec::new();
    let mut pc = 0;
    while (pc as usize) < code.len() {
        let insn = decode_at(code, pc)?;
        pc = insn.next_pc();
        decoded.push(insn);
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::Assembler;
    use crate::insn::Insn;

    #[test]
    fn test_decode_simple_sequence() {
        let decoded = decode(&[0x02, 0x10, 0xfe, 0x1b, 0xac]).unwrap();
        let ops: Vec<_> = decoded.iter().map(|insn| (insn.pc, insn.opcode)).collect();
        assert_eq!(
            ops,
            vec![
                (0, Opcode::IconstM1),
                (1, Opcode::Bipush),
                (3, Opcode::Iload1),
                (4, Opcode::Ireturn),
            ]
        );
        assert_eq!(decoded[0].operands, Operands::Int { value: -1 });
        assert_eq!(decoded[1].operands, Operands::Int { value: -2 });
        assert_eq!(decoded[2].operands, Operands::Local { index: 1 });
    }

    #[test]
    fn test_decode_tableswitch_targets() {
        let mut asm = Assembler::new();
        let labels: Vec<_> = (0..4).map(|_| asm.new_label()).collect();
        asm.push(Insn::ILoad(0)).push(Insn::TableSwitch {
            low: 10,
            high: 12,
            default: labels[3],
            targets: labels[..3].to_vec(),
        });
        for (value, label) in labels.iter().enumerate() {
            asm.bind(*label)
                .push(Insn::IConst(value as i32))
                .push(Insn::IReturn);
        }
        let code = asm.finish().unwrap();
        let decoded = decode(&code).unwrap();
        let switch = &decoded[1];

        assert_eq!(switch.pc, 1);
        assert_eq!(switch.len, 1 + 2 + 12 + 12);
        assert_eq!(
            switch.operands,
            Operands::Table {
                low: 10,
                high: 12,
                default: 34,
                targets: vec![28, 30, 32],
            }
        );
        assert_eq!(switch.switch_target(11), Some(30));
        assert_eq!(switch.switch_target(9), Some(34));
        assert_eq!(switch.switch_target(13), Some(34));
        assert_eq!(switch.switch_target(i32::MIN), Some(34));
        assert_eq!(decoded[0].switch_target(0), None);
    }

    #[test]
    fn test_lookup_target_uses_default_for_misses() {
        let decoded = Decoded {
            pc: 0,
            len: 0,
            opcode: Opcode::Lookupswitch,
            operands: Operands::Lookup {
                default: 99,
                pairs: vec![(-7, 10), (0, 20), (1000, 30)],
            },
        };
        assert_eq!(decoded.switch_target(-7), Some(10));
        assert_eq!(decoded.switch_target(1000), Some(30));
        assert_eq!(decoded.switch_target(1), Some(99));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode_at(&[0xb1], 1), Err(DecodeError::PcOutOfBounds(1)));
        assert_eq!(
            decode(&[0xfe]),
            Err(DecodeError::UnknownOpcode { pc: 0, byte: 0xfe })
        );
        assert_eq!(
            decode(&[0x11, 0x01]),
            Err(DecodeError::Truncated {
                pc: 0,
                opcode: Opcode::Sipush
            })
        );
        assert_eq!(
            decode(&[0x03, 0xa7, 0xff, 0xf0]),
            Err(DecodeError::NegativeTarget { pc: 1, offset: -16 })
        );
        // tableswitch at 3 (no padding) with low=2, high=1
        let mut code = vec![0x03, 0x03, 0x03, 0xaa];
        for word in [0i32, 2, 1] {
            code.extend_from_slice(&word.to_be_bytes());
        }
        assert_eq!(
            decode(&code),
            Err(DecodeError::EmptyTableRange {
                pc: 3,
                low: 2,
                high: 1
            })
        );
    }

    fn lookupswitch_bytes(default: i32, pairs: &[(i32, i32)]) -> Vec<u8> {
        // lookupswitch at pc 0, three padding bytes
        let mut code = vec![0xab, 0, 0, 0];
        code.extend_from_slice(&default.to_be_bytes());
        code.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
        for (key, offset) in pairs {
            code.extend_from_slice(&key.to_be_bytes());
            code.extend_from_slice(&offset.to_be_bytes());
        }
        code
    }

    #[test]
    fn test_lookupswitch_keys_must_ascend() {
        let code = lookupswitch_bytes(100, &[(9, 40), (1, 60), (5, 80)]);
        assert_eq!(
            decode_at(&code, 0),
            Err(DecodeError::UnsortedLookupKeys {
                pc: 0,
                previous: 9,
                key: 1
            })
        );

        let repeated = lookupswitch_bytes(100, &[(3, 40), (3, 60)]);
        assert_eq!(
            decode_at(&repeated, 0),
            Err(DecodeError::UnsortedLookupKeys {
                pc: 0,
                previous: 3,
                key: 3
            })
        );

        let sorted = lookupswitch_bytes(100, &[(1, 60), (5, 80), (9, 40)]);
        let insn = decode_at(&sorted, 0).unwrap();
        assert_eq!(insn.switch_target(9), Some(40));
        assert_eq!(insn.switch_target(1), Some(60));
        assert_eq!(insn.switch_target(2), Some(100));
    }

    #[test]
    fn test_negative_pair_count() {
        let mut code = vec![0xab, 0, 0, 0];
        code.extend_from_slice(&8i32.to_be_bytes());
        code.extend_from_slice(&(-1i32).to_be_bytes());
        assert_eq!(
            decode_at(&code, 0),
            Err(DecodeError::NegativePairCount { pc: 0, npairs: -1 })
        );
    }

    #[test]
    fn test_truncated_switch_tables() {
        // two pairs announced, one present
        let mut lookup = lookupswitch_bytes(100, &[(1, 60), (2, 70)]);
        lookup.truncate(lookup.len() - 8);
        assert_eq!(
            decode_at(&lookup, 0),
            Err(DecodeError::Truncated {
                pc: 0,
                opcode: Opcode::Lookupswitch
            })
        );

        // three targets announced, two present
        let mut table = vec![0xaa, 0, 0, 0];
        for word in [20i32, 0, 2, 20, 20] {
            table.extend_from_slice(&word.to_be_bytes());
        }
        assert_eq!(
            decode_at(&table, 0),
            Err(DecodeError::Truncated {
                pc: 0,
                opcode: Opcode::Tableswitch
            })
        );

        // padding cut short
        assert_eq!(
            decode_at(&[0x03, 0xaa, 0], 1),
            Err(DecodeError::Truncated {
                pc: 1,
                opcode: Opcode::Tableswitch
            })
        );
    }
}
