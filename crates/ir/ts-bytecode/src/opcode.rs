//! JVM opcodes understood by the assembler, decoder and interpreter

use serde::Serialize;
use std::fmt;

/// A supported JVM opcode
///
/// Discriminants are the JVM opcode bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Opcode {
    /// Push int constant -1
    IconstM1 = 0x02,
    /// Push int constant 0
    Iconst0 = 0x03,
    /// Push int constant 1
    Iconst1 = 0x04,
    /// Push int constant 2
    Iconst2 = 0x05,
    /// Push int constant 3
    Iconst3 = 0x06,
    /// Push int constant 4
    Iconst4 = 0x07,
    /// Push int constant 5
    Iconst5 = 0x08,
    /// Push a sign-extended byte
    Bipush = 0x10,
    /// Push a sign-extended short
    Sipush = 0x11,
    /// Push a constant from the pool (u8 index)
    Ldc = 0x12,
    /// Push a constant from the pool (u16 index)
    LdcW = 0x13,
    /// Load int from a local
    Iload = 0x15,
    /// Load int from local 0
    Iload0 = 0x1a,
    /// Load int from local 1
    Iload1 = 0x1b,
    /// Load int from local 2
    Iload2 = 0x1c,
    /// Load int from local 3
    Iload3 = 0x1d,
    /// Load reference from local 0
    Aload0 = 0x2a,
    /// Store int into a local
    Istore = 0x36,
    /// Store int into local 0
    Istore0 = 0x3b,
    /// Store int into local 1
    Istore1 = 0x3c,
    /// Store int into local 2
    Istore2 = 0x3d,
    /// Store int into local 3
    Istore3 = 0x3e,
    /// Add two ints
    Iadd = 0x60,
    /// Subtract two ints
    Isub = 0x64,
    /// Unconditional branch
    Goto = 0xa7,
    /// Jump table indexed by a dense key range
    Tableswitch = 0xaa,
    /// Jump table matched by sorted keys
    Lookupswitch = 0xab,
    /// Return int from method
    Ireturn = 0xac,
    /// Return void from method
    Return = 0xb1,
    /// Read a static field
    Getstatic = 0xb2,
    /// Invoke an instance method
    Invokevirtual = 0xb6,
    /// Invoke a constructor or private method
    Invokespecial = 0xb7,
    /// Invoke a static method
    Invokestatic = 0xb8,
}

impl Opcode {
    /// Every supported opcode, in byte order
    pub const ALL: [Self; 33] = [
        Self::IconstM1,
        Self::Iconst0,
        Self::Iconst1,
        Self::Iconst2,
        Self::Iconst3,
        Self::Iconst4,
        Self::Iconst5,
        Self::Bipush,
        Self::Sipush,
        Self::Ldc,
        Self::LdcW,
        Self::Iload,
        Self::Iload0,
        Self::Iload1,
        Self::Iload2,
        Self::Iload3,
        Self::Aload0,
        Self::Istore,
        Self::Istore0,
        Self::Istore1,
        Self::Istore2,
        Self::Istore3,
        Self::Iadd,
        Self::Isub,
        Self::Goto,
        Self::Tableswitch,
        Self::Lookupswitch,
        Self::Ireturn,
        Self::Return,
        Self::Getstatic,
        Self::Invokevirtual,
        Self::Invokespecial,
        Self::Invokestatic,
    ];

    /// Look up the opcode for a raw byte
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| *op as u8 == byte)
    }

    /// The raw opcode byte
    #[must_use]
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// The javap mnemonic
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::IconstM1 => "iconst_m1",
            Self::Iconst0 => "iconst_0",
            Self::Iconst1 => "iconst_1",
            Self::Iconst2 => "iconst_2",
            Self::Iconst3 => "iconst_3",
            Self::Iconst4 => "iconst_4",
            Self::Iconst5 => "iconst_5",
            Self::Bipush => "bipush",
            Self::Sipush => "sipush",
            Self::Ldc => "ldc",
            Self::LdcW => "ldc_w",
            Self::Iload => "iload",
            Self::Iload0 => "iload_0",
            Self::Iload1 => "iload_1",
            Self::Iload2 => "iload_2",
            Self::Iload3 => "iload_3",
            Self::Aload0 => "aload_0",
            Self::Istore => "istore",
            Self::Istore0 => "istore_0",
            Self::Istore1 => "istore_1",
            Self::Istore2 => "istore_2",
            Self::Istore3 => "istore_3",
            Self::Iadd => "iadd",
            Self::Isub => "isub",
            Self::Goto => "goto",
            Self::Tableswitch => "tableswitch",
            Self::Lookupswitch => "lookupswitch",
            Self::Ireturn => "ireturn",
            Self::Return => "return",
            Self::Getstatic => "getstatic",
            Self::Invokevirtual => "invokevirtual",
            Self::Invokespecial => "invokespecial",
            Self::Invokestatic => "invokestatic",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_byte(byte).ok_or(byte)
    }
}

impl fmt::Display for Opcode {
    #[allow(clippy::min_ident_chars, reason = "`f` matches the `Display` signature")]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_round_trip_covers_all() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_byte(op.byte()), Some(op));
        }
    }

    #[test]
    fn test_unknown_byte() {
        assert_eq!(Opcode::try_from(0xff), Err(0xff));
        assert_eq!(Opcode::from_byte(0x00), None);
    }

    #[test]
    fn test_switch_opcode_bytes() {
        assert_eq!(Opcode::Tableswitch.byte(), 0xaa);
        assert_eq!(Opcode::Lookupswitch.byte(), 0xab);
        assert_eq!(Opcode::Tableswitch.to_string(), "tableswitch");
    }
}
