//! Runtime value representation

use std::fmt;

/// Objects provided by the host rather than by loaded classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeObject {
    /// `System.out`
    StdOut,
    /// `System.err`
    StdErr,
}

/// Runtime value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// JVM int (also carries boolean, byte, char and short)
    Int(i32),
    /// String reference
    Str(String),
    /// Host object reference
    Native(NativeObject),
    /// The null reference
    Null,
}

impl Value {
    /// Get the value as an int, if possible
    #[must_use]
    pub const fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Short name of the value's kind, for error messages
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::Native(_) => "native object",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for Value {
    #[allow(clippy::min_ident_chars, reason = "`f` matches the `Display` signature")]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(text) => f.write_str(text),
            Self::Native(NativeObject::StdOut) => f.write_str("System.out"),
            Self::Native(NativeObject::StdErr) => f.write_str("System.err"),
            Self::Null => f.write_str("null"),
        }
    }
}
