//! Method descriptor parsing, e.g. `(I)I` or `([Ljava/lang/String;)V`

use std::fmt;
use thiserror::Error;

/// Descriptor parse error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// Descriptor does not start with `(`
    #[error("method descriptor `{0}` must start with `(`")]
    MissingParameters(String),
    /// Unknown type character or truncated input
    #[error("malformed type in descriptor `{descriptor}` at byte {offset}")]
    MalformedType {
        /// The full descriptor
        descriptor: String,
        /// Offset of the bad type
        offset: usize,
    },
    /// Trailing input after the return type
    #[error("trailing characters in descriptor `{0}`")]
    Trailing(String),
}

/// A field type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `D`
    Double,
    /// `F`
    Float,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `S`
    Short,
    /// `Z`
    Boolean,
    /// `Lname;`
    Object(String),
    /// `[component`
    Array(Box<FieldType>),
}

impl FieldType {
    /// Whether values of this type live on the stack as a JVM int
    #[must_use]
    pub fn is_int_like(&self) -> bool {
        matches!(
            self,
            Self::Byte | Self::Char | Self::Int | Self::Short | Self::Boolean
        )
    }

    /// Whether this type is a reference (object or array)
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_))
    }
}

impl fmt::Display for FieldType {
    #[allow(clippy::min_ident_chars, reason = "`f` matches the `Display` signature")]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte => f.write_str("B"),
            Self::Char => f.write_str("C"),
            Self::Double => f.write_str("D"),
            Self::Float => f.write_str("F"),
            Self::Int => f.write_str("I"),
            Self::Long => f.write_str("J"),
            Self::Short => f.write_str("S"),
            Self::Boolean => f.write_str("Z"),
            Self::Object(name) => write!(f, "L{name};"),
            Self::Array(component) => write!(f, "[{component}"),
        }
    }
}

/// A parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub params: Vec<FieldType>,
    /// Return type, `None` for `V`
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parse a method descriptor
    ///
    /// # Errors
    ///
    /// Returns `DescriptorError` if the descriptor is malformed
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let bytes = descriptor.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(DescriptorError::MissingParameters(descriptor.to_owned()));
        }

        let mut offset = 1;
        let mut params = Vec::new();
        while bytes.get(offset) != Some(&b')') {
            let (ty, next) = parse_field(descriptor, offset)?;
            params.push(ty);
            offset = next;
        }
        offset += 1;

        let ret = if bytes.get(offset) == Some(&b'V') {
            offset += 1;
            None
        } else {
            let (ty, next) = parse_field(descriptor, offset)?;
            offset = next;
            Some(ty)
        };

        if offset != bytes.len() {
            return Err(DescriptorError::Trailing(descriptor.to_owned()));
        }
        Ok(Self { params, ret })
    }
}

impl fmt::Display for MethodDescriptor {
    #[allow(clippy::min_ident_chars, reason = "`f` matches the `Display` signature")]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{param}")?;
        }
        f.write_str(")")?;
        match &self.ret {
            Some(ret) => write!(f, "{ret}"),
            None => f.write_str("V"),
        }
    }
}

fn parse_field(descriptor: &str, offset: usize) -> Result<(FieldType, usize), DescriptorError> {
    let malformed = || DescriptorError::MalformedType {
        descriptor: descriptor.to_owned(),
        offset,
    };
    let tag = *descriptor.as_bytes().get(offset).ok_or_else(malformed)?;
    let ty = match tag {
        b'B' => FieldType::Byte,
        b'C' => FieldType::Char,
        b'D' => FieldType::Double,
        b'F' => FieldType::Float,
        b'I' => FieldType::Int,
        b'J' => FieldType::Long,
        b'S' => FieldType::Short,
        b'Z' => FieldType::Boolean,
        b'L' => {
            let rest = descriptor.get(offset + 1..).ok_or_else(malformed)?;
            let end = rest.find(';').ok_or_else(malformed)?;
            if end == 0 {
                return Err(malformed());
            }
            return Ok((FieldType::Object(rest[..end].to_owned()), offset + end + 2));
        }
        b'[' => {
            let (component, next) = parse_field(descriptor, offset + 1)?;
            return Ok((FieldType::Array(Box::new(component)), next));
        }
        _ => return Err(malformed()),
    };
    Ok((ty, offset + 1))
}
