//! Class constant pool
//!
//! Indices are 1-based as in the class file format. `Long` and `Double`
//! entries take two slots. Adding an entry that is already present returns
//! the existing index.

use rustc_hash::FxHashMap;
use std::fmt;
use thiserror::Error;

/// Constant pool index
pub type PoolIndex = u16;

/// Most slots a pool can hold, since `constant_pool_count` is a `u2`
pub const MAX_POOL_SLOTS: usize = 65_534;

/// Constant pool error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Adding the entry would overflow the pool
    #[error("constant pool is full ({MAX_POOL_SLOTS} slots)")]
    Full,
}

/// A single constant pool entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Modified UTF-8 text
    Utf8(String),
    /// 32-bit int
    Integer(i32),
    /// 32-bit float, as raw bits
    Float(u32),
    /// 64-bit long
    Long(i64),
    /// 64-bit double, as raw bits
    Double(u64),
    /// Class reference, pointing at its `Utf8` name
    Class {
        /// Name index
        name: PoolIndex,
    },
    /// String literal, pointing at its `Utf8` text
    String {
        /// Text index
        utf8: PoolIndex,
    },
    /// Member name and descriptor pair
    NameAndType {
        /// Name index
        name: PoolIndex,
        /// Descriptor index
        descriptor: PoolIndex,
    },
    /// Field reference
    FieldRef {
        /// Owning class index
        class: PoolIndex,
        /// Name and type index
        name_and_type: PoolIndex,
    },
    /// Method reference
    MethodRef {
        /// Owning class index
        class: PoolIndex,
        /// Name and type index
        name_and_type: PoolIndex,
    },
    /// Interface method reference
    InterfaceMethodRef {
        /// Owning interface index
        class: PoolIndex,
        /// Name and type index
        name_and_type: PoolIndex,
    },
    /// Method handle
    MethodHandle {
        /// Reference kind, 1 to 9
        kind: u8,
        /// Referenced member index
        reference: PoolIndex,
    },
    /// Method type, pointing at its descriptor
    MethodType {
        /// Descriptor index
        descriptor: PoolIndex,
    },
    /// Dynamically computed constant
    Dynamic {
        /// Bootstrap method attribute index
        bootstrap: u16,
        /// Name and type index
        name_and_type: PoolIndex,
    },
    /// Dynamically computed call site
    InvokeDynamic {
        /// Bootstrap method attribute index
        bootstrap: u16,
        /// Name and type index
        name_and_type: PoolIndex,
    },
    /// Unusable slot following a `Long` or `Double`
    Reserved,
}

impl Constant {
    /// Class file tag byte, `None` for [`Constant::Reserved`]
    #[must_use]
    pub const fn tag(&self) -> Option<u8> {
        match self {
            Self::Utf8(_) => Some(1),
            Self::Integer(_) => Some(3),
            Self::Float(_) => Some(4),
            Self::Long(_) => Some(5),
            Self::Double(_) => Some(6),
            Self::Class { .. } => Some(7),
            Self::String { .. } => Some(8),
            Self::FieldRef { .. } => Some(9),
            Self::MethodRef { .. } => Some(10),
            Self::InterfaceMethodRef { .. } => Some(11),
            Self::NameAndType { .. } => Some(12),
            Self::MethodHandle { .. } => Some(15),
            Self::MethodType { .. } => Some(16),
            Self::Dynamic { .. } => Some(17),
            Self::InvokeDynamic { .. } => Some(18),
            Self::Reserved => None,
        }
    }

    /// Whether the entry takes two slots
    #[must_use]
    pub const fn is_wide(&self) -> bool {
        matches!(self, Self::Long(_) | Self::Double(_))
    }
}

/// A resolved field or method reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'pool> {
    /// Internal name of the owning class, e.g. `java/lang/System`
    pub class: &'pool str,
    /// Member name
    pub name: &'pool str,
    /// Member descriptor
    pub descriptor: &'pool str,
}

impl fmt::Display for MemberRef<'_> {
    #[allow(clippy::min_ident_chars, reason = "`f` matches the `Display` signature")]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class, self.name, self.descriptor)
    }
}

/// Deduplicating constant pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    lookup: FxHashMap<Constant, PoolIndex>,
}

impl ConstantPool {
    /// Create an empty pool
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots in use
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by its 1-based index
    #[must_use]
    pub fn get(&self, index: PoolIndex) -> Option<&Constant> {
        let slot = usize::from(index).checked_sub(1)?;
        self.entries.get(slot)
    }

    /// Iterate slots with their indices, reserved slots included
    pub fn slots(&self) -> impl Iterator<Item = (PoolIndex, &Constant)> {
        self.entries.iter().zip(1..).map(|(constant, index)| (index, constant))
    }

    /// Append an entry without deduplicating it
    ///
    /// Used when reading a class file, whose pool may repeat entries.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Full` if the entry does not fit
    pub fn push(&mut self, constant: Constant) -> Result<PoolIndex, PoolError> {
        let width = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + width > MAX_POOL_SLOTS {
            return Err(PoolError::Full);
        }
        let index = PoolIndex::try_from(self.entries.len() + 1).map_err(|_| PoolError::Full)?;
        if constant != Constant::Reserved {
            self.lookup.entry(constant.clone()).or_insert(index);
        }
        let wide = constant.is_wide();
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Reserved);
        }
        Ok(index)
    }

    fn intern(&mut self, constant: Constant) -> Result<PoolIndex, PoolError> {
        match self.lookup.get(&constant) {
            Some(index) => Ok(*index),
            None => self.push(constant),
        }
    }

    /// Add a `Utf8` entry
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Full` if the pool is full
    pub fn add_utf8(&mut self, text: &str) -> Result<PoolIndex, PoolError> {
        self.intern(Constant::Utf8(text.to_owned()))
    }

    /// Add an `Integer` entry
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Full` if the pool is full
    pub fn add_integer(&mut self, value: i32) -> Result<PoolIndex, PoolError> {
        self.intern(Constant::Integer(value))
    }

    /// Add a `Class` entry for an internal class name
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Full` if the pool is full
    pub fn add_class(&mut self, name: &str) -> Result<PoolIndex, PoolError> {
        let name = self.add_utf8(name)?;
        self.intern(Constant::Class { name })
    }

    /// Add a `String` literal entry
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Full` if the pool is full
    pub fn add_string(&mut self, text: &str) -> Result<PoolIndex, PoolError> {
        let utf8 = self.add_utf8(text)?;
        self.intern(Constant::String { utf8 })
    }

    /// Add a `NameAndType` entry
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Full` if the pool is full
    pub fn add_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<PoolIndex, PoolError> {
        let name = self.add_utf8(name)?;
        let descriptor = self.add_utf8(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
    }

    /// Add a `FieldRef` entry
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Full` if the pool is full
    pub fn add_field_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<PoolIndex, PoolError> {
        let class = self.add_class(class)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.intern(Constant::FieldRef {
            class,
            name_and_type,
        })
    }

    /// Add a `MethodRef` entry
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Full` if the pool is full
    pub fn add_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<PoolIndex, PoolError> {
        let class = self.add_class(class)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.intern(Constant::MethodRef {
            class,
            name_and_type,
        })
    }

    /// Text of a `Utf8` entry
    #[must_use]
    pub fn utf8(&self, index: PoolIndex) -> Option<&str> {
        match self.get(index)? {
            Constant::Utf8(text) => Some(text),
            _ => None,
        }
    }

    /// Value of an `Integer` entry
    #[must_use]
    pub fn integer(&self, index: PoolIndex) -> Option<i32> {
        match self.get(index)? {
            Constant::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Internal name of a `Class` entry
    #[must_use]
    pub fn class_name(&self, index: PoolIndex) -> Option<&str> {
        match self.get(index)? {
            Constant::Class { name } => self.utf8(*name),
            _ => None,
        }
    }

    /// Text of a `String` literal entry
    #[must_use]
    pub fn string(&self, index: PoolIndex) -> Option<&str> {
        match self.get(index)? {
            Constant::String { utf8 } => self.utf8(*utf8),
            _ => None,
        }
    }

    /// Name and descriptor of a `NameAndType` entry
    #[must_use]
    pub fn name_and_type(&self, index: PoolIndex) -> Option<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Some((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => None,
        }
    }

    /// Resolve a `FieldRef`, `MethodRef` or `InterfaceMethodRef` entry
    #[must_use]
    pub fn member(&self, index: PoolIndex) -> Option<MemberRef<'_>> {
        let (class, name_and_type) = match self.get(index)? {
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
            }
            | Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type),
            _ => return None,
        };
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Some(MemberRef {
            class: self.class_name(class)?,
            name,
            descriptor,
        })
    }
}
