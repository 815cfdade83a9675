//! In-memory classes and methods

use crate::assemble::{AsmError, Assembler};
use crate::constant_pool::ConstantPool;
use indexmap::IndexMap;
use std::ops::BitOr;

/// Class and method access flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// `ACC_PUBLIC`
    pub const PUBLIC: Self = Self(0x0001);
    /// `ACC_STATIC`
    pub const STATIC: Self = Self(0x0008);
    /// `ACC_SUPER`, set on every class javac emits
    pub const SUPER: Self = Self(0x0020);

    /// Whether every flag in `other` is set
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AccessFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A method with its code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    /// Method name, `<init>` for constructors
    pub name: String,
    /// Method descriptor, e.g. `(I)I`
    pub descriptor: String,
    /// Access flags
    pub flags: AccessFlags,
    /// Operand stack limit
    pub max_stack: u16,
    /// Local variable slots, parameters included
    pub max_locals: u16,
    /// Code bytes
    pub code: Vec<u8>,
}

impl Method {
    /// Build a method from an assembler's instructions
    ///
    /// # Errors
    ///
    /// Returns `AsmError` if assembly fails
    pub fn assemble(
        name: &str,
        descriptor: &str,
        flags: AccessFlags,
        (max_stack, max_locals): (u16, u16),
        asm: &Assembler,
    ) -> Result<Self, AsmError> {
        Ok(Self {
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            flags,
            max_stack,
            max_locals,
            code: asm.finish()?,
        })
    }

    /// Whether the method is static
    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.flags.contains(AccessFlags::STATIC)
    }
}

/// Superclass of classes built by [`Class::new`]
pub const OBJECT_CLASS: &str = "java/lang/Object";

/// A class: its constant pool and methods
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Class {
    /// Internal class name
    pub name: String,
    /// Internal name of the superclass, `None` only for `java/lang/Object`
    pub super_name: Option<String>,
    /// Class access flags
    pub flags: AccessFlags,
    /// Constant pool shared by all methods
    pub pool: ConstantPool,
    methods: IndexMap<(String, String), Method>,
}

impl Class {
    /// Create a public class extending `java/lang/Object`, with an empty
    /// pool and no methods
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            super_name: Some(OBJECT_CLASS.to_owned()),
            flags: AccessFlags::PUBLIC | AccessFlags::SUPER,
            pool: ConstantPool::new(),
            methods: IndexMap::new(),
        }
    }

    /// Add a method, returning any previous method with the same signature
    pub fn add_method(&mut self, method: Method) -> Option<Method> {
        let key = (method.name.clone(), method.descriptor.clone());
        self.methods.insert(key, method)
    }

    /// Look up a method by name and descriptor
    #[must_use]
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.methods.get(&(name.to_owned(), descriptor.to_owned()))
    }

    /// Methods in declaration order
    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.values()
    }
}
