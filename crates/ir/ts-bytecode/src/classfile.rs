//! Reading and writing class files
//!
//! Only what the rest of the crate models survives a round trip: the
//! constant pool, class name, superclass, access flags and each method's
//! `Code` attribute. Interfaces, fields and other attributes are skipped on
//! read and never written.

use crate::assemble::MAX_CODE_LEN;
use crate::class::{AccessFlags, Class, Method};
use crate::constant_pool::{Constant, ConstantPool, PoolError, PoolIndex};
use thiserror::Error;

/// First four bytes of every class file
pub const MAGIC: u32 = 0xCAFE_BABE;
/// Major version written, Java 5, the last that needs no `StackMapTable`
pub const MAJOR_VERSION: u16 = 49;
/// Minor version written
pub const MINOR_VERSION: u16 = 0;

const CODE_ATTRIBUTE: &str = "Code";

/// Class file error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassFileError {
    /// The file does not start with `0xCAFEBABE`
    #[error("invalid magic number 0x{0:08x}")]
    BadMagic(u32),
    /// The file ends in the middle of a structure
    #[error("unexpected end of file reading {what} at offset {offset}")]
    Truncated {
        /// Byte offset of the read
        offset: usize,
        /// What was being read
        what: &'static str,
    },
    /// Unknown constant pool tag
    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownTag {
        /// Pool index of the entry
        index: u32,
        /// Tag byte
        tag: u8,
    },
    /// A pool index is out of range or names the wrong kind of entry
    #[error("constant pool index #{index} is not a valid {expected} entry")]
    BadPoolIndex {
        /// Offending index
        index: PoolIndex,
        /// Kind of entry required
        expected: &'static str,
    },
    /// A method handle with a reference kind outside 1 to 9
    #[error("method handle #{index} has invalid reference kind {kind}")]
    BadReferenceKind {
        /// Pool index of the handle
        index: PoolIndex,
        /// Reference kind read
        kind: u8,
    },
    /// A `Utf8` entry is not valid modified UTF-8
    #[error("constant pool entry #{index} is not valid modified UTF-8")]
    MalformedUtf8 {
        /// Pool index of the entry
        index: u32,
    },
    /// A structure is too large for its length field
    #[error("{what} of length {len} is too large for a class file")]
    TooLarge {
        /// What overflowed
        what: &'static str,
        /// Its length
        len: usize,
    },
    /// Bytes remain after the class structure
    #[error("{0} trailing bytes after the class structure")]
    TrailingBytes(usize),
    /// The pool overflowed while writing
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Encode a class as class file bytes
///
/// Entries for the class name, superclass, method names and `Code` are
/// added to a copy of the pool, so existing pool indices are preserved.
///
/// # Errors
///
/// Returns `ClassFileError` if a structure does not fit its length field or
/// the pool overflows
pub fn write_class(class: &Class) -> Result<Vec<u8>, ClassFileError> {
    let mut pool = class.pool.clone();
    let this_class = pool.add_class(&class.name)?;
    let super_class = match &class.super_name {
        Some(name) => pool.add_class(name)?,
        None => 0,
    };
    let mut methods = Vec::new();
    for method in class.methods() {
        let name = pool.add_utf8(&method.name)?;
        let descriptor = pool.add_utf8(&method.descriptor)?;
        methods.push((name, descriptor, method));
    }
    let code_name = pool.add_utf8(CODE_ATTRIBUTE)?;

    let mut out = Output::default();
    out.u32(MAGIC);
    out.u16(MINOR_VERSION);
    out.u16(MAJOR_VERSION);
    out.u16(length_u16("constant pool", pool.len() + 1)?);
    for (_, constant) in pool.slots() {
        write_constant(&mut out, constant)?;
    }
    out.u16(class.flags.0);
    out.u16(this_class);
    out.u16(super_class);
    // interfaces, fields
    out.u16(0);
    out.u16(0);
    out.u16(length_u16("method table", methods.len())?);
    for (name, descriptor, method) in methods {
        out.u16(method.flags.0);
        out.u16(name);
        out.u16(descriptor);
        if method.code.is_empty() {
            out.u16(0);
        } else {
            out.u16(1);
            write_code(&mut out, code_name, method)?;
        }
    }
    // class attributes
    out.u16(0);
    Ok(out.bytes)
}

/// Decode class file bytes
///
/// The pool is checked the way a loader would: every reference must point
/// at an entry of the right kind.
///
/// # Errors
///
/// Returns `ClassFileError` if the bytes are not a well-formed class file
pub fn read_class(bytes: &[u8]) -> Result<Class, ClassFileError> {
    let mut input = Input::new(bytes);
    let magic = input.u32("magic")?;
    if magic != MAGIC {
        return Err(ClassFileError::BadMagic(magic));
    }
    input.skip(4, "version")?;
    let count = input.u16("constant pool count")?;
    let pool = read_pool(&mut input, count)?;
    check_pool(&pool)?;

    let flags = AccessFlags(input.u16("access flags")?);
    let this_class = input.u16("this class")?;
    let name = class_name(&pool, this_class)?;
    let super_class = input.u16("super class")?;
    let super_name = if super_class == 0 {
        None
    } else {
        Some(class_name(&pool, super_class)?)
    };

    let interfaces = input.u16("interface count")?;
    input.skip(2 * usize::from(interfaces), "interfaces")?;
    let fields = input.u16("field count")?;
    for _ in 0..fields {
        input.skip(6, "field")?;
        skip_attributes(&mut input)?;
    }

    let mut class = Class::new(&name);
    class.super_name = super_name;
    class.flags = flags;
    let methods = input.u16("method count")?;
    for _ in 0..methods {
        let method = read_method(&mut input, &pool)?;
        class.add_method(method);
    }
    class.pool = pool;
    skip_attributes(&mut input)?;

    match input.remaining() {
        0 => Ok(class),
        extra => Err(ClassFileError::TrailingBytes(extra)),
    }
}

fn length_u16(what: &'static str, len: usize) -> Result<u16, ClassFileError> {
    u16::try_from(len).map_err(|_| ClassFileError::TooLarge { what, len })
}

fn write_constant(out: &mut Output, constant: &Constant) -> Result<(), ClassFileError> {
    let Some(tag) = constant.tag() else {
        return Ok(());
    };
    out.u8(tag);
    match constant {
        Constant::Utf8(text) => {
            let encoded = encode_modified_utf8(text);
            out.u16(length_u16("utf8 constant", encoded.len())?);
            out.extend(&encoded);
        }
        Constant::Integer(value) => out.extend(&value.to_be_bytes()),
        Constant::Float(bits) => out.u32(*bits),
        Constant::Long(value) => out.extend(&value.to_be_bytes()),
        Constant::Double(bits) => out.extend(&bits.to_be_bytes()),
        Constant::Class { name: utf8 }
        | Constant::String { utf8 }
        | Constant::MethodType { descriptor: utf8 } => out.u16(*utf8),
        Constant::NameAndType { name, descriptor } => {
            out.u16(*name);
            out.u16(*descriptor);
        }
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
        } => {
            out.u16(*class);
            out.u16(*name_and_type);
        }
        Constant::MethodHandle { kind, reference } => {
            out.u8(*kind);
            out.u16(*reference);
        }
        Constant::Dynamic {
            bootstrap,
            name_and_type,
        }
        | Constant::InvokeDynamic {
            bootstrap,
            name_and_type,
        } => {
            out.u16(*bootstrap);
            out.u16(*name_and_type);
        }
        Constant::Reserved => {}
    }
    Ok(())
}

fn write_code(
    out: &mut Output,
    code_name: PoolIndex,
    method: &Method,
) -> Result<(), ClassFileError> {
    let len = method.code.len();
    if len > MAX_CODE_LEN {
        return Err(ClassFileError::TooLarge { what: "code", len });
    }
    // max_stack, max_locals, code_length, code, exception table, attributes
    let attribute_len = 2 + 2 + 4 + len + 2 + 2;
    out.u16(code_name);
    out.u32(attribute_len as u32);
    out.u16(method.max_stack);
    out.u16(method.max_locals);
    out.u32(len as u32);
    out.extend(&method.code);
    out.u16(0);
    out.u16(0);
    Ok(())
}

fn read_pool(input: &mut Input<'_>, count: u16) -> Result<ConstantPool, ClassFileError> {
    let mut pool = ConstantPool::new();
    let mut index = 1u32;
    while index < u32::from(count) {
        let tag = input.u8("constant tag")?;
        let constant = match tag {
            1 => {
                let len = input.u16("utf8 length")?;
                let bytes = input.take(usize::from(len), "utf8 bytes")?;
                let text = decode_modified_utf8(bytes)
                    .ok_or(ClassFileError::MalformedUtf8 { index })?;
                Constant::Utf8(text)
            }
            3 => Constant::Integer(input.u32("integer")? as i32),
            4 => Constant::Float(input.u32("float")?),
            5 => Constant::Long(input.u64("long")? as i64),
            6 => Constant::Double(input.u64("double")?),
            7 => Constant::Class {
                name: input.u16("class name")?,
            },
            8 => Constant::String {
                utf8: input.u16("string")?,
            },
            9 | 10 | 11 => {
                let class = input.u16("member class")?;
                let name_and_type = input.u16("member name and type")?;
                match tag {
                    9 => Constant::FieldRef {
                        class,
                        name_and_type,
                    },
                    10 => Constant::MethodRef {
                        class,
                        name_and_type,
                    },
                    _ => Constant::InterfaceMethodRef {
                        class,
                        name_and_type,
                    },
                }
            }
            12 => Constant::NameAndType {
                name: input.u16("name")?,
                descriptor: input.u16("descriptor")?,
            },
            15 => Constant::MethodHandle {
                kind: input.u8("reference kind")?,
                reference: input.u16("reference")?,
            },
            16 => Constant::MethodType {
                descriptor: input.u16("method type")?,
            },
            17 | 18 => {
                let bootstrap = input.u16("bootstrap method")?;
                let name_and_type = input.u16("dynamic name and type")?;
                if tag == 17 {
                    Constant::Dynamic {
                        bootstrap,
                        name_and_type,
                    }
                } else {
                    Constant::InvokeDynamic {
                        bootstrap,
                        name_and_type,
                    }
                }
            }
            _ => return Err(ClassFileError::UnknownTag { index, tag }),
        };
        index += if constant.is_wide() { 2 } else { 1 };
        pool.push(constant)?;
    }
    Ok(pool)
}

fn check_pool(pool: &ConstantPool) -> Result<(), ClassFileError> {
    for (index, constant) in pool.slots() {
        match constant {
            Constant::Class { name: utf8 }
            | Constant::String { utf8 }
            | Constant::MethodType { descriptor: utf8 } => expect_kind(pool, *utf8, "Utf8")?,
            Constant::NameAndType { name, descriptor } => {
                expect_kind(pool, *name, "Utf8")?;
                expect_kind(pool, *descriptor, "Utf8")?;
            }
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
            } => {
                expect_kind(pool, *class, "Class")?;
                expect_kind(pool, *name_and_type, "NameAndType")?;
            }
            Constant::Dynamic { name_and_type, .. }
            | Constant::InvokeDynamic { name_and_type, .. } => {
                expect_kind(pool, *name_and_type, "NameAndType")?;
            }
            Constant::MethodHandle { kind, reference } => {
                let expected = match kind {
                    1..=4 => "Fieldref",
                    5 | 8 => "Methodref",
                    6 | 7 => "Methodref or InterfaceMethodref",
                    9 => "InterfaceMethodref",
                    _ => {
                        return Err(ClassFileError::BadReferenceKind {
                            index,
                            kind: *kind,
                        });
                    }
                };
                expect_kind(pool, *reference, expected)?;
            }
            Constant::Utf8(_)
            | Constant::Integer(_)
            | Constant::Float(_)
            | Constant::Long(_)
            | Constant::Double(_)
            | Constant::Reserved => {}
        }
    }
    Ok(())
}

fn expect_kind(
    pool: &ConstantPool,
    index: PoolIndex,
    expected: &'static str,
) -> Result<(), ClassFileError> {
    let matches = match pool.get(index) {
        Some(Constant::Utf8(_)) => expected == "Utf8",
        Some(Constant::Class { .. }) => expected == "Class",
        Some(Constant::NameAndType { .. }) => expected == "NameAndType",
        Some(Constant::FieldRef { .. }) => expected == "Fieldref",
        Some(Constant::MethodRef { .. }) => expected.starts_with("Methodref"),
        Some(Constant::InterfaceMethodRef { .. }) => expected.ends_with("InterfaceMethodref"),
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        Err(ClassFileError::BadPoolIndex { index, expected })
    }
}

fn class_name(pool: &ConstantPool, index: PoolIndex) -> Result<String, ClassFileError> {
    pool.class_name(index)
        .map(str::to_owned)
        .ok_or(ClassFileError::BadPoolIndex {
            index,
            expected: "Class",
        })
}

fn utf8(pool: &ConstantPool, index: PoolIndex) -> Result<String, ClassFileError> {
    pool.utf8(index)
        .map(str::to_owned)
        .ok_or(ClassFileError::BadPoolIndex {
            index,
            expected: "Utf8",
        })
}

fn skip_attributes(input: &mut Input<'_>) -> Result<(), ClassFileError> {
    let count = input.u16("attribute count")?;
    for _ in 0..count {
        input.skip(2, "attribute name")?;
        let len = input.u32("attribute length")?;
        input.skip(len as usize, "attribute")?;
    }
    Ok(())
}

fn read_method(input: &mut Input<'_>, pool: &ConstantPool) -> Result<Method, ClassFileError> {
    let flags = AccessFlags(input.u16("method access flags")?);
    let name = utf8(pool, input.u16("method name")?)?;
    let descriptor = utf8(pool, input.u16("method descriptor")?)?;
    let mut method = Method {
        name,
        descriptor,
        flags,
        max_stack: 0,
        max_locals: 0,
        code: Vec::new(),
    };

    let attributes = input.u16("method attribute count")?;
    for _ in 0..attributes {
        let attribute_name = input.u16("attribute name")?;
        let len = input.u32("attribute length")?;
        let body = input.take(len as usize, "attribute")?;
        if pool.utf8(attribute_name) == Some(CODE_ATTRIBUTE) {
            read_code(body, &mut method)?;
        }
    }
    Ok(method)
}

fn read_code(body: &[u8], method: &mut Method) -> Result<(), ClassFileError> {
    let mut input = Input::new(body);
    method.max_stack = input.u16("max stack")?;
    method.max_locals = input.u16("max locals")?;
    let len = input.u32("code length")? as usize;
    if len > MAX_CODE_LEN {
        return Err(ClassFileError::TooLarge { what: "code", len });
    }
    method.code = input.take(len, "code")?.to_vec();
    let handlers = input.u16("exception table length")?;
    input.skip(8 * usize::from(handlers), "exception table")?;
    skip_attributes(&mut input)
}

/// Java's modified UTF-8: NUL as two bytes, supplementary characters as
/// surrogate pairs of three bytes each
fn encode_modified_utf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}

fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let continuation = |byte: u8| (byte & 0xc0 == 0x80).then_some(u16::from(byte & 0x3f));
    let mut units = Vec::with_capacity(bytes.len());
    let mut rest = bytes;
    while let Some((&lead, tail)) = rest.split_first() {
        let (unit, used) = match lead {
            0x01..=0x7f => (u16::from(lead), 0),
            0xc0..=0xdf => {
                let low = continuation(*tail.first()?)?;
                ((u16::from(lead & 0x1f) << 6) | low, 1)
            }
            0xe0..=0xef => {
                let middle = continuation(*tail.first()?)?;
                let low = continuation(*tail.get(1)?)?;
                ((u16::from(lead & 0x0f) << 12) | (middle << 6) | low, 2)
            }
            _ => return None,
        };
        units.push(unit);
        rest = tail.get(used..)?;
    }
    String::from_utf16(&units).ok()
}

#[derive(Default)]
struct Output {
    bytes: Vec<u8>,
}

impl Output {
    fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.extend(&value.to_be_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.extend(&value.to_be_bytes());
    }

    fn extend(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }
}

struct Input<'bytes> {
    bytes: &'bytes [u8],
    offset: usize,
}

impl<'bytes> Input<'bytes> {
    const fn new(bytes: &'bytes [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    const fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'bytes [u8], ClassFileError> {
        let slice = self
            .offset
            .checked_add(len)
            .and_then(|end| self.bytes.get(self.offset..end))
            .ok_or(ClassFileError::Truncated {
                offset: self.offset,
                what,
            })?;
        self.offset += len;
        Ok(slice)
    }

    fn skip(&mut self, len: usize, what: &'static str) -> Result<(), ClassFileError> {
        self.take(len, what)?;
        Ok(())
    }

    fn array<const LEN: usize>(&mut self, what: &'static str) -> Result<[u8; LEN], ClassFileError> {
        let mut out = [0; LEN];
        out.copy_from_slice(self.take(LEN, what)?);
        Ok(out)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, ClassFileError> {
        Ok(u8::from_be_bytes(self.array(what)?))
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, ClassFileError> {
        Ok(u16::from_be_bytes(self.array(what)?))
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, ClassFileError> {
        Ok(u32::from_be_bytes(self.array(what)?))
    }

    fn u64(&mut self, what: &'static str) -> Result<u64, ClassFileError> {
        Ok(u64::from_be_bytes(self.array(what)?))
    }
}
