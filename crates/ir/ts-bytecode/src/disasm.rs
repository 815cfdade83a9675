//! javap-style disassembly

use crate::class::{AccessFlags, Class, Method};
use crate::constant_pool::{Constant, ConstantPool, PoolIndex};
use crate::decode::{DecodeError, Decoded, Operands, decode};
use serde::Serialize;
use std::fmt::{self, Write as _};
use thiserror::Error;

/// Decoded view of one method, serializable for machine consumption
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodListing {
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Whether the method is static
    pub is_static: bool,
    /// Operand stack limit
    pub max_stack: u16,
    /// Local variable slots
    pub max_locals: u16,
    /// Decoded instructions
    pub code: Vec<Decoded>,
}

impl MethodListing {
    /// Decode a method
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the method's code does not decode
    pub fn new(method: &Method) -> Result<Self, DecodeError> {
        Ok(Self {
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            is_static: method.is_static(),
            max_stack: method.max_stack,
            max_locals: method.max_locals,
            code: decode(&method.code)?,
        })
    }
}

/// Decode every method of a class
///
/// # Errors
///
/// Returns the first `DecodeError` encountered
pub fn listing(class: &Class) -> Result<Vec<MethodListing>, DecodeError> {
    class.methods().map(MethodListing::new).collect()
}

/// Disassembler error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisasmError {
    /// A method's code does not decode
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Formatting the listing failed
    #[error("failed to format listing")]
    Format(#[from] fmt::Error),
}

/// Render a class as text
///
/// # Errors
///
/// Returns `DisasmError` if a method's code does not decode
pub fn disassemble(class: &Class) -> Result<String, DisasmError> {
    let mut out = String::new();
    writeln!(out, "class {} {{", class.name)?;
    for (position, method) in class.methods().enumerate() {
        if position > 0 {
            out.push('\n');
        }
        write_method(&mut out, &class.pool, method)?;
    }
    out.push_str("}\n");
    Ok(out)
}

/// Render a single method as text
///
/// # Errors
///
/// Returns `DisasmError` if the method's code does not decode
pub fn disassemble_method(pool: &ConstantPool, method: &Method) -> Result<String, DisasmError> {
    let mut out = String::new();
    write_method(&mut out, pool, method)?;
    Ok(out)
}

fn write_method(out: &mut String, pool: &ConstantPool, method: &Method) -> Result<(), DisasmError> {
    let mut modifiers = String::new();
    if method.flags.contains(AccessFlags::PUBLIC) {
        modifiers.push_str("public ");
    }
    if method.flags.contains(AccessFlags::STATIC) {
        modifiers.push_str("static ");
    }
    writeln!(out, "  {modifiers}{}{}", method.name, method.descriptor)?;
    writeln!(
        out,
        "    Code: stack={}, locals={}",
        method.max_stack, method.max_locals
    )?;
    for insn in decode(&method.code)? {
        write_insn(out, pool, &insn)?;
    }
    Ok(())
}

fn write_insn(out: &mut String, pool: &ConstantPool, insn: &Decoded) -> fmt::Result {
    let mnemonic = insn.opcode.mnemonic();
    write!(out, "    {:>4}: {mnemonic}", insn.pc)?;
    match &insn.operands {
        Operands::None => {}
        Operands::Int { value } => {
            if insn.len > 1 {
                write!(out, " {value}")?;
            }
        }
        Operands::Local { index } => {
            if insn.len > 1 {
                write!(out, " {index}")?;
            }
        }
        Operands::Pool { index } => {
            write!(out, " #{index}")?;
            if let Some(comment) = pool_comment(pool, *index) {
                write!(out, " // {comment}")?;
            }
        }
        Operands::Branch { target } => write!(out, " {target}")?,
        Operands::Table {
            low,
            high,
            default,
            targets,
        } => {
            writeln!(out, " {{ // {low} to {high}")?;
            for (key, target) in (*low..=*high).zip(targets) {
                writeln!(out, "{key:>16}: {target}")?;
            }
            write_switch_end(out, *default)?;
        }
        Operands::Lookup { default, pairs } => {
            writeln!(out, " {{ // {}", pairs.len())?;
            for (key, target) in pairs {
                writeln!(out, "{key:>16}: {target}")?;
            }
            write_switch_end(out, *default)?;
        }
    }
    out.push('\n');
    Ok(())
}

fn write_switch_end(out: &mut String, default: u32) -> fmt::Result {
    writeln!(out, "{:>16}: {default}", "default")?;
    write!(out, "          }}")
}

fn pool_comment(pool: &ConstantPool, index: PoolIndex) -> Option<String> {
    match pool.get(index)? {
        Constant::FieldRef { .. }
        | Constant::MethodRef { .. }
        | Constant::InterfaceMethodRef { .. } => {
            pool.member(index).as_ref().map(ToString::to_string)
        }
        Constant::String { .. } => pool.string(index).map(|text| format!("{text:?}")),
        Constant::Class { .. } => pool.class_name(index).map(str::to_owned),
        Constant::Utf8(text) => Some(text.clone()),
        Constant::Integer(value) => Some(value.to_string()),
        Constant::Long(value) => Some(format!("{value}l")),
        Constant::Float(bits) => Some(format!("{}f", f32::from_bits(*bits))),
        Constant::Double(bits) => Some(format!("{}d", f64::from_bits(*bits))),
        Constant::NameAndType { .. }
        | Constant::MethodHandle { .. }
        | Constant::MethodType { .. }
        | Constant::Dynamic { .. }
        | Constant::InvokeDynamic { .. }
        | Constant::Reserved => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::Assembler;
    use crate::insn::Insn;
    use expect_test::expect;

    #[test]
    fn test_lookupswitch_listing() {
        let mut asm = Assembler::new();
        let (hit, miss) = (asm.new_label(), asm.new_label());
        asm.push(Insn::ILoad(0))
            .push(Insn::LookupSwitch {
                default: miss,
                pairs: vec![(-1, hit), (40, hit)],
            })
            .bind(hit)
            .push(Insn::IConst(40))
            .push(Insn::IReturn)
            .bind(miss)
            .push(Insn::IConst(0))
            .push(Insn::IReturn);
        let method = Method::assemble(
            "sparse",
            "(I)I",
            AccessFlags::STATIC,
            (1, 1),
            &asm,
        )
        .unwrap();

        let mut class = Class::new("Demo");
        class.add_method(method);

        let text = disassemble(&class).unwrap();
        expect![[r#"
            class Demo {
              static sparse(I)I
                Code: stack=1, locals=1
                   0: iload_0
                   1: lookupswitch { // 2
                          -1: 28
                          40: 28
                     default: 31
                      }
                  28: bipush 40
                  30: ireturn
                  31: iconst_0
                  32: ireturn
            }
        "#]]
        .assert_eq(&text);
    }

    #[test]
    fn test_pool_comments() {
        let mut pool = ConstantPool::new();
        let out = pool
            .add_field_ref("java/lang/System", "out", "Ljava/io/PrintStream;")
            .unwrap();
        let nop = pool.add_string("nop").unwrap();
        let answer = pool.add_integer(40_000).unwrap();
        let mut asm = Assembler::new();
        asm.push(Insn::GetStatic(out))
            .push(Insn::Ldc(nop))
            .push(Insn::Ldc(answer))
            .push(Insn::Return);
        let method = Method::assemble("f", "()V", AccessFlags::PUBLIC, (3, 1), &asm).unwrap();

        let text = disassemble_method(&pool, &method).unwrap();
        assert!(text.contains("0: getstatic #6 // java/lang/System.out:Ljava/io/PrintStream;"));
        assert!(text.contains("3: ldc #8 // \"nop\""));
        assert!(text.contains("5: ldc #9 // 40000"));
        assert!(text.starts_with("  public f()V\n"));
    }

    #[test]
    fn test_undecodable_code_is_an_error() {
        let method = Method {
            name: "broken".to_owned(),
            descriptor: "()V".to_owned(),
            flags: AccessFlags::STATIC,
            max_stack: 0,
            max_locals: 0,
            code: vec![0xfe],
        };
        assert_eq!(
            disassemble_method(&ConstantPool::new(), &method),
            Err(DisasmError::Decode(DecodeError::UnknownOpcode { pc: 0, byte: 0xfe }))
        );
    }

    #[test]
    fn test_listing_serializes_switch_targets() {
        let mut asm = Assembler::new();
        let (zero, other) = (asm.new_label(), asm.new_label());
        asm.push(Insn::TableSwitch {
            low: 0,
            high: 0,
            default: other,
            targets: vec![zero],
        })
        .bind(zero)
        .bind(other)
        .push(Insn::Return);
        let method = Method::assemble("g", "(I)V", AccessFlags::STATIC, (1, 1), &asm).unwrap();
        let listing = MethodListing::new(&method).unwrap();
        assert_eq!(listing.code.len(), 2);
        assert_eq!(
            listing.code[0].operands,
            Operands::Table {
                low: 0,
                high: 0,
                default: 20,
                targets: vec![20],
            }
        );
    }
}
