//! The `TableSwitch` fixture class
//!
//! Equivalent to compiling:
//!
//! ```java
//! public class TableSwitch {
//!     public TableSwitch() { System.out.println("nop"); }
//!     public static int choose(int n) {
//!         switch (n) { case 0: return 0; case 1: return 1; case 2: return 2; }
//!         return -1;
//!     }
//!     public static void main(String[] args) {
//!         System.out.println(choose(-1));
//!         // ... and so on for 0, 1, 2, 3
//!     }
//! }
//! ```

use crate::driver::INPUTS;
use ts_bytecode::{AccessFlags, AsmError, Assembler, Class, Insn, Method, lower_switch};

/// Internal name of the fixture class
pub const CLASS_NAME: &str = "TableSwitch";
/// Descriptor of `choose`
pub const CHOOSE_DESCRIPTOR: &str = "(I)I";
/// Descriptor of `main`
pub const MAIN_DESCRIPTOR: &str = "([Ljava/lang/String;)V";

const PRINT_STREAM: &str = "java/io/PrintStream";
const PRINT_STREAM_TYPE: &str = "Ljava/io/PrintStream;";

/// Build the fixture class
///
/// # Errors
///
/// Returns `AsmError` if a method fails to assemble
pub fn table_switch_class() -> Result<Class, AsmError> {
    let mut class = Class::new(CLASS_NAME);
    let constructor = constructor(&mut class)?;
    class.add_method(constructor);
    let choose = choose()?;
    class.add_method(choose);
    let main = main(&mut class)?;
    class.add_method(main);
    Ok(class)
}

/// `public TableSwitch()`, which nothing on the driver path calls
fn constructor(class: &mut Class) -> Result<Method, AsmError> {
    let object_init = class.pool.add_method_ref("java/lang/Object", "<init>", "()V")?;
    let out = class.pool.add_field_ref("java/lang/System", "out", PRINT_STREAM_TYPE)?;
    let nop = class.pool.add_string("nop")?;
    let println = class
        .pool
        .add_method_ref(PRINT_STREAM, "println", "(Ljava/lang/String;)V")?;

    let mut asm = Assembler::new();
    asm.push(Insn::ALoad0)
        .push(Insn::InvokeSpecial(object_init))
        .push(Insn::GetStatic(out))
        .push(Insn::Ldc(nop))
        .push(Insn::InvokeVirtual(println))
        .push(Insn::Return);
    Method::assemble("<init>", "()V", AccessFlags::PUBLIC, (2, 1), &asm)
}

fn choose() -> Result<Method, AsmError> {
    let mut asm = Assembler::new();
    let default = asm.new_label();
    let arms: Vec<_> = (0..=2).map(|key| (key, asm.new_label())).collect();

    asm.push(Insn::ILoad(0));
    asm.push(lower_switch(&arms, default)?);
    for (key, label) in &arms {
        asm.bind(*label).push(Insn::IConst(*key)).push(Insn::IReturn);
    }
    asm.bind(default).push(Insn::IConst(-1)).push(Insn::IReturn);

    Method::assemble(
        "choose",
        CHOOSE_DESCRIPTOR,
        AccessFlags::PUBLIC | AccessFlags::STATIC,
        (1, 1),
        &asm,
    )
}

fn main(class: &mut Class) -> Result<Method, AsmError> {
    let out = class.pool.add_field_ref("java/lang/System", "out", PRINT_STREAM_TYPE)?;
    let choose = class
        .pool
        .add_method_ref(CLASS_NAME, "choose", CHOOSE_DESCRIPTOR)?;
    let println = class.pool.add_method_ref(PRINT_STREAM, "println", "(I)V")?;

    let mut asm = Assembler::new();
    for input in INPUTS {
        asm.push(Insn::GetStatic(out))
            .push(Insn::IConst(input))
            .push(Insn::InvokeStatic(choose))
            .push(Insn::InvokeVirtual(println));
    }
    asm.push(Insn::Return);
    Method::assemble(
        "main",
        MAIN_DESCRIPTOR,
        AccessFlags::PUBLIC | AccessFlags::STATIC,
        (2, 1),
        &asm,
    )
}
