//! Tests for CodeBuilder

use bytecode_system::{CodeBuilder, CodeFlags, CodeObject, Constant, Opcode};
use pretty_assertions::assert_eq;

#[test]
fn test_kinds_set_flags() {
    let mut b = CodeBuilder::generator("gen", 3);
    b.return_none();
    let code = b.build().unwrap();
    assert!(code.is_generator());
    assert!(code.is_optimized());
    assert!(!code.is_hidden());
    assert_eq!(code.first_line(), 3);

    let mut b = CodeBuilder::module("<module>", 1).with_flags(CodeFlags::HIDDEN);
    b.return_none();
    let code = b.build().unwrap();
    assert!(!code.is_optimized());
    assert!(code.is_hidden());
}

#[test]
fn test_nested_code_is_a_constant() {
    let mut inner = CodeBuilder::function("inner", 2);
    inner.return_none();
    let inner = inner.build().unwrap();

    let mut outer = CodeBuilder::module("<module>", 1);
    outer.make_function(inner.clone());
    outer.store_name("inner");
    outer.return_none();
    let outer = outer.build().unwrap();

    assert_eq!(outer.instructions()[0], Opcode::MakeFunction(0));
    let nested = outer.constants()[0].as_code().unwrap();
    assert_eq!(nested.name(), "inner");
    assert_eq!(outer.names(), &["inner".to_string()]);
}

#[test]
fn test_backward_jump_uses_bound_label() {
    let mut b = CodeBuilder::function("spin", 1);
    b.line(2);
    let top = b.here();
    b.emit(Opcode::Nop);
    b.emit_jump(Opcode::Jump, top);
    let code = b.build().unwrap();
    assert_eq!(code.instruction(1), Some(Opcode::Jump(0)));
    assert_eq!(code.instruction(2), None);
}

#[test]
fn test_string_constants() {
    let mut b = CodeBuilder::function("f", 1);
    b.load_const("hello");
    b.emit(Opcode::Return);
    let code: std::sync::Arc<CodeObject> = b.build().unwrap();
    assert_eq!(code.constants(), &[Constant::str("hello")]);
}
