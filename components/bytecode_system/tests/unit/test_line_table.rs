//! Tests for LineTable

use bytecode_system::{CodeBuilder, LineBounds, Opcode};

#[test]
fn test_bounds_follow_builder_lines() {
    let mut b = CodeBuilder::function("f", 1);
    b.line(2);
    b.emit(Opcode::Nop);
    b.emit(Opcode::Nop);
    b.line(3);
    b.return_none();
    let code = b.build().unwrap();
    let table = code.line_table();

    assert_eq!(table.bounds(1), LineBounds { line: 2, lower: 0, upper: 2 });
    assert_eq!(table.bounds(3).line, 3);
    assert_eq!(table.first_offset_of(3), Some(2));
    assert!(table.is_line_start(0));
}

#[test]
fn test_code_without_lines_reports_first_line() {
    let mut b = CodeBuilder::function("f", 7);
    b.return_none();
    let code = b.build().unwrap();
    assert_eq!(code.line_table().line_for(0), 7);
    assert!(code.line_table().entries().is_empty());
}
