use std::{cell::RefCell, rc::Rc};

use basalt::{CollectSink, Context, DefaultValue, Node, Num, Options, Symbol, Token, Type};
use pretty_assertions::assert_eq;

fn ctx() -> (Context, Rc<RefCell<Vec<String>>>) {
    let (sink, handle) = CollectSink::new();
    (Context::with_sink("test.bas", Options::default(), Box::new(sink)), handle)
}

fn int(value: i64) -> Option<Node> {
    Some(Node::number(Num::Int(value), None, 1))
}

#[test]
fn identity_cast_returns_the_node_unchanged() {
    let (mut ctx, _) = ctx();
    let node = int(5).unwrap();
    assert_eq!(node.type_, Some(Type::U8));
    let cast = ctx.make_typecast(Type::U8, Some(node.clone())).unwrap();
    assert_eq!(cast, node);
}

#[test]
fn typecast_is_idempotent() {
    let (mut ctx, _) = ctx();
    let once = ctx.make_typecast(Type::I16, int(5)).unwrap();
    let twice = ctx.make_typecast(Type::I16, Some(once.clone())).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn narrowing_truncates_modulo_and_warns() {
    let (mut ctx, lines) = ctx();
    let cast = ctx.make_typecast(Type::I8, int(300)).unwrap();
    assert_eq!(cast.num(), Some(Num::Int(44)));
    assert_eq!(cast.type_, Some(Type::I8));
    assert!(
        lines.borrow().iter().any(|l| l.contains("Conversion may lose significant digits")),
        "expected the lose-digits warning, got: {:?}",
        lines.borrow()
    );
}

#[test]
fn in_range_negative_survives_unchanged() {
    let (mut ctx, lines) = ctx();
    let cast = ctx.make_typecast(Type::I8, int(-44)).unwrap();
    assert_eq!(cast.num(), Some(Num::Int(-44)));
    assert!(lines.borrow().is_empty(), "no warning expected: {:?}", lines.borrow());
}

#[test]
fn string_to_numeric_suggests_val() {
    let (mut ctx, lines) = ctx();
    let result = ctx.make_typecast(Type::U8, Some(Node::string("5", 1)));
    assert!(result.is_none());
    assert!(
        lines.borrow().iter().any(|l| l.contains("Use VAL() function")),
        "got: {:?}",
        lines.borrow()
    );
}

#[test]
fn numeric_to_string_suggests_str() {
    let (mut ctx, lines) = ctx();
    let result = ctx.make_typecast(Type::Str, int(5));
    assert!(result.is_none());
    assert!(
        lines.borrow().iter().any(|l| l.contains("Use STR() function")),
        "got: {:?}",
        lines.borrow()
    );
}

#[test]
fn floating_targets_promote_the_value() {
    let (mut ctx, _) = ctx();
    let cast = ctx.make_typecast(Type::Fixed, int(3)).unwrap();
    assert_eq!(cast.num(), Some(Num::Float(3.0)));
    assert_eq!(cast.type_, Some(Type::Fixed));
}

#[test]
fn non_literal_operand_is_wrapped() {
    let (mut ctx, _) = ctx();
    let t = ctx.make_type_node("ubyte", 1).unwrap();
    ctx.make_var_decl("a", 1, &t).unwrap();
    let reference = ctx.make_id_expr("a", 2).unwrap();
    let cast = ctx.make_typecast(Type::I16, Some(reference)).unwrap();
    assert_eq!(cast.token(), Token::Cast);
    assert_eq!(cast.type_, Some(Type::I16));
    assert_eq!(cast.children.len(), 1);
    assert_eq!(cast.children[0].token(), Token::Id);
}

#[test]
fn const_identifier_folds_through_the_cast() {
    let (mut ctx, lines) = ctx();
    let t = ctx.make_type_node("ubyte", 1).unwrap();
    ctx.make_const_decl("K", 1, &t, int(5)).unwrap();
    let reference = ctx.make_id_expr("K", 2).unwrap();
    let cast = ctx.make_typecast(Type::I16, Some(reference)).unwrap();
    assert_eq!(cast.num(), Some(Num::Int(5)));
    assert_eq!(cast.type_, Some(Type::I16));
    assert!(lines.borrow().is_empty(), "got: {:?}", lines.borrow());
}

#[test]
fn initialized_byte_declaration_truncates() {
    // DIM a AS byte = 300 declares an i8, stores 44 and warns.
    let (mut ctx, lines) = ctx();
    let t = ctx.make_type_node("byte", 1).unwrap();
    let id = ctx.make_var_decl_initialized("a", 1, &t, int(300)).unwrap();
    let entry = ctx.symtab().entry(id);
    assert_eq!(entry.type_, Some(Type::I8));
    assert_eq!(entry.default_value, Some(DefaultValue::Num(Num::Int(44))));
    assert!(entry.declared);
    assert!(
        lines.borrow().iter().any(|l| l.contains("Conversion may lose significant digits")),
        "got: {:?}",
        lines.borrow()
    );
}

#[test]
fn non_constant_initializer_is_rejected() {
    let (mut ctx, lines) = ctx();
    let ubyte = ctx.make_type_node("ubyte", 1).unwrap();
    ctx.make_var_decl("src", 1, &ubyte).unwrap();
    let reference = ctx.make_id_expr("src", 2);
    let t = ctx.make_type_node("byte", 2).unwrap();
    assert!(ctx.make_var_decl_initialized("dst", 2, &t, reference).is_none());
    assert_eq!(ctx.diagnostics().error_count(), 1, "got: {:?}", lines.borrow());
}

#[test]
fn suffix_and_declaration_type_must_agree() {
    let (mut ctx, lines) = ctx();
    let t = ctx.make_type_node("byte", 1).unwrap();
    // n% forces integer; declaring it AS byte is an error.
    assert!(ctx.make_var_decl("n%", 1, &t).is_none());
    assert!(
        lines.borrow().iter().any(|l| l.contains("suffix is for type")),
        "got: {:?}",
        lines.borrow()
    );
}

#[test]
fn cast_node_symbol_shape() {
    let (mut ctx, _) = ctx();
    let t = ctx.make_type_node("float", 1).unwrap();
    ctx.make_var_decl("f", 1, &t).unwrap();
    let reference = ctx.make_id_expr("f", 2).unwrap();
    let cast = ctx.make_typecast(Type::U16, Some(reference)).unwrap();
    assert!(matches!(cast.symbol, Symbol::TypeCast));
}
