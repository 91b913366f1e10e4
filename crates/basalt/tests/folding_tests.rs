use std::{cell::RefCell, rc::Rc};

use basalt::{BinOp, CollectSink, Context, Node, Num, Options, Symbol, Token, Type, UnaryOp};
use pretty_assertions::assert_eq;

fn ctx() -> (Context, Rc<RefCell<Vec<String>>>) {
    let (sink, handle) = CollectSink::new();
    (Context::with_sink("test.bas", Options::default(), Box::new(sink)), handle)
}

fn int(value: i64) -> Option<Node> {
    Some(Node::number(Num::Int(value), None, 1))
}

fn fold(ctx: &mut Context, op: BinOp, a: i64, b: i64) -> Node {
    ctx.make_binary(1, op, int(a), int(b)).expect("literal folding succeeds")
}

#[test]
fn arithmetic_on_literals_folds() {
    let (mut ctx, _) = ctx();
    assert_eq!(fold(&mut ctx, BinOp::Plus, 7, 2).num(), Some(Num::Int(9)));
    assert_eq!(fold(&mut ctx, BinOp::Minus, 7, 2).num(), Some(Num::Int(5)));
    assert_eq!(fold(&mut ctx, BinOp::Mul, 7, 2).num(), Some(Num::Int(14)));
    assert_eq!(fold(&mut ctx, BinOp::Mod, 7, 2).num(), Some(Num::Int(1)));
    assert_eq!(fold(&mut ctx, BinOp::Pow, 7, 2).num(), Some(Num::Int(49)));
}

#[test]
fn true_division_produces_a_float_when_inexact() {
    let (mut ctx, _) = ctx();
    let result = fold(&mut ctx, BinOp::Div, 7, 2);
    assert_eq!(result.num(), Some(Num::Float(3.5)));
    assert_eq!(result.type_, Some(Type::Fixed));
    assert_eq!(fold(&mut ctx, BinOp::Div, 6, 2).num(), Some(Num::Int(3)));
}

#[test]
fn shifts_and_bitwise_fold() {
    let (mut ctx, _) = ctx();
    assert_eq!(fold(&mut ctx, BinOp::Shl, 7, 2).num(), Some(Num::Int(28)));
    assert_eq!(fold(&mut ctx, BinOp::Shr, 7, 2).num(), Some(Num::Int(1)));
    assert_eq!(fold(&mut ctx, BinOp::BitAnd, 7, 2).num(), Some(Num::Int(2)));
    assert_eq!(fold(&mut ctx, BinOp::BitOr, 5, 2).num(), Some(Num::Int(7)));
    assert_eq!(fold(&mut ctx, BinOp::BitXor, 7, 2).num(), Some(Num::Int(5)));
}

#[test]
fn boolean_connectives_fold_like_truth_values() {
    let (mut ctx, _) = ctx();
    assert_eq!(fold(&mut ctx, BinOp::And, 7, 2).num(), Some(Num::Int(2)));
    assert_eq!(fold(&mut ctx, BinOp::And, 0, 2).num(), Some(Num::Int(0)));
    assert_eq!(fold(&mut ctx, BinOp::Or, 0, 2).num(), Some(Num::Int(2)));
    assert_eq!(fold(&mut ctx, BinOp::Xor, 7, 0).num(), Some(Num::Int(1)));
}

#[test]
fn folded_comparisons_are_u8_booleans() {
    let (mut ctx, _) = ctx();
    for (op, expected) in [
        (BinOp::Lt, 1),
        (BinOp::Le, 1),
        (BinOp::Gt, 0),
        (BinOp::Ge, 0),
        (BinOp::Eq, 0),
        (BinOp::Ne, 1),
    ] {
        let result = fold(&mut ctx, op, 2, 3);
        assert_eq!(result.num(), Some(Num::Int(expected)), "op {op}");
        assert_eq!(result.type_, Some(Type::U8), "op {op}");
    }
}

#[test]
fn folded_type_comes_from_the_value() {
    let (mut ctx, _) = ctx();
    assert_eq!(fold(&mut ctx, BinOp::Plus, 200, 100).type_, Some(Type::U16));
    assert_eq!(fold(&mut ctx, BinOp::Minus, 2, 3).type_, Some(Type::I8));
    assert_eq!(fold(&mut ctx, BinOp::Mul, 1000, 1000).type_, Some(Type::U32));
}

#[test]
fn division_by_zero_is_reported() {
    let (mut ctx, lines) = ctx();
    assert!(ctx.make_binary(1, BinOp::Div, int(1), int(0)).is_none());
    assert!(
        lines.borrow().iter().any(|l| l.contains("Division by zero")),
        "got: {:?}",
        lines.borrow()
    );
}

#[test]
fn string_literals_concatenate_with_plus() {
    let (mut ctx, _) = ctx();
    let result = ctx
        .make_binary(1, BinOp::Plus, Some(Node::string("foo", 1)), Some(Node::string("bar", 1)))
        .unwrap();
    assert_eq!(result.text(), Some("foobar"));
    assert_eq!(result.type_, Some(Type::Str));
}

#[test]
fn string_literal_comparison_folds_to_u8() {
    let (mut ctx, _) = ctx();
    let result = ctx
        .make_binary(1, BinOp::Lt, Some(Node::string("abc", 1)), Some(Node::string("abd", 1)))
        .unwrap();
    assert_eq!(result.num(), Some(Num::Int(1)));
    assert_eq!(result.type_, Some(Type::U8));
}

#[test]
fn arithmetic_on_strings_is_rejected() {
    let (mut ctx, lines) = ctx();
    let result = ctx.make_binary(1, BinOp::Minus, Some(Node::string("a", 1)), int(1));
    assert!(result.is_none());
    assert!(
        lines.borrow().iter().any(|l| l.contains("Operator MINUS cannot be used with STRINGS")),
        "got: {:?}",
        lines.borrow()
    );
}

#[test]
fn mixed_operands_get_common_type_casts() {
    let (mut ctx, _) = ctx();
    let ubyte = ctx.make_type_node("ubyte", 1).unwrap();
    let integer = ctx.make_type_node("integer", 1).unwrap();
    ctx.make_var_decl("a", 1, &ubyte).unwrap();
    ctx.make_var_decl("b", 1, &integer).unwrap();
    let a = ctx.make_id_expr("a", 2);
    let b = ctx.make_id_expr("b", 2);
    let sum = ctx.make_binary(2, BinOp::Plus, a, b).unwrap();
    assert_eq!(sum.type_, Some(Type::I16));
    // The narrow side is wrapped in a cast, the wide side untouched.
    assert_eq!(sum.children[0].token(), Token::Cast);
    assert_eq!(sum.children[0].type_, Some(Type::I16));
    assert_eq!(sum.children[1].token(), Token::Id);
}

#[test]
fn shifts_cast_only_the_amount() {
    let (mut ctx, _) = ctx();
    let uinteger = ctx.make_type_node("uinteger", 1).unwrap();
    ctx.make_var_decl("v", 1, &uinteger).unwrap();
    let v = ctx.make_id_expr("v", 2);
    let shifted = ctx.make_binary(2, BinOp::Shl, v, int(2)).unwrap();
    // Left keeps u16, right literal is already u8.
    assert_eq!(shifted.children[0].token(), Token::Id);
    assert_eq!(shifted.children[0].type_, Some(Type::U16));
    assert_eq!(shifted.children[1].type_, Some(Type::U8));
    assert_eq!(shifted.type_, Some(Type::U16));
}

#[test]
fn bitwise_on_floats_forces_long() {
    let (mut ctx, _) = ctx();
    let float = ctx.make_type_node("float", 1).unwrap();
    ctx.make_var_decl("f", 1, &float).unwrap();
    let f = ctx.make_id_expr("f", 2);
    let masked = ctx.make_binary(2, BinOp::BitAnd, f, int(255)).unwrap();
    assert_eq!(masked.type_, Some(Type::I32));
}

#[test]
fn unary_minus_folds_and_signs() {
    let (mut ctx, _) = ctx();
    let negated = ctx.make_unary(1, UnaryOp::Minus, int(5)).unwrap();
    assert_eq!(negated.num(), Some(Num::Int(-5)));
    assert_eq!(negated.type_, Some(Type::I8));
}

#[test]
fn unary_minus_widens_unsigned_operands() {
    let (mut ctx, _) = ctx();
    let uinteger = ctx.make_type_node("uinteger", 1).unwrap();
    ctx.make_var_decl("u", 1, &uinteger).unwrap();
    let u = ctx.make_id_expr("u", 2);
    let negated = ctx.make_unary(2, UnaryOp::Minus, u).unwrap();
    assert_eq!(negated.type_, Some(Type::I16));
    assert_eq!(negated.children[0].token(), Token::Cast);
}

#[test]
fn not_produces_u8() {
    let (mut ctx, _) = ctx();
    let folded = ctx.make_unary(1, UnaryOp::Not, int(7)).unwrap();
    assert_eq!(folded.num(), Some(Num::Int(0)));
    let integer = ctx.make_type_node("integer", 1).unwrap();
    ctx.make_var_decl("n", 1, &integer).unwrap();
    let n = ctx.make_id_expr("n", 2);
    let negated = ctx.make_unary(2, UnaryOp::Not, n).unwrap();
    assert_eq!(negated.type_, Some(Type::U8));
}

#[test]
fn abs_on_unsigned_is_redundant() {
    let (mut ctx, lines) = ctx();
    let uinteger = ctx.make_type_node("uinteger", 1).unwrap();
    ctx.make_var_decl("u", 1, &uinteger).unwrap();
    let u = ctx.make_id_expr("u", 2);
    let result = ctx.make_unary(2, UnaryOp::Abs, u).unwrap();
    // The operand comes back untouched.
    assert_eq!(result.token(), Token::Id);
    assert!(
        lines.borrow().iter().any(|l| l.contains("Redundant ABS")),
        "got: {:?}",
        lines.borrow()
    );
}

#[test]
fn address_of_a_global_is_a_constant_expression() {
    let (mut ctx, _) = ctx();
    let uinteger = ctx.make_type_node("uinteger", 1).unwrap();
    ctx.make_var_decl("g", 1, &uinteger).unwrap();
    let address = ctx.make_address_of("g", 2).unwrap();
    assert!(matches!(address.symbol, Symbol::Const));
    assert_eq!(address.type_, Some(Type::U16));
}

#[test]
fn operators_push_inside_const_envelopes() {
    let (mut ctx, _) = ctx();
    let uinteger = ctx.make_type_node("uinteger", 1).unwrap();
    ctx.make_var_decl("g", 1, &uinteger).unwrap();
    let address = ctx.make_address_of("g", 2);
    let shifted = ctx.make_binary(2, BinOp::Plus, address, int(1)).unwrap();
    // Still one relocatable constant for the emitter.
    assert!(matches!(shifted.symbol, Symbol::Const));
    assert_eq!(shifted.type_, Some(Type::U16));
    assert_eq!(shifted.children[0].token(), Token::Binary);
}
