use std::{cell::RefCell, rc::Rc};

use basalt::{
    BinOp, CollectSink, Context, Convention, FuncKind, Node, Num, OptionKey, Options, ScopeKind, SentenceKind, Symbol,
    Token, Type, TOO_MANY_ERRORS,
};
use pretty_assertions::assert_eq;

fn ctx() -> (Context, Rc<RefCell<Vec<String>>>) {
    let (sink, handle) = CollectSink::new();
    (Context::with_sink("test.bas", Options::default(), Box::new(sink)), handle)
}

fn int(value: i64) -> Option<Node> {
    Some(Node::number(Num::Int(value), None, 1))
}

#[test]
fn assignment_of_a_folded_expression() {
    // DIM b AS integer : LET b = 1 + 2 * 3
    let (mut ctx, _) = ctx();
    let t = ctx.make_type_node("integer", 1).unwrap();
    ctx.make_var_decl("b", 1, &t).unwrap();
    let product = ctx.make_binary(2, BinOp::Mul, int(2), int(3));
    let sum = ctx.make_binary(2, BinOp::Plus, int(1), product);
    let stmt = ctx.make_assignment(2, "b", sum).unwrap();

    // The right-hand side is a single literal 7, already i16.
    assert_eq!(stmt.children[1].num(), Some(Num::Int(7)));
    assert_eq!(stmt.children[1].type_, Some(Type::I16));
    assert_eq!(ctx.diagnostics().error_count(), 0);

    let block = ctx.make_block(vec![Some(stmt)]);
    let program = ctx.finish(block, 2).unwrap();
    assert_eq!(program.data.children.len(), 1, "one global in the data segment");
    assert_eq!(program.data.children[0].token(), Token::VarDecl);
}

#[test]
fn finish_appends_the_implicit_end() {
    let (mut ctx, _) = ctx();
    let program = ctx.finish(None, 1).unwrap();
    let last = program.ast.children.last().unwrap();
    assert!(matches!(last.symbol, Symbol::Sentence(SentenceKind::End)));
    assert_eq!(last.children[0].num(), Some(Num::Int(0)));
}

#[test]
fn assignment_to_a_constant_is_rejected() {
    let (mut ctx, lines) = ctx();
    let t = ctx.make_type_node("integer", 1).unwrap();
    ctx.make_const_decl("K", 1, &t, int(1)).unwrap();
    assert!(ctx.make_assignment(2, "K", int(2)).is_none());
    assert!(
        lines.borrow().iter().any(|l| l.contains("It is a constant")),
        "got: {:?}",
        lines.borrow()
    );
}

#[test]
fn forward_goto_label_resolves() {
    let (mut ctx, _) = ctx();
    let target = ctx.make_label_ref("again", 1);
    let goto = ctx.make_sentence(1, SentenceKind::Custom("GOTO".to_string()), vec![Some(target)]);
    let label = ctx.make_label("again", 2);
    let block = ctx.make_block(vec![Some(goto), label]);
    let program = ctx.finish(block, 2);
    assert!(program.is_some(), "forward label must resolve");
    assert_eq!(ctx.diagnostics().error_count(), 0);
}

#[test]
fn unresolved_goto_label_is_an_error() {
    let (mut ctx, lines) = ctx();
    let target = ctx.make_label_ref("nowhere", 1);
    let goto = ctx.make_sentence(1, SentenceKind::Custom("GOTO".to_string()), vec![Some(target)]);
    let block = ctx.make_block(vec![Some(goto)]);
    assert!(ctx.finish(block, 1).is_none());
    assert!(
        lines.borrow().iter().any(|l| l.contains("Undeclared identifier \"nowhere\"")),
        "got: {:?}",
        lines.borrow()
    );
}

#[test]
fn labels_declared_in_functions_are_global() {
    let (mut ctx, _) = ctx();
    let header = ctx.begin_function(FuncKind::Sub, Convention::StdCall, "s", 1);
    let params = ctx.make_param_list(None, None);
    let ret = Some(ctx.default_type_node(1));
    let header = ctx.set_function_signature(header, params, ret, 1);
    let label = ctx.make_label("inner", 2);
    let body = ctx.make_block(vec![label]);
    let func = ctx.end_function(header, body, FuncKind::Sub, 3);

    // Reference from the global scope, after the function closed.
    let target = ctx.make_label_ref("inner", 4);
    let goto = ctx.make_sentence(4, SentenceKind::Custom("GOTO".to_string()), vec![Some(target)]);
    let block = ctx.make_block(vec![func, Some(goto)]);
    assert!(ctx.finish(block, 4).is_some());
    assert_eq!(ctx.diagnostics().error_count(), 0);

    let id = ctx.symtab().get_entry("inner", None).unwrap();
    let entry = ctx.symtab().entry(id);
    assert_eq!(entry.scope, ScopeKind::Global);
    assert_eq!(entry.mangled, "__LABEL__inner");
}

#[test]
fn call_before_definition_is_checked_at_finish() {
    let (mut ctx, _) = ctx();
    // Call f(5) before any declaration of f.
    let arg = ctx.make_argument(int(5), 1);
    let args = ctx.make_arg_list(None, arg);
    let call = ctx.make_proc_call("f", 1, args).unwrap();

    // Now define FUNCTION f(x AS integer) AS integer.
    let header = ctx.begin_function(FuncKind::Function, Convention::StdCall, "f", 2);
    let t = ctx.make_type_node("integer", 2).unwrap();
    let param = ctx.make_param_decl("x", 2, &t, Some(false));
    let params = ctx.make_param_list(None, param);
    let ret = ctx.make_type_node("integer", 2);
    let header = ctx.set_function_signature(header, params, ret, 2);
    let func = ctx.end_function(header, None, FuncKind::Function, 3);

    let block = ctx.make_block(vec![Some(call), func]);
    let program = ctx.finish(block, 3).unwrap();
    assert_eq!(ctx.diagnostics().error_count(), 0);

    // The deferred call got its argument cast to i16 during fix-up.
    let call = program
        .ast
        .children
        .iter()
        .find(|n| n.token() == Token::Call)
        .expect("the call survives in the program");
    let arg = &call.children[0].children[0];
    assert_eq!(arg.children[0].type_, Some(Type::I16));
    assert_eq!(call.type_, Some(Type::I16));
}

#[test]
fn call_to_a_never_defined_function_fails_at_finish() {
    let (mut ctx, lines) = ctx();
    let args = ctx.make_arg_list(None, None);
    let call = ctx.make_proc_call("ghost", 1, args).unwrap();
    let block = ctx.make_block(vec![Some(call)]);
    assert!(ctx.finish(block, 1).is_none());
    assert!(
        lines.borrow().iter().any(|l| l.contains("Undeclared function \"ghost\"")),
        "got: {:?}",
        lines.borrow()
    );
}

#[test]
fn data_segment_lists_globals_in_declaration_order() {
    let (mut ctx, _) = ctx();
    let byte_t = ctx.make_type_node("byte", 1).unwrap();
    ctx.make_var_decl("first", 1, &byte_t).unwrap();
    let bound = ctx.make_bound(2, int(0), int(3));
    let bounds = ctx.make_bound_list(None, bound);
    ctx.make_array_decl("table", 2, &byte_t, bounds, None).unwrap();
    ctx.make_var_decl("second", 3, &byte_t).unwrap();
    // A constant does not occupy data space.
    ctx.make_const_decl("K", 4, &byte_t, int(1)).unwrap();

    let program = ctx.finish(None, 5).unwrap();
    let tokens: Vec<Token> = program.data.children.iter().map(Node::token).collect();
    assert_eq!(tokens, vec![Token::VarDecl, Token::VarDecl, Token::ArrayDecl]);
}

#[test]
fn alias_declared_with_at_address_of() {
    let (mut ctx, _) = ctx();
    let t = ctx.make_type_node("uinteger", 1).unwrap();
    let base = ctx.make_var_decl("g", 1, &t).unwrap();
    let address = ctx.make_address_of("g", 2);
    let alias = ctx.make_var_decl_at("h", 2, &t, address).unwrap();

    let alias_entry = ctx.symtab().entry(alias);
    assert_eq!(alias_entry.alias, Some(base));
    assert!(ctx.symtab().entry(base).aliased_by.contains(&alias));
    assert_eq!(ctx.diagnostics().error_count(), 0);
}

#[test]
fn variable_pinned_to_an_absolute_address() {
    let (mut ctx, _) = ctx();
    let t = ctx.make_type_node("byte", 1).unwrap();
    let id = ctx.make_var_decl_at("border", 1, &t, int(49152)).unwrap();
    assert_eq!(ctx.symtab().entry(id).addr, Some(49152));
}

#[test]
fn local_pinned_variable_becomes_static() {
    let (mut ctx, _) = ctx();
    let header = ctx.begin_function(FuncKind::Sub, Convention::StdCall, "s", 1);
    let params = ctx.make_param_list(None, None);
    let ret = Some(ctx.default_type_node(1));
    let header = ctx.set_function_signature(header, params, ret, 1);
    let t = ctx.make_type_node("byte", 2).unwrap();
    let id = ctx.make_var_decl_at("v", 2, &t, int(50000)).unwrap();
    assert_eq!(ctx.symtab().entry(id).scope, ScopeKind::Global);
    ctx.end_function(header, None, FuncKind::Sub, 3);
}

#[test]
fn error_limit_reports_giving_up_once() {
    let (mut ctx, lines) = ctx();
    ctx.options_mut().max_syntax_errors = 1;
    // Two undeclared-array accesses, two errors.
    let args = ctx.make_arg_list(None, None);
    ctx.make_array_access("a", 1, args, true);
    let args = ctx.make_arg_list(None, None);
    ctx.make_array_access("b", 2, args, true);
    assert!(ctx.diagnostics().is_fatal());
    let lines = lines.borrow();
    assert_eq!(lines.iter().filter(|l| l.contains(TOO_MANY_ERRORS)).count(), 1, "got: {lines:?}");
}

#[test]
fn diagnostics_carry_filename_and_line() {
    let (mut ctx, lines) = ctx();
    let args = ctx.make_arg_list(None, None);
    ctx.make_array_access("ghost", 7, args, true);
    assert!(
        lines.borrow().iter().any(|l| l.starts_with("test.bas:7: ")),
        "got: {:?}",
        lines.borrow()
    );
}

#[test]
fn case_insensitive_option_binds_mixed_case_references() {
    let (mut ctx, lines) = ctx();
    ctx.options_mut().case_insensitive = true;
    let t = ctx.make_type_node("integer", 1).unwrap();
    let id = ctx.make_var_decl("Counter", 1, &t).unwrap();
    let reference = ctx.make_id_expr("COUNTER", 2).unwrap();
    assert_eq!(reference.entry_id(), Some(id));
    // No implicit-declaration warning: the reference resolved.
    assert!(lines.borrow().is_empty(), "got: {:?}", lines.borrow());
}

#[test]
fn pragma_push_pop_brackets_an_option() {
    let (mut ctx, _) = ctx();
    ctx.options_mut().push(OptionKey::StringBase);
    ctx.options_mut().string_base = 1;
    assert_eq!(ctx.options().string_base, 1);
    assert!(ctx.options_mut().pop(OptionKey::StringBase));
    assert_eq!(ctx.options().string_base, 0);
}

#[test]
fn implicit_declaration_warns_with_the_default_type() {
    let (mut ctx, lines) = ctx();
    let reference = ctx.make_id_expr("ghost", 3).unwrap();
    assert_eq!(reference.type_, Some(Type::Float));
    assert!(
        lines.borrow().iter().any(|l| l.contains("Variable 'ghost' declared as 'float'")),
        "got: {:?}",
        lines.borrow()
    );
}

#[test]
fn finish_returns_none_when_any_error_was_reported() {
    let (mut ctx, _) = ctx();
    let args = ctx.make_arg_list(None, None);
    ctx.make_array_access("ghost", 1, args, true);
    assert!(ctx.finish(None, 1).is_none());
}
