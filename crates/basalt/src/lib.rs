#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is checked")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts are intentional")]
#![expect(clippy::cast_possible_wrap, reason = "wrap behavior mirrors the target's arithmetic")]

mod ast;
mod context;
mod diag;
mod exprs;
mod options;
mod resolve;
mod stmts;
mod symtab;
mod types;

pub use crate::{
    ast::{BinOp, LoopKind, Node, SentenceKind, Symbol, Token, UnaryOp},
    context::{Context, LoopInfo},
    diag::{CollectSink, Diagnostic, DiagnosticSink, Diagnostics, Severity, StderrSink, TOO_MANY_ERRORS},
    exprs::{MAX_SLICE_INDEX, MIN_SLICE_INDEX},
    options::{OptionKey, Options},
    resolve::Program,
    symtab::{
        Bound, Class, Convention, DefaultValue, FuncKind, IdEntry, ScopeKind, SymbolId, SymbolTable, strip_suffix,
    },
    types::{FoldError, Num, PTR_TYPE, Type, common_type},
};
