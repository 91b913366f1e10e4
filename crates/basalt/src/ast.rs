//! The annotated syntax tree the semantic layer hands to the code emitter.
//!
//! Every tree node pairs a [`Symbol`] (the tagged payload: what kind of node
//! this is plus its per-kind data) with the source line, the resolved type
//! and the node's children. Identifier-shaped symbols do not own their
//! symbol-table entry; they store a [`SymbolId`] into the table's central
//! arena, so an entry mutated late (offsets, mangling, forward resolution)
//! is observed by every node referencing it.

use crate::{
    symtab::SymbolId,
    types::{Num, Type},
};

/// Binary operators, named the way diagnostics spell them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::Display, strum::IntoStaticStr,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum BinOp {
    Plus,
    Minus,
    #[strum(serialize = "MULT")]
    Mul,
    Div,
    Mod,
    Pow,
    Shl,
    Shr,
    #[strum(serialize = "BAND")]
    BitAnd,
    #[strum(serialize = "BOR")]
    BitOr,
    #[strum(serialize = "BXOR")]
    BitXor,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    /// Relational operators. Their result is always a `u8` boolean.
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    /// Boolean connectives, which also produce a `u8` result.
    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Xor)
    }

    /// Bit-level operators, which force floating operands down to `i32`.
    pub fn is_bitwise(self) -> bool {
        matches!(self, Self::BitAnd | Self::BitOr | Self::BitXor)
    }

    /// Whether this operator is meaningless on string operands.
    ///
    /// `PLUS` concatenates and the comparisons collate, everything else is
    /// numeric-only.
    pub fn forbidden_on_strings(self) -> bool {
        !(self == Self::Plus || self.is_comparison())
    }
}

/// Unary operators.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::Display, strum::IntoStaticStr,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum UnaryOp {
    Minus,
    Not,
    #[strum(serialize = "BNOT")]
    BitNot,
    Abs,
    /// `@identifier` — the address-of operator. Always typed `u16`.
    Address,
}

/// The loop constructs EXIT and CONTINUE can name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::Display, strum::IntoStaticStr,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum LoopKind {
    For,
    Do,
    While,
}

/// Statement-level node kinds.
///
/// The structured control-flow kinds are owned by this crate (they carry
/// loop-stack and constant-condition semantics); everything the emitter
/// alone interprets (PRINT, POKE, BORDER, ...) arrives as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SentenceKind {
    /// `IF cond THEN then-block [else-block]`; children are condition,
    /// then-block and optionally an else-block.
    If,
    /// `FOR v = start TO stop STEP step`; children are the loop variable,
    /// the three (typecast) expressions and the body block.
    For,
    /// Pre-test `WHILE cond ... WEND`; children are condition and body.
    While,
    /// `DO ... LOOP` with no condition (an infinite loop).
    DoLoop,
    /// Post-test `DO ... LOOP UNTIL cond`.
    DoUntil,
    /// Post-test `DO ... LOOP WHILE cond`.
    DoWhile,
    /// Pre-test `DO WHILE cond ... LOOP`.
    WhileDo,
    /// Pre-test `DO UNTIL cond ... LOOP`.
    UntilDo,
    Exit(LoopKind),
    Continue(LoopKind),
    /// `RETURN [expr]`; the first child names the enclosing function.
    Return,
    /// Program termination; carries the exit code expression.
    End,
    /// A break-check probe inserted between statements when the
    /// `enable_break` option is set. Carries the line number as a `u16`.
    ChkBreak,
    /// A dialect statement interpreted by the emitter only.
    Custom(String),
}

/// The tagged payload of a tree node.
///
/// One variant per node kind; identifier-shaped variants reference the
/// symbol table instead of embedding entry data.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Symbol {
    /// A plain identifier reference.
    Id(SymbolId),
    /// A numeric literal.
    Number(Num),
    /// A string literal.
    Str(String),
    Binary(BinOp),
    Unary(UnaryOp),
    /// A string slice `s$(lo TO hi)`; children are the string expression and
    /// both (rebased, `u16`) bounds.
    StrSlice,
    Sentence(SentenceKind),
    /// A flattened sequence of statements.
    Block,
    /// An inserted type conversion wrapping its single child.
    TypeCast,
    /// A type written in source (`AS integer`); `implicit` marks a type the
    /// front-end supplied rather than the programmer.
    TypeDecl { implicit: bool },
    /// Data-segment declaration of a scalar variable.
    VarDecl(SymbolId),
    /// Data-segment declaration of an array.
    ArrayDecl(SymbolId),
    /// A function/sub declaration; children are the parameter list and,
    /// once defined, the body block.
    FuncDecl(SymbolId),
    ParamDecl(SymbolId),
    /// Parameter list of a function header, with the summed stack size of
    /// the parameters (byref parameters count as a pointer).
    ParamList { size: u16 },
    /// One call argument wrapping its expression; `byref` is set by the
    /// call-site check when the matching parameter is by reference.
    Argument { byref: bool },
    ArgList,
    /// A function or procedure call.
    Call(SymbolId),
    /// An array element access; `load` distinguishes reading the element
    /// from addressing it. `offset` is the byte offset when every subscript
    /// folded to a constant.
    ArrayAccess {
        entry: SymbolId,
        load: bool,
        offset: Option<u32>,
    },
    /// A constant (but not literal) expression envelope, e.g. `@label`.
    Const,
    /// One array dimension.
    Bound { lower: i64, upper: i64 },
    BoundList,
    /// Inline assembly, passed through verbatim.
    Asm(String),
    Label(SymbolId),
}

/// Node-kind tag, used for generic dispatch and assertions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::Display, strum::IntoStaticStr,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Token {
    Id,
    Number,
    String,
    Binary,
    Unary,
    StrSlice,
    Sentence,
    Block,
    Cast,
    Type,
    VarDecl,
    ArrayDecl,
    FuncDecl,
    ParamDecl,
    ParamList,
    Argument,
    ArgList,
    #[strum(serialize = "FUNCCALL")]
    Call,
    ArrayAccess,
    ArrayLoad,
    Const,
    Bound,
    BoundList,
    Asm,
    Label,
}

/// A node of the annotated AST.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub symbol: Symbol,
    pub line: u32,
    /// The resolved type; `None` until inference or declaration supplies it.
    #[serde(rename = "type")]
    pub type_: Option<Type>,
    /// Temporary register name, written by the emitter.
    pub temp: Option<String>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(symbol: Symbol, line: u32) -> Self {
        Self {
            symbol,
            line,
            type_: None,
            temp: None,
            children: Vec::new(),
        }
    }

    pub fn with_type(mut self, type_: Type) -> Self {
        self.type_ = Some(type_);
        self
    }

    pub fn with_children(mut self, children: Vec<Self>) -> Self {
        self.children = children;
        self
    }

    /// Builds a numeric literal node, typed from its value unless a type is
    /// given.
    pub fn number(value: Num, type_: Option<Type>, line: u32) -> Self {
        Self::new(Symbol::Number(value), line).with_type(type_.unwrap_or_else(|| value.type_of()))
    }

    /// Builds a string literal node.
    pub fn string(text: impl Into<String>, line: u32) -> Self {
        Self::new(Symbol::Str(text.into()), line).with_type(Type::Str)
    }

    /// The node-kind tag of this node.
    pub fn token(&self) -> Token {
        match &self.symbol {
            Symbol::Id(_) => Token::Id,
            Symbol::Number(_) => Token::Number,
            Symbol::Str(_) => Token::String,
            Symbol::Binary(_) => Token::Binary,
            Symbol::Unary(_) => Token::Unary,
            Symbol::StrSlice => Token::StrSlice,
            Symbol::Sentence(_) => Token::Sentence,
            Symbol::Block => Token::Block,
            Symbol::TypeCast => Token::Cast,
            Symbol::TypeDecl { .. } => Token::Type,
            Symbol::VarDecl(_) => Token::VarDecl,
            Symbol::ArrayDecl(_) => Token::ArrayDecl,
            Symbol::FuncDecl(_) => Token::FuncDecl,
            Symbol::ParamDecl(_) => Token::ParamDecl,
            Symbol::ParamList { .. } => Token::ParamList,
            Symbol::Argument { .. } => Token::Argument,
            Symbol::ArgList => Token::ArgList,
            Symbol::Call(_) => Token::Call,
            Symbol::ArrayAccess { load, .. } => {
                if *load {
                    Token::ArrayLoad
                } else {
                    Token::ArrayAccess
                }
            }
            Symbol::Const => Token::Const,
            Symbol::Bound { .. } => Token::Bound,
            Symbol::BoundList => Token::BoundList,
            Symbol::Asm(_) => Token::Asm,
            Symbol::Label(_) => Token::Label,
        }
    }

    /// The literal numeric value, if this node is a `Number`.
    pub fn num(&self) -> Option<Num> {
        match self.symbol {
            Symbol::Number(value) => Some(value),
            _ => None,
        }
    }

    /// The literal text, if this node is a `String`.
    pub fn text(&self) -> Option<&str> {
        match &self.symbol {
            Symbol::Str(text) => Some(text),
            _ => None,
        }
    }

    /// The referenced symbol-table entry, for every identifier-shaped node.
    pub fn entry_id(&self) -> Option<SymbolId> {
        match self.symbol {
            Symbol::Id(id)
            | Symbol::VarDecl(id)
            | Symbol::ArrayDecl(id)
            | Symbol::FuncDecl(id)
            | Symbol::ParamDecl(id)
            | Symbol::Call(id)
            | Symbol::ArrayAccess { entry: id, .. }
            | Symbol::Label(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self.symbol, Symbol::Number(_))
    }

    pub fn is_string_lit(&self) -> bool {
        matches!(self.symbol, Symbol::Str(_))
    }

    pub fn is_const_expr(&self) -> bool {
        matches!(self.symbol, Symbol::Const)
    }

    /// The number of dimensions/arguments of a `BoundList` or `ArgList`.
    pub fn count(&self) -> usize {
        debug_assert!(
            matches!(self.symbol, Symbol::BoundList | Symbol::ArgList | Symbol::ParamList { .. }),
            "count() called on a non-list node"
        );
        self.children.len()
    }

    /// Total element count of a `BoundList` (the product of its dimensions).
    pub fn bound_cells(&self) -> u64 {
        self.children
            .iter()
            .map(|bound| match bound.symbol {
                Symbol::Bound { lower, upper } => (upper - lower + 1) as u64,
                _ => unreachable!("BoundList child is always a Bound"),
            })
            .product()
    }
}
