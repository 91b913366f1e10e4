//! The compilation context: every piece of state one compilation unit
//! mutates, bundled into a single struct threaded through the factories.
//!
//! The parser driver owns a `Context`, calls factory methods on it for each
//! grammar reduction, and hands the finished program to
//! [`Context::finish`](crate::resolve). Nothing here is process-global, so
//! compiling two units back to back (or in two threads) cannot leak state.

use crate::{
    ast::LoopKind,
    diag::{DiagnosticSink, Diagnostics, Reporter, StderrSink},
    options::Options,
    symtab::{IdEntry, SymbolId, SymbolTable},
};

/// One entry of the loop stack: which construct we are inside and, for FOR
/// loops, its control variable (NEXT checks it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopInfo {
    pub kind: LoopKind,
    pub for_variable: Option<SymbolId>,
}

/// A call site whose callee was not yet declared when parsed; checked after
/// the whole unit is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingCall {
    pub entry: SymbolId,
    pub line: u32,
}

/// State of one compilation unit.
pub struct Context {
    pub(crate) symtab: SymbolTable,
    pub(crate) diags: Diagnostics,
    pub(crate) options: Options,
    pub(crate) filename: String,
    /// Innermost-last stack of enclosing loop constructs.
    pub(crate) loops: Vec<LoopInfo>,
    /// Loop stacks of enclosing scopes, saved on scope entry. A function
    /// body starts with an empty loop stack: EXIT cannot leave a loop of
    /// the caller.
    pub(crate) meta_loops: Vec<Vec<LoopInfo>>,
    /// Stack of function entries whose bodies are being parsed.
    pub(crate) function_level: Vec<SymbolId>,
    pub(crate) pending_calls: Vec<PendingCall>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("filename", &self.filename)
            .field("diags", &self.diags)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Creates a context writing diagnostics to stderr.
    pub fn new(filename: impl Into<String>, options: Options) -> Self {
        Self::with_sink(filename, options, Box::new(StderrSink))
    }

    /// Creates a context with a caller-provided diagnostic sink.
    pub fn with_sink(filename: impl Into<String>, options: Options, sink: Box<dyn DiagnosticSink>) -> Self {
        Self {
            symtab: SymbolTable::new(),
            diags: Diagnostics::new(sink),
            options,
            filename: filename.into(),
            loops: Vec::new(),
            meta_loops: Vec::new(),
            function_level: Vec::new(),
            pending_calls: Vec::new(),
        }
    }

    pub fn symtab(&self) -> &SymbolTable {
        &self.symtab
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diags
    }

    /// Shorthand for an entry of the symbol table.
    pub fn entry(&self, id: SymbolId) -> &IdEntry {
        self.symtab.entry(id)
    }

    /// A reporter borrowing the whole context. Factory internals that also
    /// need the symbol table split the fields directly instead.
    pub(crate) fn reporter(&mut self) -> Reporter<'_> {
        Reporter::new(&mut self.diags, &self.filename, self.options.max_syntax_errors)
    }

    /// Splits the context into the symbol table and a reporter over the
    /// remaining fields, for operations needing both mutably.
    pub(crate) fn table_and_reporter(&mut self) -> (&mut SymbolTable, Reporter<'_>) {
        (
            &mut self.symtab,
            Reporter::new(&mut self.diags, &self.filename, self.options.max_syntax_errors),
        )
    }

    pub(crate) fn error(&mut self, line: u32, message: impl Into<std::borrow::Cow<'static, str>>) {
        self.diags
            .error(&self.filename, line, message, self.options.max_syntax_errors);
    }

    pub(crate) fn warning(&mut self, line: u32, message: impl Into<std::borrow::Cow<'static, str>>) {
        self.diags.warning(&self.filename, line, message);
    }

    // -----------------------------------------------------------------
    // Scope bracketing
    // -----------------------------------------------------------------

    /// Enters a function scope. Saves and resets the loop stack: loops do
    /// not cross function boundaries.
    pub fn enter_scope(&mut self, funcname: &str) {
        self.symtab.enter_scope(funcname);
        self.meta_loops.push(std::mem::take(&mut self.loops));
    }

    /// Leaves the current function scope, restoring the saved loop stack.
    /// Returns the local frame size and the captured local symbol list.
    pub fn leave_scope(&mut self) -> (u16, Vec<SymbolId>) {
        let result = self.symtab.leave_scope();
        self.loops = self.meta_loops.pop().unwrap_or_default();
        result
    }

    // -----------------------------------------------------------------
    // Loop stack
    // -----------------------------------------------------------------

    pub(crate) fn push_loop(&mut self, kind: LoopKind, for_variable: Option<SymbolId>) {
        self.loops.push(LoopInfo { kind, for_variable });
    }

    pub(crate) fn pop_loop(&mut self) -> Option<LoopInfo> {
        self.loops.pop()
    }

    /// Whether any enclosing loop (in this scope) is of the given kind.
    pub(crate) fn in_loop(&self, kind: LoopKind) -> bool {
        self.loops.iter().any(|info| info.kind == kind)
    }

    /// The innermost loop, if any.
    pub(crate) fn innermost_loop(&self) -> Option<&LoopInfo> {
        self.loops.last()
    }

    /// The function or sub whose body is currently being parsed.
    pub fn current_function(&self) -> Option<SymbolId> {
        self.function_level.last().copied()
    }
}
