//! Post-parse fix-up: resolving forward references, checking deferred call
//! sites and building the data segment.
//!
//! Grammar order lets a program mention identifiers before their
//! declaration (GOTO targets, functions defined later). Once the whole unit
//! is in, [`Context::finish`] walks the tree, resolves what it can and
//! reports what never resolved.

use crate::{
    ast::{Node, Symbol},
    context::Context,
    symtab::{Class, SymbolId},
};

/// The front-end's result: the two roots handed to the code emitter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Program {
    /// Statements and function bodies, terminated by an implicit `END 0`.
    pub ast: Node,
    /// Data segment: one declaration node per global variable and array, in
    /// declaration order.
    pub data: Node,
}

impl Context {
    /// Completes the compilation unit.
    ///
    /// Appends the implicit `END 0`, resolves pending identifier references
    /// and deferred call sites, and builds the data segment. Returns `None`
    /// when any error was reported, during parsing or here.
    pub fn finish(&mut self, program: Option<Node>, line: u32) -> Option<Program> {
        let end = self.make_end(line, None);
        let mut ast = self
            .make_block(vec![program, Some(end)])
            .expect("the END sentence makes the program non-empty");

        self.resolve_names(&mut ast);
        self.check_pending_calls();

        if self.diags.error_count() > 0 || self.diags.is_fatal() {
            return None;
        }

        let mut data = Node::new(Symbol::Block, 0);
        for id in self.symtab.global_vars() {
            data.children.push(self.make_var_declaration(id));
        }
        for id in self.symtab.global_arrays() {
            data.children.push(self.make_array_declaration(id));
        }
        Some(Program { ast, data })
    }

    /// Walks the whole tree with an explicit work list (recursion depth must
    /// not scale with program length): verifies every identifier resolved to
    /// a declared class, fills in types learned late, and runs the call-site
    /// check on calls whose callee was declared after the call.
    fn resolve_names(&mut self, root: &mut Node) {
        let mut stack: Vec<&mut Node> = vec![root];
        while let Some(node) = stack.pop() {
            let line = node.line;
            let reference = match &node.symbol {
                Symbol::Id(id) => Some((*id, false)),
                Symbol::Call(id) => Some((*id, true)),
                _ => None,
            };
            if let Some((id, is_call)) = reference {
                let entry = self.symtab.entry(id);
                if entry.class.is_none() {
                    // The reference never resolved in place; a declaration
                    // elsewhere (a label hoisted out of a later function
                    // body) may have superseded this entry, so retry by
                    // name before giving up.
                    let name = entry.name.clone();
                    match self.symtab.get_entry(&name, None) {
                        Some(found) if self.symtab.entry(found).class.is_some() => {
                            node.symbol = Symbol::Id(found);
                            node.type_ = self.symtab.entry(found).type_;
                        }
                        _ => self.error(line, format!("Undeclared identifier \"{name}\"")),
                    }
                } else if is_call {
                    if self.symtab.entry(id).declared
                        && let Some(args) = node.children.first_mut()
                    {
                        self.check_call_arguments(line, id, args);
                    }
                    node.type_ = self.symtab.entry(id).type_;
                } else if node.type_.is_none() {
                    node.type_ = self.symtab.entry(id).type_;
                }
            }
            stack.extend(node.children.iter_mut());
        }
    }

    /// Re-checks every call whose callee was undeclared when parsed. The
    /// argument lists themselves were already fixed by the tree walk; what
    /// is left to verify is that a definition arrived at all.
    fn check_pending_calls(&mut self) -> bool {
        let pending = std::mem::take(&mut self.pending_calls);
        let mut ok = true;
        for call in pending {
            let entry = self.symtab.entry(call.entry);
            if !entry.declared || entry.class != Some(Class::Function) {
                let name = entry.name.clone();
                self.error(call.line, format!("Undeclared function \"{name}\""));
                ok = false;
            }
        }
        ok
    }

    /// Builds the data-segment node for a global scalar.
    fn make_var_declaration(&self, id: SymbolId) -> Node {
        let entry = self.symtab.entry(id);
        let mut node = Node::new(Symbol::VarDecl(id), entry.line);
        node.type_ = entry.type_;
        node
    }

    /// Builds the data-segment node for a global array.
    fn make_array_declaration(&self, id: SymbolId) -> Node {
        let entry = self.symtab.entry(id);
        let mut node = Node::new(Symbol::ArrayDecl(id), entry.line);
        node.type_ = entry.type_;
        node
    }
}
