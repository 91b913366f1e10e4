//! Statement factories: declarations, blocks, labels and the structured
//! control-flow layer.
//!
//! The grammar driver calls these once per reduction. Scope-sensitive
//! constructs come in bracketing pairs: `begin_function` /
//! `set_function_signature` / `end_function` around a body,
//! `begin_loop` before a loop body and the matching `make_*` afterwards.

use smallvec::SmallVec;

use crate::{
    ast::{LoopKind, Node, SentenceKind, Symbol, Token, UnaryOp},
    context::Context,
    symtab::{Bound, Class, Convention, DefaultValue, FuncKind, ScopeKind, SymbolId},
    types::{Num, Type, common_type},
};

/// Extracts the `(type, implicit)` pair of a TypeDecl node.
fn type_decl_parts(node: &Node) -> (Type, bool) {
    match node.symbol {
        Symbol::TypeDecl { implicit } => (node.type_.expect("TypeDecl always carries its type"), implicit),
        _ => unreachable!("expected a TypeDecl node"),
    }
}

impl Context {
    // -----------------------------------------------------------------
    // Blocks, sentences, labels
    // -----------------------------------------------------------------

    /// Chains statements into a block, dropping failed parts and flattening
    /// nested blocks. Returns `None` for an empty chain.
    pub fn make_block(&mut self, parts: Vec<Option<Node>>) -> Option<Node> {
        let mut flattened: Vec<Node> = Vec::new();
        for part in parts.into_iter().flatten() {
            if part.token() == Token::Block {
                flattened.extend(part.children);
            } else {
                flattened.push(part);
            }
        }
        let first_line = flattened.first().map(|n| n.line)?;
        Some(Node::new(Symbol::Block, first_line).with_children(flattened))
    }

    /// Joins two consecutive program lines, inserting a break-check probe
    /// when the `enable_break` option is on.
    pub fn chain_program(&mut self, line: u32, previous: Option<Node>, next: Option<Node>) -> Option<Node> {
        if self.options.enable_break {
            let probe = Node::new(Symbol::Sentence(SentenceKind::ChkBreak), line)
                .with_children(vec![Node::number(Num::Int(i64::from(line)), Some(Type::U16), line)]);
            self.make_block(vec![previous, next, Some(probe)])
        } else {
            self.make_block(vec![previous, next])
        }
    }

    /// Builds a generic sentence node. Failed arguments are dropped.
    pub fn make_sentence(&mut self, line: u32, kind: SentenceKind, args: Vec<Option<Node>>) -> Node {
        Node::new(Symbol::Sentence(kind), line).with_children(args.into_iter().flatten().collect())
    }

    /// Builds an inline-assembly statement, passed through verbatim.
    pub fn make_asm(&mut self, asm: impl Into<String>, line: u32) -> Node {
        Node::new(Symbol::Asm(asm.into()), line)
    }

    /// Declares a label (line numbers included) and returns its statement
    /// node. Labels are hoisted to the global scope.
    pub fn make_label(&mut self, name: &str, line: u32) -> Option<Node> {
        let caseins = self.options.case_insensitive;
        let (symtab, mut rep) = self.table_and_reporter();
        let id = symtab.declare_label(name, line, caseins, &mut rep)?;
        let mut node = Node::new(Symbol::Label(id), line);
        node.type_ = self.symtab.entry(id).type_;
        Some(node)
    }

    /// References a label (e.g. a GOTO target), creating an unresolved
    /// entry when it has not been declared yet. The post-parse fix-up
    /// verifies every such reference resolved.
    pub fn make_label_ref(&mut self, name: &str, line: u32) -> Node {
        let caseins = self.options.case_insensitive;
        let id = self.symtab.access_id(name, line, caseins);
        self.symtab.entry_mut(id).accessed = true;
        self.id_node(id, line)
    }

    // -----------------------------------------------------------------
    // Types
    // -----------------------------------------------------------------

    /// Resolves a written type name (`AS integer`) to a TypeDecl node.
    pub fn make_type_node(&mut self, name: &str, line: u32) -> Option<Node> {
        match Type::from_basic_name(name) {
            Some(type_) => Some(Node::new(Symbol::TypeDecl { implicit: false }, line).with_type(type_)),
            None => {
                self.error(line, format!("Unknown type '{name}'"));
                None
            }
        }
    }

    /// The TypeDecl node used when a declaration has no `AS` clause.
    pub fn default_type_node(&mut self, line: u32) -> Node {
        let type_ = self.options.default_type;
        Node::new(Symbol::TypeDecl { implicit: true }, line).with_type(type_)
    }

    // -----------------------------------------------------------------
    // Variable / constant declarations
    // -----------------------------------------------------------------

    /// Declares one scalar variable (`DIM a AS byte`). Returns its entry.
    ///
    /// Declarations produce no statement node: globals surface in the data
    /// segment built by [`Context::finish`](crate::resolve), locals in the
    /// frame layout.
    pub fn make_var_decl(&mut self, name: &str, line: u32, type_node: &Node) -> Option<SymbolId> {
        let (type_, implicit) = type_decl_parts(type_node);
        let caseins = self.options.case_insensitive;
        let (symtab, mut rep) = self.table_and_reporter();
        symtab.declare_variable(name, line, type_, implicit, caseins, &mut rep)
    }

    /// Declares an initialized variable (`DIM a AS byte = 300`).
    ///
    /// The initializer must be a constant; it is cast to the declared type
    /// at compile time (warning if digits are lost).
    pub fn make_var_decl_initialized(
        &mut self,
        name: &str,
        line: u32,
        type_node: &Node,
        value: Option<Node>,
    ) -> Option<SymbolId> {
        let default = self.fold_initializer(name, line, type_node, value)?;
        let id = self.make_var_decl(name, line, type_node)?;
        self.symtab.entry_mut(id).default_value = Some(default);
        Some(id)
    }

    /// Declares a constant (`CONST x AS integer = 42`).
    pub fn make_const_decl(&mut self, name: &str, line: u32, type_node: &Node, value: Option<Node>) -> Option<SymbolId> {
        let default = self.fold_initializer(name, line, type_node, value)?;
        let (type_, implicit) = type_decl_parts(type_node);
        let caseins = self.options.case_insensitive;
        let (symtab, mut rep) = self.table_and_reporter();
        symtab.declare_const(name, line, type_, implicit, default, caseins, &mut rep)
    }

    /// Casts and folds a declaration initializer down to a stored value.
    fn fold_initializer(&mut self, name: &str, line: u32, type_node: &Node, value: Option<Node>) -> Option<DefaultValue> {
        let value = value?;
        let (type_, _) = type_decl_parts(type_node);
        if self.node_num(&value).is_none() && !value.is_const_expr() {
            if let Some(found) = value.type_ {
                self.error(
                    line,
                    format!("Variable '{name}' declared as '{type_}' but initialized with a '{found}' value"),
                );
            } else {
                self.error(line, "Initial value must be a constant expression");
            }
            return None;
        }
        let cast = self.make_typecast(type_, Some(value))?;
        match (&cast.symbol, self.node_num(&cast)) {
            (Symbol::Const, _) => Some(DefaultValue::Const(cast)),
            (_, Some(folded)) => Some(DefaultValue::Num(folded)),
            _ => Some(DefaultValue::Const(cast)),
        }
    }

    /// Declares a variable pinned with `AT`: to an absolute address, to
    /// another variable (`AT @v` — an alias), or to an array element with
    /// constant subscripts.
    pub fn make_var_decl_at(&mut self, name: &str, line: u32, type_node: &Node, at: Option<Node>) -> Option<SymbolId> {
        let at = at?;
        let id = self.make_var_decl(name, line, type_node)?;

        // The address-of operator on a link-time-constant target arrives
        // wrapped in a CONST envelope; unwrap before dispatching.
        let at = if at.is_const_expr() {
            at.children.into_iter().next().expect("CONST envelope has an inner expression")
        } else {
            at
        };

        if let Symbol::Unary(UnaryOp::Address) = at.symbol {
            let target = at.children.into_iter().next().expect("address-of has an operand");
            match target.symbol {
                Symbol::Id(target_id) => {
                    self.symtab.make_alias(id, target_id);
                    Some(id)
                }
                Symbol::ArrayAccess {
                    entry,
                    offset: Some(offset),
                    ..
                } => {
                    self.symtab.make_alias(id, entry);
                    self.symtab.entry_mut(id).offset = Some(offset as i32);
                    Some(id)
                }
                Symbol::ArrayAccess { offset: None, .. } => {
                    self.error(line, "Address is not constant. Only constant subscripts are allowed");
                    None
                }
                _ => {
                    self.error(line, "Only address of identifiers are allowed");
                    None
                }
            }
        } else if self.node_num(&at).is_none() {
            self.error(line, "Address must be a numeric constant expression");
            None
        } else {
            let cast = self.make_typecast(Type::U16, Some(at))?;
            let addr = self.node_num(&cast)?.trunc_i64();
            self.symtab.entry_mut(id).addr = Some(addr as u16);
            if self.symtab.entry(id).scope == ScopeKind::Local {
                let bare = self.symtab.entry(id).name.clone();
                self.symtab.make_static(&bare);
            }
            Some(id)
        }
    }

    // -----------------------------------------------------------------
    // Array declarations
    // -----------------------------------------------------------------

    /// Builds one explicit array dimension (`lower TO upper`). Bounds must
    /// be non-negative constants with `lower <= upper`.
    pub fn make_bound(&mut self, line: u32, lower: Option<Node>, upper: Option<Node>) -> Option<Node> {
        let lower = lower?;
        let upper = upper?;
        let (Some(lo), Some(up)) = (self.node_num(&lower), self.node_num(&upper)) else {
            self.error(line, "Array bounds must be constants");
            return None;
        };
        let lo = lo.trunc_i64();
        let up = up.trunc_i64();
        if lo < 0 {
            self.error(line, "Array bounds must be greater than 0");
            return None;
        }
        if lo > up {
            self.error(line, "Lower array bound must be less or equal to upper one");
            return None;
        }
        Some(Node::new(Symbol::Bound { lower: lo, upper: up }, line))
    }

    /// Builds a single-argument dimension: the lower bound is the
    /// `array_base` option.
    pub fn make_bound_single(&mut self, line: u32, upper: Option<Node>) -> Option<Node> {
        let base = Node::number(Num::Int(self.options.array_base), None, line);
        self.make_bound(line, Some(base), upper)
    }

    /// Appends a dimension to a bound list, creating the list as needed.
    pub fn make_bound_list(&mut self, list: Option<Node>, bound: Option<Node>) -> Option<Node> {
        let bound = bound?;
        let mut list = match list {
            None => Node::new(Symbol::BoundList, bound.line),
            Some(node) if node.token() == Token::BoundList => node,
            Some(node) => Node::new(Symbol::BoundList, node.line).with_children(vec![node]),
        };
        list.children.push(bound);
        Some(list)
    }

    /// Builds one row of a constant initializer vector; every element must
    /// fold to a number.
    pub fn make_const_row(&mut self, line: u32, elements: Vec<Option<Node>>) -> Option<DefaultValue> {
        let mut row = Vec::with_capacity(elements.len());
        for element in elements {
            let element = element?;
            match self.node_num(&element) {
                Some(value) => row.push(DefaultValue::Num(value)),
                None => {
                    self.error(line, "Initial value must be a constant expression");
                    return None;
                }
            }
        }
        Some(DefaultValue::Vector(row))
    }

    /// Combines initializer rows into a vector, verifying all rows have the
    /// same number of elements.
    pub fn make_const_vector(&mut self, line: u32, rows: Vec<Option<DefaultValue>>) -> Option<DefaultValue> {
        let rows: Option<Vec<DefaultValue>> = rows.into_iter().collect();
        let rows = rows?;
        let mut lengths = rows.iter().map(|row| match row {
            DefaultValue::Vector(items) => items.len(),
            _ => 1,
        });
        if let Some(first) = lengths.next()
            && lengths.any(|len| len != first)
        {
            self.error(line, "All rows must have the same number of elements");
            return None;
        }
        Some(DefaultValue::Vector(rows))
    }

    /// Verifies an initializer vector matches the declared bounds,
    /// dimension by dimension.
    fn check_vector_bounds(&mut self, line: u32, bounds: &[Bound], value: &DefaultValue) -> bool {
        match value {
            DefaultValue::Vector(items) => {
                let Some(bound) = bounds.first() else {
                    self.error(line, "Unexpected extra vector dimensions");
                    return false;
                };
                let expected = bound.cells() as usize;
                if items.len() != expected {
                    self.error(line, format!("Mismatched vector size. Expected {expected}, got {}.", items.len()));
                    return false;
                }
                items.iter().all(|item| self.check_vector_bounds(line, &bounds[1..], item))
            }
            _ => {
                if bounds.is_empty() {
                    true
                } else {
                    self.error(
                        line,
                        format!("Mismatched vector size. Missing {} extra dimension(s)", bounds.len()),
                    );
                    false
                }
            }
        }
    }

    /// Declares an array (`DIM a(1 TO 3, 0 TO 2) AS byte`), optionally with
    /// a constant initializer vector.
    pub fn make_array_decl(
        &mut self,
        name: &str,
        line: u32,
        type_node: &Node,
        bounds: Option<Node>,
        initializer: Option<DefaultValue>,
    ) -> Option<SymbolId> {
        let bounds = bounds?;
        let (type_, implicit) = type_decl_parts(type_node);
        let dims: SmallVec<[Bound; 4]> = bounds
            .children
            .iter()
            .map(|b| match b.symbol {
                Symbol::Bound { lower, upper } => Bound { lower, upper },
                _ => unreachable!("BoundList child is always a Bound"),
            })
            .collect();
        if let Some(ref vector) = initializer
            && !self.check_vector_bounds(line, &dims, vector)
        {
            return None;
        }
        let caseins = self.options.case_insensitive;
        let (symtab, mut rep) = self.table_and_reporter();
        symtab.declare_array(name, line, type_, implicit, dims, initializer, caseins, &mut rep)
    }

    // -----------------------------------------------------------------
    // Parameters
    // -----------------------------------------------------------------

    /// Declares one function parameter. `byref` of `None` takes the
    /// `byref` option's default.
    pub fn make_param_decl(&mut self, name: &str, line: u32, type_node: &Node, byref: Option<bool>) -> Option<Node> {
        let (type_, _) = type_decl_parts(type_node);
        let byref = byref.unwrap_or(self.options.byref);
        let caseins = self.options.case_insensitive;
        let (symtab, mut rep) = self.table_and_reporter();
        let id = symtab.declare_param(name, line, type_, byref, caseins, &mut rep)?;
        let mut node = Node::new(Symbol::ParamDecl(id), line);
        node.type_ = Some(type_);
        Some(node)
    }

    /// Appends a parameter to a parameter list, assigning its stack offset.
    ///
    /// A parameter's stack cost is its type size rounded up to even bytes
    /// (the call sequence pushes whole words); byref parameters cost one
    /// pointer.
    pub fn make_param_list(&mut self, list: Option<Node>, param: Option<Node>) -> Option<Node> {
        let mut list = match list {
            None => Node::new(Symbol::ParamList { size: 0 }, param.as_ref().map_or(0, |p| p.line)),
            Some(node) if node.token() == Token::ParamList => node,
            Some(node) => {
                let wrapped = Node::new(Symbol::ParamList { size: 0 }, node.line);
                let wrapped = Some(wrapped);
                self.make_param_list(wrapped, Some(node))?
            }
        };
        let Some(param) = param else { return Some(list) };

        let Symbol::ParamList { size } = list.symbol else { unreachable!() };
        let id = param.entry_id().expect("ParamDecl references its entry");
        let entry = self.symtab.entry(id);
        let cost = if entry.byref {
            Type::U16.size()
        } else {
            let raw = entry.size();
            raw + raw % 2
        };
        if self.symtab.entry(id).offset.is_none() {
            self.symtab.entry_mut(id).offset = Some(i32::from(size));
        }
        list.symbol = Symbol::ParamList { size: size + cost };
        list.children.push(param);
        Some(list)
    }

    // -----------------------------------------------------------------
    // Functions and subs
    // -----------------------------------------------------------------

    /// Opens a function or sub definition: declares the name, enters its
    /// scope and pushes it on the function level. Always brackets with
    /// [`Context::end_function`] (or [`Context::forward_function`] for a
    /// `DECLARE`).
    pub fn begin_function(&mut self, kind: FuncKind, convention: Convention, name: &str, line: u32) -> Option<Node> {
        let caseins = self.options.case_insensitive;
        let declared = {
            let (symtab, mut rep) = self.table_and_reporter();
            symtab.declare_func(name, line, caseins, &mut rep)
        };
        self.enter_scope(name);
        let id = declared?;
        self.symtab.entry_mut(id).declared = true;
        self.symtab.entry_mut(id).convention = convention;
        self.function_level.push(id);
        {
            let (symtab, mut rep) = self.table_and_reporter();
            symtab.set_kind(id, kind, line, &mut rep);
        }
        let mut node = Node::new(Symbol::FuncDecl(id), line);
        node.type_ = self.symtab.entry(id).type_;
        Some(node)
    }

    /// Attaches the parameter list and return type to an open function
    /// header, checking a forward declaration's signature when present.
    pub fn set_function_signature(
        &mut self,
        header: Option<Node>,
        params: Option<Node>,
        type_node: Option<Node>,
        line: u32,
    ) -> Option<Node> {
        let mut header = header?;
        let params = params?;
        let type_node = type_node?;
        let id = header.entry_id().expect("FuncDecl references its entry");
        let (return_type, implicit) = type_decl_parts(&type_node);
        let forwarded = self.symtab.entry(id).forwarded;
        let name = self.symtab.entry(id).name.clone();

        let Symbol::ParamList { size: params_size } = params.symbol else {
            unreachable!("function header parameter list is a ParamList")
        };

        let previous_type = self.symtab.entry(id).type_;
        if !implicit || previous_type.is_none() {
            self.symtab.entry_mut(id).type_ = Some(return_type);
        }
        if forwarded && previous_type.is_some() && previous_type != self.symtab.entry(id).type_ {
            self.error(line, format!("Function '{name}' type mismatch"));
            return None;
        }

        if forwarded {
            let declared_params = self.symtab.entry(id).params.clone().expect("forwarded function recorded its params");
            if declared_params.children.len() != params.children.len() {
                self.error(line, format!("Function '{name}' parameter mismatch"));
                return None;
            }
            // Type/byref mismatches win over rename warnings: a renamed
            // parameter with a changed type reports only the error.
            let pairs: Vec<(SymbolId, SymbolId)> = declared_params
                .children
                .iter()
                .zip(params.children.iter())
                .map(|(a, b)| (a.entry_id().expect("ParamDecl"), b.entry_id().expect("ParamDecl")))
                .collect();
            for &(before, after) in &pairs {
                let a = self.symtab.entry(before);
                let b = self.symtab.entry(after);
                if a.type_ != b.type_ || a.byref != b.byref {
                    self.error(line, format!("Function '{name}' parameter mismatch"));
                    return None;
                }
            }
            for &(before, after) in &pairs {
                let old = self.symtab.entry(before).name.clone();
                let new = self.symtab.entry(after).name.clone();
                if old != new {
                    self.warning(
                        line,
                        format!("Parameter '{old}' in function '{name}' has been renamed to '{new}'"),
                    );
                }
            }
        } else {
            self.symtab.entry_mut(id).params_size = params_size;
        }

        let kind = self.symtab.entry(id).kind;
        if kind == Some(FuncKind::Sub) && !implicit {
            self.error(line, "SUBs cannot have a return type definition");
            return None;
        }
        if self.symtab.entry(id).convention == Convention::FastCall && params.children.len() > 1 {
            let keyword = kind.map_or("FUNCTION", FuncKind::keyword);
            self.warning(
                line,
                format!("{keyword} '{name}' declared as FASTCALL with {} parameters", params.children.len()),
            );
        }

        self.symtab.entry_mut(id).params = Some(params.clone());
        header.type_ = self.symtab.entry(id).type_;
        header.children.push(params);
        Some(header)
    }

    /// Closes a function body (`END FUNCTION` / `END SUB`): finalizes the
    /// local frame, captures the local symbol table and attaches the body.
    pub fn end_function(&mut self, header: Option<Node>, body: Option<Node>, end_kind: FuncKind, line: u32) -> Option<Node> {
        let (locals_size, local_symbols) = if self.symtab.in_local_scope() {
            self.leave_scope()
        } else {
            (0, Vec::new())
        };
        let Some(id) = self.function_level.pop() else {
            self.error(
                line,
                format!("Unexpected token 'END {}'. No Function or Sub has been defined.", end_kind.keyword()),
            );
            return None;
        };

        match self.symtab.entry(id).kind {
            None => return None,
            Some(kind) if kind != end_kind => {
                self.error(
                    line,
                    format!("Unexpected token 'END {}'. Should be 'END {}'", end_kind.keyword(), kind.keyword()),
                );
                return None;
            }
            Some(_) => {}
        }

        let entry = self.symtab.entry_mut(id);
        entry.locals_size = locals_size;
        entry.local_symbols = Some(local_symbols);
        entry.forwarded = false;

        let mut header = header?;
        if let Some(body) = body {
            header.children.push(body);
        }
        Some(header)
    }

    /// Records a forward declaration (`DECLARE FUNCTION ...`): closes the
    /// header scope and flags the entry as awaiting its definition.
    pub fn forward_function(&mut self, header: Option<Node>, line: u32) -> Option<()> {
        if self.symtab.in_local_scope() {
            self.leave_scope();
        }
        let popped = self.function_level.pop();
        let header = header?;
        let id = header.entry_id().expect("FuncDecl references its entry");
        debug_assert_eq!(popped, Some(id), "forward declaration closes its own header");
        if self.symtab.entry(id).forwarded {
            let name = self.symtab.entry(id).name.clone();
            self.error(line, format!("duplicated declaration for function '{name}'"));
        }
        self.symtab.entry_mut(id).forwarded = true;
        Some(())
    }

    // -----------------------------------------------------------------
    // Control flow
    // -----------------------------------------------------------------

    /// Builds an IF sentence. A constant condition warns; with
    /// `optimization > 0` the dead branch is eliminated.
    pub fn make_if(&mut self, line: u32, condition: Option<Node>, then_: Option<Node>, else_: Option<Node>) -> Option<Node> {
        let condition = condition?;
        if then_.is_none() && else_.is_none() {
            self.warning(line, "Useless empty IF ignored");
            return None;
        }
        if let Some(value) = self.node_num(&condition) {
            let truthy = !value.is_zero();
            self.reporter().warning_condition_is_always(line, truthy);
            if self.options.optimization > 0 {
                return if truthy { then_ } else { else_ };
            }
        }
        let then_block = then_.unwrap_or_else(|| Node::new(Symbol::Block, line));
        let mut children = vec![condition, then_block];
        if let Some(else_block) = else_ {
            children.push(else_block);
        }
        Some(Node::new(Symbol::Sentence(SentenceKind::If), line).with_children(children))
    }

    /// Pushes a loop construct on the loop stack. FOR loops use
    /// [`Context::make_for_start`] instead, which records the control
    /// variable.
    pub fn begin_loop(&mut self, kind: LoopKind) {
        self.push_loop(kind, None);
    }

    /// Opens a `FOR v = start TO stop [STEP step]` header.
    ///
    /// The loop variable's type is the common type of the three bounds;
    /// all three expressions are cast to it. Constant bounds that can
    /// never iterate (or never stop) warn.
    pub fn make_for_start(
        &mut self,
        line: u32,
        variable: &str,
        start: Option<Node>,
        stop: Option<Node>,
        step: Option<Node>,
    ) -> Option<Node> {
        // The loop is pushed before any early exit so the matching NEXT
        // always finds its frame.
        self.push_loop(LoopKind::For, None);
        let (Some(start), Some(stop)) = (start, stop) else { return None };
        let step = step.unwrap_or_else(|| Node::number(Num::Int(1), None, line));

        if let (Some(a), Some(b), Some(d)) = (self.node_num(&start), self.node_num(&stop), self.node_num(&step)) {
            if a != b && d.is_zero() {
                self.warning(line, "STEP value is 0 and FOR might loop forever");
            }
            if a.gt_num(b) == Num::Int(1) && !d.is_negative() && !d.is_zero() {
                self.warning(line, "FOR start value is greater than end. This FOR loop is useless");
                if self.options.optimization > 0 {
                    return None;
                }
            }
            if a.lt_num(b) == Num::Int(1) && d.is_negative() {
                self.warning(line, "FOR start value is lower than end. This FOR loop is useless");
                if self.options.optimization > 0 {
                    return None;
                }
            }
        }

        // An implicitly declared loop variable takes the common type of its
        // three bounds, not the global default.
        let bounds_type = common_type(start.type_, stop.type_);
        let var_type = common_type(bounds_type, step.type_).unwrap_or(self.options.default_type);
        let var_id = match self.symtab.get_entry(variable, None) {
            Some(id) => Some(id),
            None => {
                let caseins = self.options.case_insensitive;
                let (symtab, mut rep) = self.table_and_reporter();
                symtab.declare_variable(variable, line, var_type, true, caseins, &mut rep)
            }
        };
        if let Some(info) = self.loops.last_mut() {
            info.for_variable = var_id;
        }
        let var_id = var_id?;
        {
            let (symtab, mut rep) = self.table_and_reporter();
            if !symtab.check_class(variable, Class::Var, line, None, &mut rep) {
                return None;
            }
        }

        let entry = self.symtab.entry_mut(var_id);
        if entry.type_.is_none() {
            entry.type_ = Some(var_type);
        }
        entry.accessed = true;
        let loop_type = self.symtab.entry(var_id).type_.expect("loop variable was just typed");

        let variable_node = self.id_node(var_id, line);
        let start = self.make_typecast(loop_type, Some(start))?;
        let stop = self.make_typecast(loop_type, Some(stop))?;
        let step = self.make_typecast(loop_type, Some(step))?;
        Some(
            Node::new(Symbol::Sentence(SentenceKind::For), line).with_children(vec![variable_node, start, stop, step]),
        )
    }

    /// Verifies `NEXT v` names the innermost FOR variable. Called before
    /// [`Context::make_for`] pops the loop.
    pub fn check_next_variable(&mut self, line: u32, variable: &str) -> bool {
        let named = self.symtab.get_entry(variable, None);
        let expected = self.innermost_loop().and_then(|info| info.for_variable);
        if expected.is_none() || named != expected {
            let wanted = expected.map_or_else(String::new, |id| self.symtab.entry(id).name.clone());
            self.error(line, format!("NEXT variable '{variable}' does not match FOR variable '{wanted}'"));
            return false;
        }
        true
    }

    /// Closes a FOR loop: attaches the body and pops the loop stack.
    pub fn make_for(&mut self, header: Option<Node>, body: Option<Node>) -> Option<Node> {
        self.pop_loop();
        let mut header = header?;
        let line = header.line;
        header.children.push(body.unwrap_or_else(|| Node::new(Symbol::Block, line)));
        Some(header)
    }

    /// Closes a pre-test `WHILE cond ... WEND` loop.
    pub fn make_while(&mut self, line: u32, condition: Option<Node>, body: Option<Node>) -> Option<Node> {
        self.pop_loop();
        let condition = condition?;
        if let Some(value) = self.node_num(&condition) {
            if value.is_zero() {
                self.reporter().warning_condition_is_always(line, false);
                if self.options.optimization > 0 {
                    self.warning(line, "Loop has been ignored");
                    return None;
                }
            } else if body.is_none() {
                self.warning(line, "Condition is always true and leads to an infinite loop.");
            } else {
                self.warning(line, "Condition is always true and might lead to an infinite loop.");
            }
        }
        let mut children = vec![condition];
        children.extend(body);
        Some(Node::new(Symbol::Sentence(SentenceKind::While), line).with_children(children))
    }

    /// Closes an unconditional `DO ... LOOP` (an infinite loop).
    pub fn make_do_loop(&mut self, line: u32, body: Option<Node>) -> Option<Node> {
        self.pop_loop();
        if body.is_none() {
            self.warning(line, "Infinite empty loop");
        }
        let mut node = Node::new(Symbol::Sentence(SentenceKind::DoLoop), line);
        node.children.extend(body);
        Some(node)
    }

    /// Closes a post-test `DO ... LOOP UNTIL cond` / `LOOP WHILE cond`.
    pub fn make_do_post(&mut self, line: u32, until: bool, body: Option<Node>, condition: Option<Node>) -> Option<Node> {
        self.pop_loop();
        let condition = condition?;
        if let Some(value) = self.node_num(&condition) {
            self.reporter().warning_condition_is_always(line, !value.is_zero());
        }
        if body.is_none() {
            self.warning(line, "Empty loop");
        }
        let kind = if until { SentenceKind::DoUntil } else { SentenceKind::DoWhile };
        let mut children = vec![condition];
        children.extend(body);
        Some(Node::new(Symbol::Sentence(kind), line).with_children(children))
    }

    /// Closes a pre-test `DO WHILE cond ... LOOP` / `DO UNTIL cond ... LOOP`.
    pub fn make_do_pre(&mut self, line: u32, until: bool, condition: Option<Node>, body: Option<Node>) -> Option<Node> {
        self.pop_loop();
        let condition = condition?;
        if let Some(value) = self.node_num(&condition) {
            self.reporter().warning_condition_is_always(line, !value.is_zero());
        }
        let kind = if until { SentenceKind::UntilDo } else { SentenceKind::WhileDo };
        let mut children = vec![condition];
        children.extend(body);
        Some(Node::new(Symbol::Sentence(kind), line).with_children(children))
    }

    /// Builds `EXIT FOR/DO/WHILE`, verifying a matching enclosing loop.
    pub fn make_exit(&mut self, line: u32, kind: LoopKind) -> Option<Node> {
        if !self.in_loop(kind) {
            self.error(line, format!("EXIT {kind} out of loop"));
        }
        Some(Node::new(Symbol::Sentence(SentenceKind::Exit(kind)), line))
    }

    /// Builds `CONTINUE FOR/DO/WHILE`, verifying a matching enclosing loop.
    pub fn make_continue(&mut self, line: u32, kind: LoopKind) -> Option<Node> {
        if !self.in_loop(kind) {
            self.error(line, format!("CONTINUE {kind} out of loop"));
        }
        Some(Node::new(Symbol::Sentence(SentenceKind::Continue(kind)), line))
    }

    /// Builds a bare `RETURN`. Inside a FUNCTION body this is an error
    /// (functions return a value); outside any body it is a GOSUB return.
    pub fn make_return(&mut self, line: u32) -> Option<Node> {
        let Some(id) = self.current_function() else {
            return Some(Node::new(Symbol::Sentence(SentenceKind::Return), line));
        };
        if self.symtab.entry(id).kind != Some(FuncKind::Sub) {
            self.error(line, "Functions must RETURN a value, or use EXIT FUNCTION instead.");
            return None;
        }
        let function = self.id_node(id, line);
        Some(Node::new(Symbol::Sentence(SentenceKind::Return), line).with_children(vec![function]))
    }

    /// Builds `RETURN expr`, verifying the enclosing callable is a FUNCTION
    /// and the value's type converts to the declared return type.
    pub fn make_return_value(&mut self, line: u32, value: Option<Node>) -> Option<Node> {
        let value = value?;
        let Some(id) = self.current_function() else {
            self.error(line, "Returning value out of FUNCTION");
            return None;
        };
        let kind = self.symtab.entry(id).kind;
        match kind {
            None => return None,
            Some(FuncKind::Sub) => {
                self.error(line, "SUBs cannot return a value");
                return None;
            }
            Some(FuncKind::Function) => {}
        }
        let return_type = self.symtab.entry(id).type_;
        let value_is_string = value.type_ == Some(Type::Str);
        if return_type == Some(Type::Str) && !value_is_string {
            self.error(line, "Function must return a string, not a numeric value");
            return None;
        }
        if return_type != Some(Type::Str) && value_is_string {
            self.error(line, "Function must return a numeric value, not a string");
            return None;
        }
        let function = self.id_node(id, line);
        let value = match return_type {
            Some(target) => self.make_typecast(target, Some(value))?,
            None => value,
        };
        Some(Node::new(Symbol::Sentence(SentenceKind::Return), line).with_children(vec![function, value]))
    }

    /// Builds `END [expr]`; a missing expression exits with code 0.
    pub fn make_end(&mut self, line: u32, code: Option<Node>) -> Node {
        let code = code.unwrap_or_else(|| Node::number(Num::Int(0), None, line));
        Node::new(Symbol::Sentence(SentenceKind::End), line).with_children(vec![code])
    }

    /// Builds an assignment target check for `LET a = expr` on a scalar:
    /// fetches (or implicitly declares) the variable and casts the value.
    pub fn make_assignment(&mut self, line: u32, name: &str, value: Option<Node>) -> Option<Node> {
        let value = value?;
        let id = self.access_variable_entry(name, line)?;
        if self.symtab.entry(id).class == Some(Class::Const) {
            self.error(line, format!("Cannot assign a value to '{name}'. It is a constant"));
            return None;
        }
        {
            let (symtab, mut rep) = self.table_and_reporter();
            if !symtab.check_class(name, Class::Var, line, None, &mut rep) {
                return None;
            }
        }
        let target_type = self.symtab.entry(id).type_;
        let value = match target_type {
            Some(target) => self.make_typecast(target, Some(value))?,
            None => value,
        };
        let target = self.id_node(id, line);
        Some(
            Node::new(Symbol::Sentence(SentenceKind::Custom("LET".to_string())), line)
                .with_children(vec![target, value]),
        )
    }

    /// Builds an array element assignment `LET a(i, j) = expr`.
    pub fn make_array_assignment(&mut self, line: u32, name: &str, args: Option<Node>, value: Option<Node>) -> Option<Node> {
        let value = value?;
        let access = self.make_array_access(name, line, args, false)?;
        let value = match access.type_ {
            Some(target) => self.make_typecast(target, Some(value))?,
            None => value,
        };
        Some(
            Node::new(Symbol::Sentence(SentenceKind::Custom("LETARRAY".to_string())), line)
                .with_children(vec![access, value]),
        )
    }
}
