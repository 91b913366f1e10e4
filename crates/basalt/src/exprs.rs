//! Expression factories: the semantic layer behind every expression-shaped
//! grammar reduction.
//!
//! Each factory takes `Option<Node>` operands (a failed sub-expression is
//! `None`) and returns `Option<Node>`, reporting its own diagnostics before
//! returning `None`. This keeps the parser driver free of error plumbing: it
//! threads options through and moves on.

use crate::{
    ast::{BinOp, Node, Symbol, Token, UnaryOp},
    context::{Context, PendingCall},
    symtab::{Class, DefaultValue, FuncKind, ScopeKind, SymbolId},
    types::{FoldError, Num, Type, common_type},
};

/// Inclusive clamp range for constant string-slice bounds.
pub const MIN_SLICE_INDEX: i64 = 0;
pub const MAX_SLICE_INDEX: i64 = 65534;

impl Context {
    /// The compile-time numeric value of a node: a literal's own value, or
    /// the declared value of a `CONST` identifier.
    pub(crate) fn node_num(&self, node: &Node) -> Option<Num> {
        match &node.symbol {
            Symbol::Number(value) => Some(*value),
            Symbol::Id(id) => {
                let entry = self.symtab.entry(*id);
                if entry.class == Some(Class::Const)
                    && let Some(DefaultValue::Num(value)) = entry.default_value
                {
                    Some(value)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Builds an `Id` reference node for an entry.
    pub(crate) fn id_node(&self, id: SymbolId, line: u32) -> Node {
        let mut node = Node::new(Symbol::Id(id), line);
        node.type_ = self.symtab.entry(id).type_;
        node
    }

    // -----------------------------------------------------------------
    // Typecasts
    // -----------------------------------------------------------------

    /// Builds a conversion of `node` to `target`.
    ///
    /// An identity cast returns the node unchanged. String↔numeric casts
    /// fail (use `VAL()` / `STR()`). A numeric literal is converted at
    /// compile time: integer targets truncate modulo `2^(8*size)` (warning
    /// when digits are lost), floating targets promote the value. Anything
    /// else is wrapped in a `TypeCast` node.
    pub fn make_typecast(&mut self, target: Type, node: Option<Node>) -> Option<Node> {
        let mut node = node?;
        if node.type_ == Some(target) {
            return Some(node);
        }
        if node.type_ == Some(Type::Str) {
            self.error(node.line, "Cannot convert string to a value. Use VAL() function");
            return None;
        }
        if target == Type::Str {
            self.error(node.line, "Cannot convert value to string. Use STR() function");
            return None;
        }
        // A CONST envelope is transparent to casts: convert its expression.
        if node.is_const_expr() {
            node = const_inner(node);
            if node.type_ == Some(target) {
                return Some(node);
            }
        }
        let line = node.line;
        match self.node_num(&node) {
            None => {
                let cast = Node::new(Symbol::TypeCast, line).with_type(target).with_children(vec![node]);
                Some(cast)
            }
            Some(value) => {
                if target.is_integer() {
                    let (converted, lost) = value.truncated(target);
                    if lost {
                        self.warning(line, "Conversion may lose significant digits");
                    }
                    Some(Node::number(converted, Some(target), line))
                } else {
                    Some(Node::number(Num::Float(value.as_f64()), Some(target), line))
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Binary / unary operations
    // -----------------------------------------------------------------

    /// Builds a binary operation, folding constants and inserting the
    /// implicit casts that bring both sides to their common type.
    pub fn make_binary(&mut self, line: u32, op: BinOp, left: Option<Node>, right: Option<Node>) -> Option<Node> {
        let left = left?;
        let right = right?;

        // Both sides numeric constants: evaluate now. The folded literal's
        // type comes from its value, so comparisons land on u8 naturally.
        if let (Some(a), Some(b)) = (self.node_num(&left), self.node_num(&right)) {
            let folded = self.fold_binary(line, op, a, b)?;
            return Some(Node::number(folded, None, line));
        }

        let c_type = common_type(left.type_, right.type_);

        // Constant (but not literal) expressions: push the operator inside
        // the CONST envelope so the emitter still sees one relocatable
        // constant.
        if let Some(c) = c_type {
            let left_const = left.is_const_expr() && left.type_ == Some(c);
            let right_const = right.is_const_expr() && right.type_ == Some(c);
            if left_const && right_const {
                let inner = Node::new(Symbol::Binary(op), line)
                    .with_type(c)
                    .with_children(vec![const_inner(left), const_inner(right)]);
                return Some(Node::new(Symbol::Const, line).with_type(c).with_children(vec![inner]));
            }
            if left_const && self.node_num(&right).is_some() {
                let cast = self.make_typecast(c, Some(right))?;
                let inner = Node::new(Symbol::Binary(op), line)
                    .with_type(c)
                    .with_children(vec![const_inner(left), cast]);
                return Some(Node::new(Symbol::Const, line).with_type(c).with_children(vec![inner]));
            }
            if right_const && self.node_num(&left).is_some() {
                let cast = self.make_typecast(c, Some(left))?;
                let inner = Node::new(Symbol::Binary(op), line)
                    .with_type(c)
                    .with_children(vec![cast, const_inner(right)]);
                return Some(Node::new(Symbol::Const, line).with_type(c).with_children(vec![inner]));
            }
        }

        let involves_string = left.type_ == Some(Type::Str) || right.type_ == Some(Type::Str);
        if op.forbidden_on_strings() && involves_string {
            self.error(line, format!("Operator {op} cannot be used with STRINGS"));
            return None;
        }

        // Two string literals collapse now: PLUS concatenates, comparisons
        // collate to a u8 boolean.
        if let (Some(a), Some(b)) = (left.text(), right.text()) {
            if op == BinOp::Plus {
                let joined = format!("{a}{b}");
                return Some(Node::string(joined, line));
            }
            if op.is_comparison() {
                let result = fold_string_comparison(op, a, b);
                return Some(Node::number(Num::Int(i64::from(result)), Some(Type::U8), line));
            }
        }

        let mut c_type = c_type;
        if op.is_bitwise() && matches!(c_type, Some(Type::Fixed | Type::Float)) {
            c_type = Some(Type::I32);
        }

        // Shifts keep the left operand's own type and take the amount as a
        // u8; everything else is cast to the common type on both sides.
        let (left, right) = if matches!(op, BinOp::Shl | BinOp::Shr) {
            (left, self.make_typecast(Type::U8, Some(right))?)
        } else if let Some(c) = c_type {
            (self.make_typecast(c, Some(left))?, self.make_typecast(c, Some(right))?)
        } else {
            (left, right)
        };

        let result_type = if op.is_comparison() || op.is_logical() {
            Some(Type::U8)
        } else {
            c_type
        };
        let mut result = Node::new(Symbol::Binary(op), line).with_children(vec![left, right]);
        result.type_ = result_type;
        Some(result)
    }

    fn fold_binary(&mut self, line: u32, op: BinOp, a: Num, b: Num) -> Option<Num> {
        let folded = match op {
            BinOp::Plus => Ok(a.add(b)),
            BinOp::Minus => Ok(a.sub(b)),
            BinOp::Mul => Ok(a.mul(b)),
            BinOp::Div => a.div(b),
            BinOp::Mod => a.modulo(b),
            BinOp::Pow => a.pow(b),
            BinOp::Shl => a.shl(b),
            BinOp::Shr => a.shr(b),
            BinOp::BitAnd => Ok(a.bit_and(b)),
            BinOp::BitOr => Ok(a.bit_or(b)),
            BinOp::BitXor => Ok(a.bit_xor(b)),
            BinOp::And => Ok(a.logical_and(b)),
            BinOp::Or => Ok(a.logical_or(b)),
            BinOp::Xor => Ok(a.logical_xor(b)),
            BinOp::Eq => Ok(a.eq_num(b)),
            BinOp::Ne => Ok(a.ne_num(b)),
            BinOp::Lt => Ok(a.lt_num(b)),
            BinOp::Le => Ok(a.le_num(b)),
            BinOp::Gt => Ok(a.gt_num(b)),
            BinOp::Ge => Ok(a.ge_num(b)),
        };
        match folded {
            Ok(value) => Some(value),
            Err(FoldError::DivisionByZero) => {
                self.error(line, "Division by zero");
                None
            }
            Err(FoldError::NegativeShift) => {
                self.error(line, "Shift amount cannot be negative");
                None
            }
        }
    }

    /// Builds a unary operation, folding literal operands.
    ///
    /// `MINUS` on an unsigned operand widens it to its signed sibling first;
    /// `NOT` always yields `u8`; `ABS` on an unsigned operand is dropped
    /// with a warning; `@` (address-of) is typed `u16`.
    pub fn make_unary(&mut self, line: u32, op: UnaryOp, operand: Option<Node>) -> Option<Node> {
        let operand = operand?;

        if op != UnaryOp::Address
            && let Some(value) = self.node_num(&operand)
        {
            let folded = match op {
                UnaryOp::Minus => value.neg(),
                UnaryOp::Not => value.logical_not(),
                UnaryOp::BitNot => value.bit_not(),
                UnaryOp::Abs => value.abs(),
                UnaryOp::Address => unreachable!(),
            };
            return Some(Node::number(folded, None, line));
        }

        if op == UnaryOp::Abs
            && let Some(t) = operand.type_
            && t.is_unsigned()
        {
            self.warning(line, "Redundant ABS on an unsigned value");
            return Some(operand);
        }

        let mut operand = operand;
        let result_type = match op {
            UnaryOp::Minus => {
                if let Some(t) = operand.type_
                    && t.is_unsigned()
                {
                    let signed = t.signed_sibling();
                    operand = self.make_typecast(signed, Some(operand))?;
                    Some(signed)
                } else {
                    operand.type_
                }
            }
            UnaryOp::Not => Some(Type::U8),
            UnaryOp::Address => Some(Type::U16),
            UnaryOp::BitNot | UnaryOp::Abs => operand.type_,
        };
        let mut result = Node::new(Symbol::Unary(op), line).with_children(vec![operand]);
        result.type_ = result_type;
        Some(result)
    }

    /// Wraps a constant-but-not-literal expression (e.g. `@label`) in a
    /// CONST envelope.
    pub fn make_constexpr(&mut self, line: u32, expr: Option<Node>) -> Option<Node> {
        let expr = expr?;
        let mut node = Node::new(Symbol::Const, line).with_children(vec![expr]);
        node.type_ = node.children[0].type_;
        Some(node)
    }

    // -----------------------------------------------------------------
    // String slices
    // -----------------------------------------------------------------

    /// Builds a string slice `s(lo TO hi)`.
    ///
    /// Both bounds are rebased by `string_base` and cast to `u16`; constant
    /// bounds clamp to `[0, 65534]`. A literal `lo > hi` yields the empty
    /// string; a fully literal slice of a literal string is evaluated now
    /// (right-padded with spaces, Procrustean style); a literal full-range
    /// slice returns the string unchanged.
    pub fn make_strslice(&mut self, line: u32, string: Option<Node>, lower: Option<Node>, upper: Option<Node>) -> Option<Node> {
        let string = string?;
        if string.type_ != Some(Type::Str) {
            let found = string.type_.map_or("unknown".to_string(), |t| t.to_string());
            self.error(line, format!("Wrong expression type '{found}'. Expected 'string'"));
            return None;
        }

        let base = self.options.string_base;
        let rebase = |ctx: &mut Self, bound: Node| -> Option<Node> {
            let base_node = Node::number(Num::Int(base), None, line);
            let diff = ctx.make_binary(line, BinOp::Minus, Some(bound), Some(base_node))?;
            ctx.make_typecast(Type::U16, Some(diff))
        };
        let mut lower = rebase(self, lower?)?;
        let mut upper = rebase(self, upper?)?;

        let mut lo = self.node_num(&lower).map(Num::trunc_i64);
        let mut up = self.node_num(&upper).map(Num::trunc_i64);
        if let Some(value) = lo
            && value < MIN_SLICE_INDEX
        {
            lo = Some(MIN_SLICE_INDEX);
            lower = Node::number(Num::Int(MIN_SLICE_INDEX), Some(Type::U16), line);
        }
        if let Some(value) = up
            && value > MAX_SLICE_INDEX
        {
            up = Some(MAX_SLICE_INDEX);
            upper = Node::number(Num::Int(MAX_SLICE_INDEX), Some(Type::U16), line);
        }

        if let (Some(lo), Some(up)) = (lo, up) {
            if lo > up {
                return Some(Node::string("", line));
            }
            if let Some(text) = string.text() {
                // Procrustean fill: pad right with spaces to up + 1, then take.
                let mut chars: Vec<char> = text.chars().collect();
                let end = up as usize + 1;
                if chars.len() < end {
                    chars.resize(end, ' ');
                }
                let sliced: String = chars[lo as usize..end].iter().collect();
                return Some(Node::string(sliced, line));
            }
            if lo == MIN_SLICE_INDEX && up == MAX_SLICE_INDEX {
                return Some(string);
            }
        }

        let mut node = Node::new(Symbol::StrSlice, line).with_type(Type::Str);
        node.children = vec![string, lower, upper];
        Some(node)
    }

    // -----------------------------------------------------------------
    // Array access
    // -----------------------------------------------------------------

    /// Builds an array element access `a(i1, ..., in)`.
    ///
    /// Verifies the identifier is a declared array with matching dimension
    /// count, rebases every index by its lower bound (cast to `u16`), and
    /// computes the constant byte offset when every index folded. Constant
    /// indices outside the declared bounds warn.
    pub fn make_array_access(&mut self, name: &str, line: u32, args: Option<Node>, load: bool) -> Option<Node> {
        let args = args?;
        {
            let (symtab, mut rep) = self.table_and_reporter();
            if !symtab.check_class(name, Class::Array, line, None, &mut rep) {
                return None;
            }
            symtab.check_is_declared(name, line, "array", &mut rep)?;
        }
        let id = self.symtab.get_entry(name, None).expect("checked declared above");
        let entry = self.symtab.entry(id);
        let bounds: Vec<_> = entry.bounds.to_vec();
        let element_size = u32::from(entry.size());
        let element_type = entry.type_;
        if bounds.len() != args.children.len() {
            self.error(
                line,
                format!("Array '{name}' has {} dimensions, not {}", bounds.len(), args.children.len()),
            );
            return None;
        }
        self.symtab.entry_mut(id).accessed = true;

        let mut offset: Option<i64> = Some(0);
        let mut rebased_args = Vec::with_capacity(bounds.len());
        for (arg, bound) in args.children.into_iter().zip(bounds) {
            let expr = argument_inner(arg);
            let cast = self.make_typecast(Type::U16, Some(expr))?;
            let lower = Node::number(Num::Int(bound.lower), Some(Type::U16), line);
            let mut index = self.make_binary(line, BinOp::Minus, Some(cast), Some(lower))?;
            index.type_ = Some(Type::U16);

            match self.node_num(&index) {
                Some(value) => {
                    let value = value.trunc_i64();
                    if value < 0 || value > bound.upper - bound.lower {
                        self.warning(line, format!("Array '{name}' subscript out of range"));
                    }
                    offset = offset.map(|acc| acc * bound.cells() as i64 + value);
                }
                None => offset = None,
            }

            let mut wrapper = Node::new(Symbol::Argument { byref: false }, line);
            wrapper.type_ = index.type_;
            wrapper.children = vec![index];
            rebased_args.push(wrapper);
        }

        let byte_offset = offset.filter(|cells| *cells >= 0).map(|cells| cells as u32 * element_size);
        let arg_list = Node::new(Symbol::ArgList, line).with_children(rebased_args);
        let mut node = Node::new(
            Symbol::ArrayAccess {
                entry: id,
                load,
                offset: byte_offset,
            },
            line,
        )
        .with_children(vec![arg_list]);
        node.type_ = element_type;
        Some(node)
    }

    // -----------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------

    /// Resolves an identifier used with a parenthesized argument list:
    /// a function, an array, or a string (slicing syntax). Implicitly
    /// declares an undeclared identifier as a function.
    fn access_callable(&mut self, name: &str, line: u32) -> Option<SymbolId> {
        if let Some(id) = self.symtab.get_entry(name, None) {
            let entry = self.symtab.entry(id);
            match entry.callable {
                Some(false) if entry.type_ != Some(Type::Str) => {
                    self.error(line, format!("'{name}' is neither an array nor a function"));
                    None
                }
                None if entry.type_ == Some(Type::Str) => {
                    // A string scalar: callable syntax means slicing.
                    self.symtab.entry_mut(id).callable = Some(false);
                    Some(id)
                }
                _ => Some(id),
            }
        } else {
            let caseins = self.options.case_insensitive;
            let (symtab, mut rep) = self.table_and_reporter();
            symtab.declare_func(name, line, caseins, &mut rep)
        }
    }

    /// Builds a function/procedure call node.
    ///
    /// A declared callee is checked immediately; an undeclared one is moved
    /// to the global scope (there are no nested functions) and recorded for
    /// the post-parse check.
    pub fn make_proc_call(&mut self, name: &str, line: u32, args: Option<Node>) -> Option<Node> {
        let mut args = args?;
        let id = self.access_callable(name, line)?;
        if self.symtab.entry(id).class.is_none() {
            self.symtab.entry_mut(id).class = Some(Class::Function);
        }
        self.symtab.entry_mut(id).accessed = true;
        {
            let (symtab, mut rep) = self.table_and_reporter();
            if !symtab.check_class(name, Class::Function, line, None, &mut rep) {
                return None;
            }
        }

        if self.symtab.entry(id).declared {
            if !self.check_call_arguments(line, id, &mut args) {
                return None;
            }
        } else {
            let bare = self.symtab.entry(id).name.clone();
            self.symtab.move_to_global_scope(&bare);
            self.pending_calls.push(PendingCall { entry: id, line });
        }

        let mut node = Node::new(Symbol::Call(id), line).with_children(vec![args]);
        node.type_ = self.symtab.entry(id).type_;
        Some(node)
    }

    /// Builds a call-syntax expression `name(args)`: an array load, a string
    /// index/slice, or a function call, depending on what `name` is.
    pub fn make_call(&mut self, name: &str, line: u32, args: Option<Node>) -> Option<Node> {
        let args = args?;
        let id = self.access_callable(name, line)?;
        match self.symtab.entry(id).class {
            Some(Class::Array) => {
                let mut node = self.make_array_access(name, line, Some(args), true)?;
                // A fully constant subscript also hangs the byte offset off
                // the access, pre-cast for the emitter.
                if let Symbol::ArrayAccess { offset: Some(offset), .. } = node.symbol {
                    let offset_node =
                        self.make_typecast(Type::U16, Some(Node::number(Num::Int(i64::from(offset)), None, line)))?;
                    node.children.push(offset_node);
                }
                Some(node)
            }
            Some(Class::Var | Class::Const) => {
                // String indexing or slicing: s(i) is s(i TO i).
                if args.children.len() > 1 {
                    self.error(line, format!("'{name}' is neither an array nor a function"));
                    return None;
                }
                self.symtab.entry_mut(id).accessed = true;
                let string = self.id_node(id, line);
                if args.children.len() == 1 {
                    let index = argument_inner(args.children.into_iter().next().expect("one argument"));
                    return self.make_strslice(line, Some(string), Some(index.clone()), Some(index));
                }
                Some(string)
            }
            _ => self.make_proc_call(name, line, Some(args)),
        }
    }

    /// Checks a call site against a declared function: argument count must
    /// match, every argument is cast to its parameter's type, and a byref
    /// parameter requires a bare variable or array name.
    pub fn check_call_arguments(&mut self, line: u32, id: SymbolId, args: &mut Node) -> bool {
        let entry = self.symtab.entry(id);
        let name = entry.name.clone();
        if !entry.declared {
            self.error(line, format!("Undeclared function \"{name}\""));
            return false;
        }
        let Some(params) = entry.params.clone() else {
            self.error(line, format!("Undeclared function \"{name}\""));
            return false;
        };

        if params.children.len() != args.children.len() {
            let plural = if params.children.len() == 1 { "" } else { "s" };
            self.error(
                line,
                format!(
                    "Function '{name}' takes {} parameter{plural}, not {}",
                    params.children.len(),
                    args.children.len()
                ),
            );
            return false;
        }

        for (arg, param) in args.children.iter_mut().zip(params.children.iter()) {
            let param_entry = self.symtab.entry(param.entry_id().expect("ParamDecl references its entry"));
            let param_type = param_entry.type_;
            let param_byref = param_entry.byref;

            if let Some(target) = param_type
                && arg.type_ != Some(target)
            {
                let inner = arg.children.pop().expect("Argument wraps its expression");
                match self.make_typecast(target, Some(inner)) {
                    Some(cast) => {
                        arg.type_ = cast.type_;
                        arg.children.push(cast);
                    }
                    None => return false,
                }
            }

            if param_byref {
                let inner = &arg.children[0];
                match inner.symbol {
                    Symbol::Id(arg_id) => {
                        let class = self.symtab.entry(arg_id).class;
                        if !matches!(class, Some(Class::Var | Class::Array)) {
                            self.error(line, "Expected a variable or array name (parameter By Reference)");
                            return false;
                        }
                    }
                    _ => {
                        self.error(line, "Expected a variable name, not an expression (parameter By Reference)");
                        return false;
                    }
                }
                arg.symbol = Symbol::Argument { byref: true };
            }
        }
        true
    }

    // -----------------------------------------------------------------
    // Argument lists
    // -----------------------------------------------------------------

    /// Wraps an expression as one call argument.
    pub fn make_argument(&mut self, expr: Option<Node>, line: u32) -> Option<Node> {
        let expr = expr?;
        let mut node = Node::new(Symbol::Argument { byref: false }, line);
        node.type_ = expr.type_;
        node.children = vec![expr];
        Some(node)
    }

    /// Appends `arg` to an argument list, creating the list when `list` is
    /// `None`. A bare argument in `list` position is wrapped first.
    pub fn make_arg_list(&mut self, list: Option<Node>, arg: Option<Node>) -> Option<Node> {
        let mut list = match list {
            None => Node::new(Symbol::ArgList, arg.as_ref().map_or(0, |a| a.line)),
            Some(node) if node.token() == Token::ArgList => node,
            Some(node) => Node::new(Symbol::ArgList, node.line).with_children(vec![node]),
        };
        if let Some(arg) = arg {
            list.children.push(arg);
        }
        Some(list)
    }

    // -----------------------------------------------------------------
    // Identifier access
    // -----------------------------------------------------------------

    /// Builds the expression node for a bare identifier.
    ///
    /// An undeclared identifier is implicitly declared with the default
    /// type. A zero-argument function becomes a call; a SUB or an array
    /// cannot stand as an expression.
    pub fn make_id_expr(&mut self, name: &str, line: u32) -> Option<Node> {
        let id = self.access_variable_entry(name, line)?;
        self.symtab.entry_mut(id).accessed = true;
        let entry = self.symtab.entry(id);
        match entry.kind {
            Some(FuncKind::Function) => {
                // A function mentioned without parentheses is a 0-arg call.
                let empty = self.make_arg_list(None, None);
                return self.make_call(name, line, empty);
            }
            Some(FuncKind::Sub) => {
                self.error(line, format!("'{name}' is SUB not a FUNCTION"));
                return None;
            }
            None => {}
        }
        if self.symtab.entry(id).class == Some(Class::Array) {
            self.error(line, format!("Variable '{name}' is an array and cannot be used in this context"));
            return None;
        }
        Some(self.id_node(id, line))
    }

    /// Fetches (or implicitly declares) the entry behind an identifier used
    /// as a value or assignment target. Returns existing entries of any
    /// class; only creation is variable-shaped.
    pub(crate) fn access_variable_entry(&mut self, name: &str, line: u32) -> Option<SymbolId> {
        if let Some(id) = self.symtab.get_entry(name, None) {
            return Some(id);
        }
        let default_type = self.options.default_type;
        let caseins = self.options.case_insensitive;
        let (symtab, mut rep) = self.table_and_reporter();
        symtab.declare_variable(name, line, default_type, true, caseins, &mut rep)
    }

    /// Builds `@name`: the address of an identifier, as a constant where the
    /// address is known at link time (global, non-string storage) and as a
    /// plain unary otherwise.
    pub fn make_address_of(&mut self, name: &str, line: u32) -> Option<Node> {
        let caseins = self.options.case_insensitive;
        let id = self.symtab.access_id(name, line, caseins);
        self.symtab.entry_mut(id).accessed = true;
        let reference = self.id_node(id, line);
        let address = self.make_unary(line, UnaryOp::Address, Some(reference))?;
        let entry = self.symtab.entry(id);
        if entry.scope == ScopeKind::Global && entry.type_ != Some(Type::Str) {
            self.make_constexpr(line, Some(address))
        } else {
            Some(address)
        }
    }

    /// Builds `@name(i1, ..., in)`: the address of an array element.
    pub fn make_address_of_element(&mut self, name: &str, line: u32, args: Option<Node>) -> Option<Node> {
        let access = self.make_array_access(name, line, args, false)?;
        self.make_unary(line, UnaryOp::Address, Some(access))
    }
}

/// Unwraps a CONST envelope.
fn const_inner(node: Node) -> Node {
    debug_assert!(node.is_const_expr());
    node.children.into_iter().next().expect("CONST envelope has an inner expression")
}

/// Unwraps an Argument node (or passes a bare expression through, for
/// parsers that skip the wrapper).
fn argument_inner(node: Node) -> Node {
    match node.symbol {
        Symbol::Argument { .. } => node.children.into_iter().next().expect("Argument wraps its expression"),
        _ => node,
    }
}

fn fold_string_comparison(op: BinOp, a: &str, b: &str) -> bool {
    match op {
        BinOp::Eq => a == b,
        BinOp::Ne => a != b,
        BinOp::Lt => a < b,
        BinOp::Le => a <= b,
        BinOp::Gt => a > b,
        BinOp::Ge => a >= b,
        _ => unreachable!("only comparisons reach string folding"),
    }
}
