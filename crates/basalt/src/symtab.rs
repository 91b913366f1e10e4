//! The symbol table: a stack of lexical scopes over a central entry arena.
//!
//! # Design Rationale
//!
//! Entries live in one arena owned by the table and are addressed by
//! [`SymbolId`] indices. AST nodes store the index, never the entry, so a
//! late mutation (frame offsets at scope exit, forward-function resolution,
//! label hoisting) is visible through every node already built. Scopes are
//! insertion-ordered name maps: deterministic iteration order is what makes
//! frame layout and the data segment reproducible.
//!
//! Each scope also keeps a lower-cased shadow map, populated only for
//! entries declared while the case-insensitive option is on; lookups fall
//! back to it when the exact-case map misses.

use ahash::AHashMap;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    ast::Node,
    diag::Reporter,
    types::{Num, PTR_TYPE, Type},
};

/// Index of an entry in the symbol table's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct SymbolId(u32);

impl SymbolId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index.try_into().expect("symbol arena overflow"))
    }

    /// Returns the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What kind of thing an identifier names. `None` on the entry means the
/// identifier has been referenced but not yet declared.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::Display, strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Class {
    Var,
    Function,
    Array,
    Label,
    Const,
}

/// Function vs. subroutine; `None` on the entry means not yet determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FuncKind {
    Function,
    Sub,
}

impl FuncKind {
    /// The keyword as diagnostics spell it.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Function => "FUNCTION",
            Self::Sub => "SUB",
        }
    }
}

/// Which storage region an identifier lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ScopeKind {
    Global,
    Local,
    Parameter,
}

/// Calling convention of a function or sub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Convention {
    #[default]
    StdCall,
    FastCall,
}

impl Convention {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StdCall => "__stdcall__",
            Self::FastCall => "__fastcall__",
        }
    }
}

/// One array dimension, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Bound {
    pub lower: i64,
    pub upper: i64,
}

impl Bound {
    pub fn cells(self) -> u64 {
        (self.upper - self.lower + 1) as u64
    }
}

/// An initialization value recorded on a declaration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum DefaultValue {
    Num(Num),
    Str(String),
    /// A constant-but-not-literal initializer (e.g. `@label`), kept as the
    /// expression for the emitter to relocate.
    Const(Node),
    /// Array initializer; nested per dimension.
    Vector(Vec<DefaultValue>),
}

/// A symbol-table entry: every attribute the front-end or the emitter reads
/// off an identifier.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IdEntry {
    /// Source name with any deprecated suffix already stripped.
    pub name: String,
    /// Line where the identifier was first seen.
    pub line: u32,
    pub declared: bool,
    pub class: Option<Class>,
    pub scope: ScopeKind,
    #[serde(rename = "type")]
    pub type_: Option<Type>,
    /// Link-time name: `{parent_mangle}_{name}`; see [`SymbolTable`].
    pub mangled: String,
    /// Stack-frame offset for locals and parameters; `None` for globals.
    /// Negative only for aliases resolved against their target.
    pub offset: Option<i32>,
    pub default_value: Option<DefaultValue>,
    /// Absolute address when pinned with `AT`.
    pub addr: Option<u16>,
    /// Base entry this one aliases. A base is never itself an alias.
    pub alias: Option<SymbolId>,
    /// Reverse index: entries that alias this one.
    pub aliased_by: Vec<SymbolId>,
    /// For parameters: passed by reference.
    pub byref: bool,
    /// Whether a parenthesized argument list may follow this identifier:
    /// `Some(true)` for functions, arrays and strings; `Some(false)` for
    /// scalars; `None` when not yet determined.
    pub callable: Option<bool>,
    /// Set while a `DECLARE`d function awaits its definition.
    pub forwarded: bool,
    /// Whether the program reads this identifier anywhere.
    pub accessed: bool,
    /// Declared while the case-insensitive option was enabled.
    pub caseins: bool,
    pub kind: Option<FuncKind>,
    pub convention: Convention,
    /// For functions: the parameter-list node of the accepted header.
    pub params: Option<Node>,
    /// For functions: summed stack size of the parameters.
    pub params_size: u16,
    /// For functions: total local frame size, known at `END FUNCTION`.
    pub locals_size: u16,
    /// For functions: the local scope's entries, captured when it closes.
    pub local_symbols: Option<Vec<SymbolId>>,
    /// For arrays: the declared dimensions.
    pub bounds: SmallVec<[Bound; 4]>,
    /// Labels only: the label was a bare line number.
    pub is_line_number: bool,
}

impl IdEntry {
    fn new(name: String, line: u32) -> Self {
        Self {
            name,
            line,
            declared: false,
            class: None,
            scope: ScopeKind::Global,
            type_: None,
            mangled: String::new(),
            offset: None,
            default_value: None,
            addr: None,
            alias: None,
            aliased_by: Vec::new(),
            byref: false,
            callable: None,
            forwarded: false,
            accessed: false,
            caseins: false,
            kind: None,
            convention: Convention::default(),
            params: None,
            params_size: 0,
            locals_size: 0,
            local_symbols: None,
            bounds: SmallVec::new(),
            is_line_number: false,
        }
    }

    /// Scalar storage size in bytes (0 while the type is unknown).
    pub fn size(&self) -> u16 {
        self.type_.map_or(0, Type::size)
    }

    /// Total byte cost of an array's cells.
    pub fn memsize(&self) -> u32 {
        let cells: u64 = self.bounds.iter().map(|b| b.cells()).product();
        (cells * u64::from(self.size())) as u32
    }

    pub fn is_aliased(&self) -> bool {
        !self.aliased_by.is_empty()
    }

    /// Frame cost used when laying out a local scope: globals, aliases and
    /// constants occupy nothing of their own, arrays cost their full body.
    fn frame_size(&self) -> u32 {
        if self.scope == ScopeKind::Global || self.alias.is_some() || self.class == Some(Class::Const) {
            return 0;
        }
        if self.class == Some(Class::Array) {
            self.memsize()
        } else {
            u32::from(self.size())
        }
    }
}

/// One lexical scope: the exact-case map plus the lower-cased shadow map.
#[derive(Debug, Default)]
struct Scope {
    symbols: IndexMap<String, SymbolId>,
    caseins: AHashMap<String, SymbolId>,
    parent_mangle: String,
}

impl Scope {
    fn new(parent_mangle: String) -> Self {
        Self {
            symbols: IndexMap::new(),
            caseins: AHashMap::new(),
            parent_mangle,
        }
    }

    fn get(&self, name: &str) -> Option<SymbolId> {
        self.symbols
            .get(name)
            .copied()
            .or_else(|| self.caseins.get(&name.to_lowercase()).copied())
    }

    fn insert(&mut self, name: String, id: SymbolId, caseins: bool) {
        if caseins {
            self.caseins.insert(name.to_lowercase(), id);
        }
        self.symbols.insert(name, id);
    }

    fn remove(&mut self, name: &str) -> Option<SymbolId> {
        // shift_remove keeps insertion order for the survivors; swap_remove
        // would scramble the frame layout.
        let id = self.symbols.shift_remove(name);
        self.caseins.remove(&name.to_lowercase());
        id
    }
}

/// Splits a deprecated suffix (`$`, `%`, `&`) off an identifier.
///
/// Returns the bare name and the type the suffix forces, if any.
pub fn strip_suffix(name: &str) -> (&str, Option<Type>) {
    match name.chars().next_back().and_then(Type::from_suffix) {
        Some(forced) => (&name[..name.len() - 1], Some(forced)),
        None => (name, None),
    }
}

/// The symbol table of one compilation unit.
///
/// Scope 0 is the global scope; `enter_scope`/`leave_scope` bracket every
/// function body. The mangle prefix grows by `_funcname` per nested scope,
/// so a local `a` of function `myFunc` is emitted as `_myFunc_a` while a
/// global `a` is `_a`.
#[derive(Debug)]
pub struct SymbolTable {
    entries: Vec<IdEntry>,
    scopes: Vec<Scope>,
    mangle: String,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            scopes: vec![Scope::new(String::new())],
            mangle: String::new(),
        }
    }

    pub fn entry(&self, id: SymbolId) -> &IdEntry {
        &self.entries[id.index()]
    }

    pub fn entry_mut(&mut self, id: SymbolId) -> &mut IdEntry {
        &mut self.entries[id.index()]
    }

    /// Index of the innermost scope.
    pub fn current_scope(&self) -> usize {
        self.scopes.len() - 1
    }

    pub fn global_scope(&self) -> usize {
        0
    }

    /// True while parsing a function body.
    pub fn in_local_scope(&self) -> bool {
        self.scopes.len() > 1
    }

    /// The storage region a declaration made right now would land in.
    fn declaring_scope(&self) -> ScopeKind {
        if self.in_local_scope() { ScopeKind::Local } else { ScopeKind::Global }
    }

    /// Looks an identifier up, innermost scope outward, or in exactly the
    /// given scope. Deprecated suffixes are stripped before the lookup.
    pub fn get_entry(&self, name: &str, scope: Option<usize>) -> Option<SymbolId> {
        let (bare, _) = strip_suffix(name);
        if let Some(index) = scope {
            return self.scopes[index].get(bare);
        }
        self.scopes.iter().rev().find_map(|s| s.get(bare))
    }

    /// Declares `name` in the current scope, creating a fresh entry.
    ///
    /// Returns `None` (caller reports) when the name already exists in the
    /// current scope. A deprecated suffix is stripped and forces the entry's
    /// type per invariant: `$` → string, `%` → integer, `&` → long.
    pub fn declare(&mut self, name: &str, line: u32, caseins: bool) -> Option<SymbolId> {
        let (bare, forced) = strip_suffix(name);
        if self.scopes[self.current_scope()].get(bare).is_some() {
            return None;
        }
        let mut entry = IdEntry::new(bare.to_string(), line);
        entry.type_ = forced;
        entry.caseins = caseins;
        entry.mangled = format!("{}_{bare}", self.mangle);
        let id = SymbolId::new(self.entries.len());
        self.entries.push(entry);
        let scope = self.current_scope();
        self.scopes[scope].insert(bare.to_string(), id, caseins);
        Some(id)
    }

    /// Fetches the entry for `name` anywhere, or records an undeclared
    /// reference in the current scope (class `None`, to be resolved by the
    /// post-parse fix-up).
    pub fn access_id(&mut self, name: &str, line: u32, caseins: bool) -> SymbolId {
        if let Some(id) = self.get_entry(name, None) {
            return id;
        }
        self.declare(name, line, caseins)
            .expect("lookup missed, so the declare cannot collide")
    }

    // -----------------------------------------------------------------
    // Checks
    // -----------------------------------------------------------------

    /// Verifies `name` is declared; reports `Undeclared <classname> "name"`
    /// otherwise.
    pub fn check_is_declared(&self, name: &str, line: u32, classname: &str, rep: &mut Reporter<'_>) -> Option<SymbolId> {
        match self.get_entry(name, None) {
            Some(id) if self.entry(id).declared => Some(id),
            _ => {
                rep.error(line, format!("Undeclared {classname} \"{name}\""));
                None
            }
        }
    }

    /// Verifies `name` is either unknown or of the given class (a class of
    /// `None` means "referenced in advance" and also passes). Reports the
    /// class-mismatch error otherwise.
    pub fn check_class(&self, name: &str, class: Class, line: u32, scope: Option<usize>, rep: &mut Reporter<'_>) -> bool {
        let Some(id) = self.get_entry(name, scope) else {
            return true;
        };
        match self.entry(id).class {
            None => true,
            Some(found) if found == class => true,
            Some(found) => {
                let a1 = if found == Class::Array { "n" } else { "" };
                let a2 = if class == Class::Array { "n" } else { "" };
                rep.error(line, format!("identifier '{name}' is a{a1} {found}, not a{a2} {class}"));
                false
            }
        }
    }

    // -----------------------------------------------------------------
    // Scope management
    // -----------------------------------------------------------------

    /// Starts a function scope: pushes a fresh name map and extends the
    /// mangle prefix with `_funcname`.
    pub fn enter_scope(&mut self, funcname: &str) {
        self.scopes.push(Scope::new(self.mangle.clone()));
        self.mangle = format!("{}_{funcname}", self.mangle);
    }

    /// Ends a function body: finalizes the local frame layout and pops the
    /// scope. Returns the frame size and the scope's entries (the captured
    /// local symbol table).
    ///
    /// Layout rule: local var/array entries are ordered by frame size
    /// ascending (stable), then scalars take `offset += size` and arrays
    /// carry the offset past their body: `offset = memsize + offset`.
    /// Aliases resolve against their target afterwards: they take the
    /// target's offset, or invert a pre-set offset to `target - own`.
    pub fn leave_scope(&mut self) -> (u16, Vec<SymbolId>) {
        let scope_index = self.current_scope();
        let mut ids: Vec<SymbolId> = self.scopes[scope_index].symbols.values().copied().collect();

        // Anything still class-less was referenced but never declared here;
        // hoist it so the post-parse fix-up can resolve it globally.
        for id in ids.clone() {
            if self.entry(id).class.is_none() {
                let name = self.entry(id).name.clone();
                self.move_to_global_scope(&name);
            }
        }
        ids.retain(|id| self.entry(*id).class.is_some());

        // Stable min-selection by frame size, ascending. Small arrays last
        // keeps scalars reachable with short index offsets.
        for i in 0..ids.len() {
            let mut min = i;
            let mut min_size = self.entry(ids[i]).frame_size();
            for j in i + 1..ids.len() {
                let size = self.entry(ids[j]).frame_size();
                if size < min_size {
                    min_size = size;
                    min = j;
                }
            }
            ids.swap(i, min);
        }

        let mut offset: u32 = 0;
        for &id in &ids {
            let entry = self.entry(id);
            if entry.scope != ScopeKind::Local || entry.alias.is_some() {
                continue;
            }
            match entry.class {
                // Constants fold at every use and take no frame space.
                Some(Class::Var) => {
                    offset += u32::from(entry.size());
                    self.entry_mut(id).offset = Some(offset as i32);
                }
                Some(Class::Array) => {
                    offset += self.entry(id).memsize();
                    self.entry_mut(id).offset = Some(offset as i32);
                }
                _ => {}
            }
        }

        // Aliases after their targets, so every target offset is final.
        for &id in &ids {
            let Some(target) = self.entry(id).alias else { continue };
            if self.entry(id).scope != ScopeKind::Local {
                continue;
            }
            let target_offset = self.entry(target).offset;
            let own = self.entry_mut(id);
            own.offset = match (own.offset, target_offset) {
                (Some(pre_set), Some(t)) => Some(t - pre_set),
                (None, t) => t,
                (pre_set, None) => pre_set,
            };
        }

        self.mangle = self.scopes[scope_index].parent_mangle.clone();
        self.scopes.pop();
        (offset as u16, ids)
    }

    /// Moves `name` from the current scope to the global one (labels need
    /// this). Both maps are updated before anything can observe the entry.
    pub fn move_to_global_scope(&mut self, name: &str) {
        let current = self.current_scope();
        if current == self.global_scope() {
            return;
        }
        if let Some(id) = self.scopes[current].remove(name) {
            let caseins = self.entry(id).caseins;
            let global_scope = self.global_scope();
            self.scopes[global_scope].insert(name.to_string(), id, caseins);
            let entry = self.entry_mut(id);
            entry.offset = None;
            entry.scope = ScopeKind::Global;
        }
    }

    /// Turns a local entry into a static: its storage becomes global (under
    /// the mangled name) while the name stays visible only in the current
    /// scope.
    pub fn make_static(&mut self, name: &str) {
        let current = self.current_scope();
        if let Some(id) = self.scopes[current].get(name) {
            self.entry_mut(id).scope = ScopeKind::Global;
            let mangled = self.entry(id).mangled.clone();
            let caseins = self.entry(id).caseins;
            let global_scope = self.global_scope();
            self.scopes[global_scope].insert(mangled, id, caseins);
        }
    }

    /// Makes `id` an alias of `target`, collapsing alias-of-alias to the
    /// base so alias chains are always one hop.
    pub fn make_alias(&mut self, id: SymbolId, target: SymbolId) {
        let base = self.entry(target).alias.unwrap_or(target);
        self.entry_mut(base).aliased_by.push(id);
        let (scope, byref, offset, addr) = {
            let b = self.entry(base);
            (b.scope, b.byref, b.offset, b.addr)
        };
        let entry = self.entry_mut(id);
        entry.alias = Some(base);
        entry.scope = scope;
        entry.byref = byref;
        entry.offset = offset;
        entry.addr = addr;
    }

    // -----------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------

    /// Declares a scalar variable. `implicit` marks a front-end-supplied
    /// type (no suffix consistency check, an "implicit type" warning
    /// instead).
    pub fn declare_variable(
        &mut self,
        name: &str,
        line: u32,
        type_: Type,
        implicit: bool,
        caseins: bool,
        rep: &mut Reporter<'_>,
    ) -> Option<SymbolId> {
        let (bare, _) = strip_suffix(name);
        if let Some(existing) = self.get_entry(name, Some(self.current_scope()))
            && self.entry(existing).declared
        {
            let entry = self.entry(existing);
            if entry.scope == ScopeKind::Parameter {
                rep.error(
                    line,
                    format!("Variable '{bare}' already declared as a parameter at line {}", entry.line),
                );
            } else {
                rep.error(line, format!("Variable '{bare}' already declared at line {}", entry.line));
            }
            return None;
        }
        if !self.check_class(name, Class::Var, line, None, rep) {
            return None;
        }

        let id = match self.get_entry(name, Some(self.current_scope())) {
            Some(id) => id,
            None => self.declare(name, line, caseins)?,
        };

        // A suffix (or an earlier reference) may have fixed the type already.
        let prior = self.entry(id).type_;
        match prior {
            None => self.entry_mut(id).type_ = Some(type_),
            Some(existing) if existing != type_ && !implicit => {
                rep.error(
                    line,
                    format!("'{bare}' suffix is for type '{existing}' but it was declared as '{type_}'"),
                );
                return None;
            }
            Some(_) => {}
        }

        let scope = self.declaring_scope();
        let entry = self.entry_mut(id);
        entry.scope = scope;
        entry.class = Some(Class::Var);
        entry.callable = Some(false);
        entry.declared = true;

        if implicit && prior.is_none() {
            let shown = self.entry(id).type_.expect("type was just set");
            rep.warning(line, format!("Variable '{bare}' declared as '{}'", shown.basic_name()));
        }
        Some(id)
    }

    /// Declares a constant: a variable whose value is fully evaluated at
    /// declaration time.
    pub fn declare_const(
        &mut self,
        name: &str,
        line: u32,
        type_: Type,
        implicit: bool,
        value: DefaultValue,
        caseins: bool,
        rep: &mut Reporter<'_>,
    ) -> Option<SymbolId> {
        let id = self.declare_variable(name, line, type_, implicit, caseins, rep)?;
        let entry = self.entry_mut(id);
        entry.class = Some(Class::Const);
        entry.default_value = Some(value);
        Some(id)
    }

    /// Declares a label. Labels are hoisted to the global scope at
    /// declaration time; their mangled name is `__LABEL__<name>`, except
    /// `.`-prefixed labels which keep the bare name literally.
    pub fn declare_label(&mut self, name: &str, line: u32, caseins: bool, rep: &mut Reporter<'_>) -> Option<SymbolId> {
        let is_line_number = name.chars().all(|c| c.is_ascii_digit()) && !name.is_empty();
        let (stored, mangled) = match name.strip_prefix('.') {
            Some(rest) => (rest, rest.to_string()),
            None => (name, format!("__LABEL__{name}")),
        };

        if let Some(existing) = self.get_entry(stored, None)
            && self.entry(existing).declared
            && self.entry(existing).class == Some(Class::Label)
        {
            let previous = self.entry(existing).line;
            if self.entry(existing).is_line_number {
                rep.error(
                    line,
                    format!("Duplicated line number '{stored}'. Previous was at line {previous}"),
                );
            } else {
                rep.error(line, format!("Label '{stored}' already declared at line {previous}"));
            }
            return None;
        }

        let id = match self.get_entry(stored, Some(self.current_scope())) {
            Some(id) if !self.entry(id).declared => id,
            Some(_) => {
                rep.error(line, format!("Duplicated identifier '{stored}'"));
                return None;
            }
            None => self.declare(stored, line, caseins)?,
        };

        {
            let entry = self.entry_mut(id);
            entry.class = Some(Class::Label);
            entry.callable = Some(false);
            entry.declared = true;
            entry.mangled = mangled;
            entry.is_line_number = is_line_number;
            entry.type_ = Some(PTR_TYPE);
        }
        self.move_to_global_scope(stored);
        Some(id)
    }

    /// Declares a function parameter in the current (function) scope.
    pub fn declare_param(
        &mut self,
        name: &str,
        line: u32,
        type_: Type,
        byref: bool,
        caseins: bool,
        rep: &mut Reporter<'_>,
    ) -> Option<SymbolId> {
        let (bare, forced) = strip_suffix(name);
        if let Some(existing) = self.get_entry(name, Some(self.current_scope()))
            && self.entry(existing).declared
        {
            rep.error(
                line,
                format!(
                    "Duplicated parameter '{bare}' (previous one at line {})",
                    self.entry(existing).line
                ),
            );
            return None;
        }
        if let Some(suffix_type) = forced
            && suffix_type != type_
        {
            rep.error(
                line,
                format!("'{bare}' suffix is for type '{suffix_type}' but it was declared as '{type_}'"),
            );
            return None;
        }
        let id = self.declare(name, line, caseins)?;
        let entry = self.entry_mut(id);
        entry.class = Some(Class::Var);
        entry.scope = ScopeKind::Parameter;
        entry.type_ = Some(type_);
        entry.byref = byref;
        entry.callable = Some(type_ == Type::Str);
        entry.declared = true;
        Some(id)
    }

    /// Declares an array. Errors if the name was already used as a callable
    /// before its declaration, or is already declared.
    pub fn declare_array(
        &mut self,
        name: &str,
        line: u32,
        type_: Type,
        implicit: bool,
        bounds: SmallVec<[Bound; 4]>,
        default_value: Option<DefaultValue>,
        caseins: bool,
        rep: &mut Reporter<'_>,
    ) -> Option<SymbolId> {
        if !self.check_class(name, Class::Array, line, Some(self.current_scope()), rep) {
            return None;
        }
        let (bare, _) = strip_suffix(name);

        let id = match self.get_entry(name, Some(self.current_scope())) {
            Some(id) => id,
            None => self.declare(name, line, caseins)?,
        };

        if self.entry(id).declared {
            let entry = self.entry(id);
            if entry.scope == ScopeKind::Parameter {
                rep.error(
                    line,
                    format!("variable '{bare}' already declared as a parameter at line {}", entry.line),
                );
            } else {
                rep.error(line, format!("variable '{bare}' already declared at line {}", entry.line));
            }
            return None;
        }
        if self.entry(id).callable == Some(true) {
            rep.error(
                line,
                format!(
                    "Array '{bare}' must be declared before use. First used at line {}",
                    self.entry(id).line
                ),
            );
            return None;
        }

        let mut element_type = type_;
        match self.entry(id).type_ {
            Some(existing) if existing != type_ => {
                if implicit {
                    element_type = existing;
                } else {
                    rep.error(
                        line,
                        format!("Array suffix for '{bare}' is for type '{existing}' but declared as '{type_}'"),
                    );
                    return None;
                }
            }
            _ => {
                if implicit {
                    rep.warning(line, format!("Variable '{bare}' declared as '{}'", type_.basic_name()));
                }
            }
        }

        let scope = self.declaring_scope();
        let entry = self.entry_mut(id);
        entry.class = Some(Class::Array);
        entry.declared = true;
        entry.type_ = Some(element_type);
        entry.scope = scope;
        entry.callable = Some(true);
        entry.bounds = bounds;
        entry.default_value = default_value;
        Some(id)
    }

    /// Declares (or re-encounters) a function. A forwarded entry keeps its
    /// type and `params_size`; the signature match against a redefinition is
    /// the caller's job once the parameter list is known.
    pub fn declare_func(&mut self, name: &str, line: u32, caseins: bool, rep: &mut Reporter<'_>) -> Option<SymbolId> {
        let (bare, forced) = strip_suffix(name);
        if !self.check_class(name, Class::Function, line, None, rep) {
            return None;
        }

        let existing = self.get_entry(name, None);
        let id = match existing {
            Some(id) => {
                let entry = self.entry(id);
                if entry.declared && !entry.forwarded {
                    rep.error(
                        line,
                        format!("Duplicate function name '{bare}', previously defined at line {}", entry.line),
                    );
                    return None;
                }
                if entry.callable == Some(false) {
                    rep.error(line, format!("'{bare}' is neither an array nor a function"));
                    return None;
                }
                if let Some(suffix_type) = forced
                    && entry.type_.is_some_and(|t| t != suffix_type)
                {
                    rep.error(line, format!("Function '{bare}' type mismatch"));
                    return None;
                }
                id
            }
            None => self.declare(name, line, caseins)?,
        };

        let forwarded_params_size = if self.entry(id).forwarded { self.entry(id).params_size } else { 0 };
        // `declared` stays false here: the definition factory flips it, so a
        // call to a merely-referenced function still lands on the pending
        // list.
        let entry = self.entry_mut(id);
        entry.class = Some(Class::Function);
        entry.callable = Some(true);
        entry.scope = ScopeKind::Global;
        entry.mangled = format!("_{}", entry.name);
        entry.locals_size = 0;
        entry.local_symbols = None;
        entry.params_size = forwarded_params_size;
        Some(id)
    }

    /// Records a function's kind (FUNCTION vs SUB), erroring if it
    /// contradicts an earlier sighting.
    pub fn set_kind(&mut self, id: SymbolId, kind: FuncKind, line: u32, rep: &mut Reporter<'_>) {
        let entry = self.entry(id);
        match entry.kind {
            Some(existing) if existing != kind => {
                let expected = match existing {
                    FuncKind::Function => FuncKind::Sub,
                    FuncKind::Sub => FuncKind::Function,
                };
                let name = entry.name.clone();
                rep.error(
                    line,
                    format!("'{name}' is a {}, not a {}", existing.keyword(), expected.keyword()),
                );
            }
            _ => self.entry_mut(id).kind = Some(kind),
        }
    }

    // -----------------------------------------------------------------
    // Selections over the current scope
    // -----------------------------------------------------------------

    fn select(&self, scope: usize, wanted: Class) -> Vec<SymbolId> {
        self.scopes[scope]
            .symbols
            .values()
            .copied()
            .filter(|id| self.entry(*id).class == Some(wanted))
            .collect()
    }

    /// Declared scalar variables of the global scope, in declaration order.
    pub fn global_vars(&self) -> Vec<SymbolId> {
        self.select(self.global_scope(), Class::Var)
    }

    /// Declared arrays of the global scope, in declaration order.
    pub fn global_arrays(&self) -> Vec<SymbolId> {
        self.select(self.global_scope(), Class::Array)
    }

    /// Declared labels of the global scope.
    pub fn labels(&self) -> Vec<SymbolId> {
        self.select(self.global_scope(), Class::Label)
    }

    /// Declared functions and subs.
    pub fn functions(&self) -> Vec<SymbolId> {
        self.select(self.global_scope(), Class::Function)
    }
}
