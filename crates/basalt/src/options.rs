//! Compilation options, settable by the caller or by source pragmas.
//!
//! Every option carries a save/restore stack beside its value so the
//! preprocessor's `push(name)` / `pop(name)` pragma pair can bracket a region
//! of source with a temporary setting.

use ahash::AHashMap;

use crate::types::Type;

/// Identifies one option for pragma push/pop, spelled the way pragmas
/// spell it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum OptionKey {
    Optimization,
    CaseInsensitive,
    ArrayBase,
    StringBase,
    Byref,
    MaxSyntaxErrors,
    EnableBreak,
    DefaultType,
}

/// A saved option value on a pragma stack.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
enum Saved {
    Int(i64),
    Bool(bool),
    Type(Type),
}

/// The full option set of one compilation unit.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Options {
    /// Optimization level; 0 disables constant-condition branch elimination.
    pub optimization: u8,
    /// Whether user identifiers are case insensitive.
    pub case_insensitive: bool,
    /// Default lower bound for single-argument array declarations.
    pub array_base: i64,
    /// Subtracted from string-slice bounds before rebasing to zero.
    pub string_base: i64,
    /// Default parameter passing; `true` means by reference.
    pub byref: bool,
    /// Error count beyond which compilation gives up.
    pub max_syntax_errors: u32,
    /// When set, the statement sequencer inserts break-check sentences.
    pub enable_break: bool,
    /// Type given to implicitly declared identifiers.
    pub default_type: Type,
    /// One save stack per option, keyed by pragma name.
    stacks: AHashMap<OptionKey, Vec<Saved>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            optimization: 0,
            case_insensitive: false,
            array_base: 0,
            string_base: 0,
            byref: false,
            max_syntax_errors: 20,
            enable_break: false,
            default_type: Type::Float,
            stacks: AHashMap::new(),
        }
    }
}

impl Options {
    fn current(&self, key: OptionKey) -> Saved {
        match key {
            OptionKey::Optimization => Saved::Int(i64::from(self.optimization)),
            OptionKey::CaseInsensitive => Saved::Bool(self.case_insensitive),
            OptionKey::ArrayBase => Saved::Int(self.array_base),
            OptionKey::StringBase => Saved::Int(self.string_base),
            OptionKey::Byref => Saved::Bool(self.byref),
            OptionKey::MaxSyntaxErrors => Saved::Int(i64::from(self.max_syntax_errors)),
            OptionKey::EnableBreak => Saved::Bool(self.enable_break),
            OptionKey::DefaultType => Saved::Type(self.default_type),
        }
    }

    fn restore(&mut self, key: OptionKey, saved: Saved) {
        match (key, saved) {
            (OptionKey::Optimization, Saved::Int(v)) => self.optimization = v as u8,
            (OptionKey::CaseInsensitive, Saved::Bool(v)) => self.case_insensitive = v,
            (OptionKey::ArrayBase, Saved::Int(v)) => self.array_base = v,
            (OptionKey::StringBase, Saved::Int(v)) => self.string_base = v,
            (OptionKey::Byref, Saved::Bool(v)) => self.byref = v,
            (OptionKey::MaxSyntaxErrors, Saved::Int(v)) => self.max_syntax_errors = v as u32,
            (OptionKey::EnableBreak, Saved::Bool(v)) => self.enable_break = v,
            (OptionKey::DefaultType, Saved::Type(v)) => self.default_type = v,
            _ => unreachable!("saved value kind always matches its key"),
        }
    }

    /// Saves the current value of `key` on its stack (`#pragma push(...)`).
    pub fn push(&mut self, key: OptionKey) {
        let saved = self.current(key);
        self.stacks.entry(key).or_default().push(saved);
    }

    /// Restores the most recently pushed value of `key`. Returns `false` when
    /// nothing was pushed, leaving the option untouched.
    pub fn pop(&mut self, key: OptionKey) -> bool {
        match self.stacks.get_mut(&key).and_then(Vec::pop) {
            Some(saved) => {
                self.restore(key, saved);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn push_pop_restores_one_option() {
        let mut options = Options::default();
        options.push(OptionKey::ArrayBase);
        options.array_base = 1;
        options.case_insensitive = true;
        assert!(options.pop(OptionKey::ArrayBase));
        assert_eq!(options.array_base, 0);
        // Other options are untouched by the pop.
        assert!(options.case_insensitive);
    }

    #[test]
    fn pop_without_push_is_reported() {
        let mut options = Options::default();
        assert!(!options.pop(OptionKey::Optimization));
    }

    #[test]
    fn option_keys_parse_from_pragma_names() {
        assert_eq!(OptionKey::from_str("case_insensitive"), Ok(OptionKey::CaseInsensitive));
        assert_eq!(OptionKey::from_str("string_base"), Ok(OptionKey::StringBase));
        assert!(OptionKey::from_str("no_such_option").is_err());
    }
}
