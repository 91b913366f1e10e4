//! The compiler's type system: the closed set of primitive type tags, their
//! storage sizes, common-type resolution and the compile-time numeric value
//! used for constant folding.
//!
//! Types are deliberately a flat `Copy` enum rather than interned objects:
//! the dialect has no user-composable types beyond arrays of primitives, so
//! identity comparison is all the front-end ever needs.

use std::fmt;

/// Primitive type tags of the language.
///
/// Sizes are the Z80 storage sizes in bytes; strings are stored as a 2-byte
/// pointer into the heap, so `Type::Str` reports 2.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, strum::Display, strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Type {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    Fixed,
    Float,
    #[strum(serialize = "string")]
    Str,
}

impl Type {
    /// Storage size in bytes.
    pub fn size(self) -> u16 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 | Self::Str => 2,
            Self::I32 | Self::U32 | Self::Fixed => 4,
            Self::Float => 5,
        }
    }

    /// The name used in source programs (`byte`, `uinteger`, ...), as opposed
    /// to the internal tag name produced by `Display`.
    pub fn basic_name(self) -> &'static str {
        match self {
            Self::I8 => "byte",
            Self::U8 => "ubyte",
            Self::I16 => "integer",
            Self::U16 => "uinteger",
            Self::I32 => "long",
            Self::U32 => "ulong",
            Self::Fixed => "fixed",
            Self::Float => "float",
            Self::Str => "string",
        }
    }

    /// Resolves a source-program type name to its tag.
    ///
    /// Lookup is case-insensitive, matching the dialect's keywords.
    pub fn from_basic_name(name: &str) -> Option<Self> {
        let lowered = name.to_ascii_lowercase();
        match lowered.as_str() {
            "byte" => Some(Self::I8),
            "ubyte" => Some(Self::U8),
            "integer" => Some(Self::I16),
            "uinteger" => Some(Self::U16),
            "long" => Some(Self::I32),
            "ulong" => Some(Self::U32),
            "fixed" => Some(Self::Fixed),
            "float" => Some(Self::Float),
            "string" => Some(Self::Str),
            _ => None,
        }
    }

    /// Maps a deprecated identifier suffix (`$`, `%`, `&`) to the type it
    /// forces. Returns `None` for any other character.
    pub fn from_suffix(suffix: char) -> Option<Self> {
        match suffix {
            '$' => Some(Self::Str),
            '%' => Some(Self::I16),
            '&' => Some(Self::I32),
            _ => None,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::I8 | Self::U8 | Self::I16 | Self::U16 | Self::I32 | Self::U32)
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32)
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::Fixed | Self::Float)
    }

    /// Everything except `string` is numeric.
    pub fn is_numeric(self) -> bool {
        self != Self::Str
    }

    pub fn is_string(self) -> bool {
        self == Self::Str
    }

    /// The signed integer of the same width. Signed and non-integer types map
    /// to themselves. Used when negating an unsigned operand.
    pub fn signed_sibling(self) -> Self {
        match self {
            Self::U8 => Self::I8,
            Self::U16 => Self::I16,
            Self::U32 => Self::I32,
            other => other,
        }
    }
}

/// The pointer type of the target platform (Z80).
pub const PTR_TYPE: Type = Type::U16;

/// Returns a type both operand types can be carried in, or `None` when
/// neither side has a type.
///
/// Resolution rules: identity if equal; an unknown side takes the other
/// side's type; `float` dominates `fixed` dominates `string`; otherwise the
/// wider integer wins and the result is signed unless both operands are
/// unsigned.
pub fn common_type(a: Option<Type>, b: Option<Type>) -> Option<Type> {
    let (a, b) = match (a, b) {
        (None, None) => return None,
        (Some(a), None) => return Some(a),
        (None, Some(b)) => return Some(b),
        (Some(a), Some(b)) => (a, b),
    };
    if a == b {
        return Some(a);
    }
    for dominant in [Type::Float, Type::Fixed, Type::Str] {
        if a == dominant || b == dominant {
            return Some(dominant);
        }
    }
    let wider = if a.size() > b.size() { a } else { b };
    if a.is_unsigned() && b.is_unsigned() {
        Some(wider)
    } else {
        Some(wider.signed_sibling())
    }
}

/// Why a compile-time arithmetic evaluation could not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldError {
    /// Division or modulo with a zero right-hand side.
    DivisionByZero,
    /// A shift by a negative literal amount.
    NegativeShift,
}

/// A compile-time numeric constant.
///
/// Mirrors the evaluator the folding rules are specified against: integer
/// results stay integers, anything fractional becomes a float, and a float
/// whose value is integral is normalized back to an integer so its inferred
/// type is derived from the integer ladder.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    /// Builds a value from a float, normalizing integral values to `Int`.
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() && value.fract() == 0.0 && value >= i64::MIN as f64 && value <= i64::MAX as f64 {
            Self::Int(value as i64)
        } else {
            Self::Float(value)
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    /// Truncation toward zero, the way `int()` rounds.
    pub fn trunc_i64(self) -> i64 {
        match self {
            Self::Int(v) => v,
            Self::Float(v) => v.trunc() as i64,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Self::Int(v) => v == 0,
            Self::Float(v) => v == 0.0,
        }
    }

    pub fn is_negative(self) -> bool {
        match self {
            Self::Int(v) => v < 0,
            Self::Float(v) => v < 0.0,
        }
    }

    /// Infers the narrowest type able to hold this literal value.
    ///
    /// Integers walk the ladder `u8`, `i8`, `u16`, `i16`, then 32 bits;
    /// floats fit `fixed` while inside the 16.16 range and `float` beyond it.
    pub fn type_of(self) -> Type {
        match self {
            Self::Int(v) => {
                if (0..256).contains(&v) {
                    Type::U8
                } else if (-128..128).contains(&v) {
                    Type::I8
                } else if (0..65536).contains(&v) {
                    Type::U16
                } else if (-32768..32768).contains(&v) {
                    Type::I16
                } else if v < 0 {
                    Type::I32
                } else {
                    Type::U32
                }
            }
            Self::Float(v) => {
                if -32768.0 < v && v < 32767.0 {
                    Type::Fixed
                } else {
                    Type::Float
                }
            }
        }
    }

    fn int_pair(self, other: Self) -> Option<(i64, i64)> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some((a, b)),
            _ => None,
        }
    }

    pub fn add(self, other: Self) -> Self {
        if let Some((a, b)) = self.int_pair(other)
            && let Some(r) = a.checked_add(b)
        {
            return Self::Int(r);
        }
        Self::from_f64(self.as_f64() + other.as_f64())
    }

    pub fn sub(self, other: Self) -> Self {
        if let Some((a, b)) = self.int_pair(other)
            && let Some(r) = a.checked_sub(b)
        {
            return Self::Int(r);
        }
        Self::from_f64(self.as_f64() - other.as_f64())
    }

    pub fn mul(self, other: Self) -> Self {
        if let Some((a, b)) = self.int_pair(other)
            && let Some(r) = a.checked_mul(b)
        {
            return Self::Int(r);
        }
        Self::from_f64(self.as_f64() * other.as_f64())
    }

    /// True division. Two integers that divide evenly stay an integer.
    pub fn div(self, other: Self) -> Result<Self, FoldError> {
        if other.is_zero() {
            return Err(FoldError::DivisionByZero);
        }
        if let Some((a, b)) = self.int_pair(other)
            && a % b == 0
        {
            return Ok(Self::Int(a / b));
        }
        Ok(Self::from_f64(self.as_f64() / other.as_f64()))
    }

    /// Modulo with the sign of the divisor.
    pub fn modulo(self, other: Self) -> Result<Self, FoldError> {
        if other.is_zero() {
            return Err(FoldError::DivisionByZero);
        }
        if let Some((a, b)) = self.int_pair(other) {
            let r = a.rem_euclid(b.abs());
            return Ok(Self::Int(if b < 0 && r != 0 { r - b.abs() } else { r }));
        }
        let (a, b) = (self.as_f64(), other.as_f64());
        let mut r = a % b;
        if r != 0.0 && (r < 0.0) != (b < 0.0) {
            r += b;
        }
        Ok(Self::from_f64(r))
    }

    pub fn pow(self, other: Self) -> Result<Self, FoldError> {
        if let Some((a, b)) = self.int_pair(other)
            && (0..=u32::MAX as i64).contains(&b)
        {
            if let Ok(exp) = u32::try_from(b)
                && let Some(r) = a.checked_pow(exp)
            {
                return Ok(Self::Int(r));
            }
        } else if self.is_zero() && other.is_negative() {
            return Err(FoldError::DivisionByZero);
        }
        Ok(Self::from_f64(self.as_f64().powf(other.as_f64())))
    }

    pub fn bit_and(self, other: Self) -> Self {
        Self::Int(self.trunc_i64() & other.trunc_i64())
    }

    pub fn bit_or(self, other: Self) -> Self {
        Self::Int(self.trunc_i64() | other.trunc_i64())
    }

    pub fn bit_xor(self, other: Self) -> Self {
        Self::Int(self.trunc_i64() ^ other.trunc_i64())
    }

    pub fn shl(self, other: Self) -> Result<Self, FoldError> {
        let amount = other.trunc_i64();
        if amount < 0 {
            return Err(FoldError::NegativeShift);
        }
        let value = self.trunc_i64();
        Ok(Self::Int(if amount >= 64 { 0 } else { value.wrapping_shl(amount as u32) }))
    }

    pub fn shr(self, other: Self) -> Result<Self, FoldError> {
        let amount = other.trunc_i64();
        if amount < 0 {
            return Err(FoldError::NegativeShift);
        }
        let value = self.trunc_i64();
        Ok(Self::Int(if amount >= 64 {
            if value < 0 { -1 } else { 0 }
        } else {
            value >> amount
        }))
    }

    /// Short-circuit AND on values: a false left side wins, otherwise the
    /// right side is the result.
    pub fn logical_and(self, other: Self) -> Self {
        if self.is_zero() { self } else { other }
    }

    /// Short-circuit OR on values: a true left side wins.
    pub fn logical_or(self, other: Self) -> Self {
        if self.is_zero() { other } else { self }
    }

    /// Boolean exclusive or, producing 0/1.
    pub fn logical_xor(self, other: Self) -> Self {
        Self::Int(i64::from(!self.is_zero() != !other.is_zero()))
    }

    fn cmp_f64(self, other: Self) -> std::cmp::Ordering {
        // Literal values are always finite, so total ordering via partial_cmp
        // cannot fail here.
        self.as_f64().partial_cmp(&other.as_f64()).unwrap_or(std::cmp::Ordering::Equal)
    }

    pub fn eq_num(self, other: Self) -> Self {
        Self::Int(i64::from(self.cmp_f64(other) == std::cmp::Ordering::Equal))
    }

    pub fn ne_num(self, other: Self) -> Self {
        Self::Int(i64::from(self.cmp_f64(other) != std::cmp::Ordering::Equal))
    }

    pub fn lt_num(self, other: Self) -> Self {
        Self::Int(i64::from(self.cmp_f64(other) == std::cmp::Ordering::Less))
    }

    pub fn le_num(self, other: Self) -> Self {
        Self::Int(i64::from(self.cmp_f64(other) != std::cmp::Ordering::Greater))
    }

    pub fn gt_num(self, other: Self) -> Self {
        Self::Int(i64::from(self.cmp_f64(other) == std::cmp::Ordering::Greater))
    }

    pub fn ge_num(self, other: Self) -> Self {
        Self::Int(i64::from(self.cmp_f64(other) != std::cmp::Ordering::Less))
    }

    pub fn neg(self) -> Self {
        match self {
            Self::Int(v) => Self::Int(v.wrapping_neg()),
            Self::Float(v) => Self::Float(-v),
        }
    }

    /// Boolean negation, producing 0/1.
    pub fn logical_not(self) -> Self {
        Self::Int(i64::from(self.is_zero()))
    }

    /// Bitwise complement on the truncated integer value.
    pub fn bit_not(self) -> Self {
        Self::Int(!self.trunc_i64())
    }

    pub fn abs(self) -> Self {
        match self {
            Self::Int(v) => Self::Int(v.wrapping_abs()),
            Self::Float(v) => Self::Float(v.abs()),
        }
    }

    /// Truncates this value into an integer target type, masking it modulo
    /// `2^(8*size)`. Returns the stored value and whether the truncation
    /// changed the magnitude (the "Conversion may lose significant digits"
    /// condition).
    ///
    /// Negative inputs compare against their two's-complement image so a
    /// value that already fits the signed range survives unchanged.
    pub fn truncated(self, target: Type) -> (Self, bool) {
        debug_assert!(target.is_integer(), "truncated() requires an integer target");
        let bits = u32::from(target.size()) * 8;
        let modulus = 1i64 << bits;
        let masked = self.trunc_i64() & (modulus - 1);
        let original = self.as_f64();
        if original >= 0.0 {
            let lost = masked as f64 != original;
            (Self::Int(masked), lost)
        } else if (modulus as f64) + original != masked as f64 {
            (Self::Int(masked - modulus), true)
        } else {
            (Self::Int(self.trunc_i64()), false)
        }
    }
}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}
