//! Typed flag values and the shared storage cells behind them.
//!
//! A [`Var`] is the single mutable cell for one flag definition. Every flag set that
//! registers the flag (the defining set and each importer) holds a handle to the same
//! cell, so a write through any of them is visible through all of them.

use std::cell::RefCell;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;
use std::time::Duration;

use thiserror::Error;

/// The primitive types a flag can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagKind {
    Bool,
    Int,
    Int64,
    Uint,
    Uint64,
    String,
    Float64,
    Duration,
}

impl FlagKind {
    /// Name of the kind, e.g. `int64` or `duration`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Int64 => "int64",
            Self::Uint => "uint",
            Self::Uint64 => "uint64",
            Self::String => "string",
            Self::Float64 => "float64",
            Self::Duration => "duration",
        }
    }
}

impl Display for FlagKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raised when the textual form of a flag value cannot be converted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("invalid {kind} value {raw:?}: {reason}")]
    Syntax {
        kind: FlagKind,
        raw: String,
        reason: String,
    },
    #[error("{kind} value {raw:?} is out of range")]
    Range { kind: FlagKind, raw: String },
}

impl ValueError {
    fn syntax(kind: FlagKind, raw: &str, reason: impl Into<String>) -> Self {
        Self::Syntax {
            kind,
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    fn range(kind: FlagKind, raw: &str) -> Self {
        Self::Range {
            kind,
            raw: raw.to_string(),
        }
    }
}

/// A Rust type that can back a flag.
///
/// `KIND` is the type tag the declaration facade is keyed by.
pub trait FlagType: Clone + Debug + 'static {
    const KIND: FlagKind;

    /// Converts the textual form used on the command line and in config files.
    fn parse_flag(raw: &str) -> Result<Self, ValueError>;

    /// Renders the value so that `parse_flag` accepts it back.
    fn format_flag(&self) -> String;
}

impl FlagType for bool {
    const KIND: FlagKind = FlagKind::Bool;

    fn parse_flag(raw: &str) -> Result<Self, ValueError> {
        match raw {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
            _ => Err(ValueError::syntax(Self::KIND, raw, "expected a boolean")),
        }
    }

    fn format_flag(&self) -> String {
        self.to_string()
    }
}

macro_rules! integer_flag_type {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl FlagType for $ty {
                const KIND: FlagKind = FlagKind::$kind;

                fn parse_flag(raw: &str) -> Result<Self, ValueError> {
                    let value = parse_integer(raw).map_err(|err| match err {
                        IntegerError::Syntax(reason) => ValueError::syntax(Self::KIND, raw, reason),
                        IntegerError::Range => ValueError::range(Self::KIND, raw),
                    })?;
                    <$ty>::try_from(value).map_err(|_| ValueError::range(Self::KIND, raw))
                }

                fn format_flag(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

integer_flag_type!(isize => Int, i64 => Int64, usize => Uint, u64 => Uint64);

impl FlagType for String {
    const KIND: FlagKind = FlagKind::String;

    fn parse_flag(raw: &str) -> Result<Self, ValueError> {
        Ok(raw.to_string())
    }

    fn format_flag(&self) -> String {
        self.clone()
    }
}

impl FlagType for f64 {
    const KIND: FlagKind = FlagKind::Float64;

    fn parse_flag(raw: &str) -> Result<Self, ValueError> {
        raw.parse::<f64>()
            .map_err(|_| ValueError::syntax(Self::KIND, raw, "expected a floating point number"))
    }

    fn format_flag(&self) -> String {
        self.to_string()
    }
}

impl FlagType for Duration {
    const KIND: FlagKind = FlagKind::Duration;

    fn parse_flag(raw: &str) -> Result<Self, ValueError> {
        parse_duration(raw)
    }

    fn format_flag(&self) -> String {
        format_duration(*self)
    }
}

enum IntegerError {
    Syntax(&'static str),
    Range,
}

/// Parses an integer literal: optional sign, `0x`/`0o`/`0b` prefix or a legacy
/// leading-zero octal, and `_` digit separators.
fn parse_integer(raw: &str) -> Result<i128, IntegerError> {
    let (negative, body) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };

    let (radix, digits) = if let Some(rest) = strip_radix_prefix(body, 'x') {
        (16, rest)
    } else if let Some(rest) = strip_radix_prefix(body, 'o') {
        (8, rest)
    } else if let Some(rest) = strip_radix_prefix(body, 'b') {
        (2, rest)
    } else if body.len() > 1 && body.starts_with('0') {
        (8, &body[1..])
    } else {
        (10, body)
    };

    if digits.is_empty() {
        return Err(IntegerError::Syntax("missing digits"));
    }
    if digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return Err(IntegerError::Syntax("misplaced digit separator"));
    }

    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    if !cleaned.chars().all(|c| c.is_digit(radix)) {
        return Err(IntegerError::Syntax("invalid digit"));
    }

    let magnitude = u128::from_str_radix(&cleaned, radix).map_err(|_| IntegerError::Range)?;
    let magnitude = i128::try_from(magnitude).map_err(|_| IntegerError::Range)?;
    Ok(if negative { -magnitude } else { magnitude })
}

fn strip_radix_prefix(body: &str, marker: char) -> Option<&str> {
    let rest = body.strip_prefix('0')?;
    rest.strip_prefix(marker)
        .or_else(|| rest.strip_prefix(marker.to_ascii_uppercase()))
}

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;
const NANOS_PER_MINUTE: u128 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MINUTE;

// Fraction digits beyond this cannot change a nanosecond count.
const MAX_FRACTION_DIGITS: usize = 18;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "\u{b5}s" | "\u{3bc}s" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(NANOS_PER_MINUTE),
        "h" => Some(NANOS_PER_HOUR),
        _ => None,
    }
}

/// Parses a duration such as `300ms`, `1.5h` or `2h45m`.
///
/// Each component is a decimal number with an optional fraction followed by one of
/// `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `0` needs no unit. Negative
/// durations other than zero are rejected because [`Duration`] cannot hold them.
pub fn parse_duration(raw: &str) -> Result<Duration, ValueError> {
    let kind = FlagKind::Duration;
    let (negative, mut rest) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(ValueError::syntax(kind, raw, "empty duration"));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, after) = rest.split_at(int_len);
        let (frac_part, after) = match after.strip_prefix('.') {
            Some(tail) => {
                let frac_len = tail.bytes().take_while(u8::is_ascii_digit).count();
                tail.split_at(frac_len)
            }
            None => ("", after),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ValueError::syntax(kind, raw, "expected a number"));
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, tail) = after.split_at(unit_len);
        let scale = match unit_nanos(unit) {
            Some(scale) => scale,
            None if unit.is_empty() => return Err(ValueError::syntax(kind, raw, "missing unit")),
            None => {
                return Err(ValueError::syntax(
                    kind,
                    raw,
                    format!("unknown unit {unit:?}"),
                ))
            }
        };

        let whole = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse::<u128>()
                .map_err(|_| ValueError::range(kind, raw))?
        };
        if whole > u128::from(u64::MAX) {
            return Err(ValueError::range(kind, raw));
        }
        let mut component = whole
            .checked_mul(scale)
            .ok_or_else(|| ValueError::range(kind, raw))?;

        let frac_part = &frac_part[..frac_part.len().min(MAX_FRACTION_DIGITS)];
        if !frac_part.is_empty() {
            let frac = frac_part
                .parse::<u128>()
                .map_err(|_| ValueError::syntax(kind, raw, "invalid fraction"))?;
            component = component
                .checked_add(frac * scale / 10u128.pow(frac_part.len() as u32))
                .ok_or_else(|| ValueError::range(kind, raw))?;
        }

        total = total
            .checked_add(component)
            .ok_or_else(|| ValueError::range(kind, raw))?;
        rest = tail;
    }

    if total > u128::from(u64::MAX) {
        return Err(ValueError::range(kind, raw));
    }
    if negative && total != 0 {
        return Err(ValueError::syntax(
            kind,
            raw,
            "negative durations are not supported",
        ));
    }
    Ok(Duration::from_nanos(total as u64))
}

/// Renders a duration in the grammar [`parse_duration`] accepts, e.g. `1h2m3.5s`.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < NANOS_PER_MICRO {
        return format!("{nanos}ns");
    }
    if nanos < NANOS_PER_MILLI {
        return format!("{}\u{b5}s", decimal(nanos, NANOS_PER_MICRO));
    }
    if nanos < NANOS_PER_SEC {
        return format!("{}ms", decimal(nanos, NANOS_PER_MILLI));
    }

    let hours = nanos / NANOS_PER_HOUR;
    let minutes = nanos / NANOS_PER_MINUTE % 60;
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    out.push_str(&decimal(nanos % NANOS_PER_MINUTE, NANOS_PER_SEC));
    out.push('s');
    out
}

fn decimal(value: u128, unit: u128) -> String {
    let (whole, frac) = (value / unit, value % unit);
    if frac == 0 {
        return whole.to_string();
    }
    let width = unit.ilog10() as usize;
    let digits = format!("{frac:0width$}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

/// A shared, mutable storage cell for one flag.
///
/// Cloning a `Var` clones the handle, not the value.
pub struct Var<T>(Rc<RefCell<T>>);

impl<T> Var<T> {
    /// Allocates a new cell holding `value`.
    pub fn new(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// Replaces the value seen by every handle to this cell.
    pub fn set(&self, value: T) {
        *self.0.borrow_mut() = value;
    }

    /// Runs `f` against the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0.borrow())
    }

    /// Returns true when both handles point at the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone> Var<T> {
    /// Clones the current value out of the cell.
    pub fn get(&self) -> T {
        self.0.borrow().clone()
    }
}

impl<T> Clone for Var<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: Default> Default for Var<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Debug> Debug for Var<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Var").field(&*self.0.borrow()).finish()
    }
}

/// The settable/gettable capability a flag set stores for each flag.
pub trait Value: Debug {
    fn kind(&self) -> FlagKind;

    /// Parses `raw` and stores the result in the underlying cell.
    fn set_str(&self, raw: &str) -> Result<(), ValueError>;

    fn get_string(&self) -> String;

    /// Bool flags may appear on the command line without a value.
    fn is_bool_flag(&self) -> bool {
        self.kind() == FlagKind::Bool
    }
}

impl<T: FlagType> Value for Var<T> {
    fn kind(&self) -> FlagKind {
        T::KIND
    }

    fn set_str(&self, raw: &str) -> Result<(), ValueError> {
        let parsed = T::parse_flag(raw)?;
        self.set(parsed);
        Ok(())
    }

    fn get_string(&self) -> String {
        self.with(T::format_flag)
    }
}
