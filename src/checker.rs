// addon-shell/src/checker.rs

//! Value checkers: typed coercion of raw input with arity bounds.
//!
//! Leaf checkers ([`StringChecker`], [`IntegerChecker`], [`FloatChecker`],
//! [`BooleanChecker`], [`FilePathChecker`]) coerce exactly one item each.
//! [`ListChecker`] wraps a leaf and validates a sequence in chunks of the
//! leaf's arity. [`ArgChecker`] is what a parameter's settings hold.

use std::{fmt, path::PathBuf, sync::Arc};

use crate::{
    error::{ShellError, ShellResult},
    value::{ParamValue, Value},
};

pub trait ValueChecker: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &'static str;

    /// Number of raw items consumed to build one value.
    fn arity(&self) -> usize { 1 }

    /// Coerce one chunk of exactly `arity()` raw items.
    fn check(&self, chunk: &[Value], position: Option<usize>) -> ShellResult<Value>;

    fn default_value(&self) -> Option<&Value>;
    fn has_default(&self) -> bool { self.default_value().is_some() }

    fn usage(&self) -> String { format!("<{}>", self.type_name()) }
}

/// Default value storage for leaf checkers. A slot created for a shared
/// instance refuses to be overwritten, clones included.
#[derive(Clone, Debug, Default)]
pub struct DefaultSlot {
    value: Option<Value>,
    shared: bool,
}

impl DefaultSlot {
    fn shared() -> Self { Self { value: None, shared: true } }

    pub fn get(&self) -> Option<&Value> { self.value.as_ref() }
    pub fn is_shared(&self) -> bool { self.shared }

    fn set(&mut self, value: Value, type_name: &str) -> ShellResult<()> {
        if self.shared {
            return Err(ShellError::invariant(format!(
                "the shared default {type_name} checker cannot take a default value, build a dedicated instance"
            )));
        }
        self.value = Some(value);
        Ok(())
    }
}

fn single<'a>(chunk: &'a [Value], type_name: &str, position: Option<usize>) -> ShellResult<&'a Value> {
    match chunk {
        [v] => Ok(v),
        _ => Err(ShellError::invalid(format!(
            "{type_name}{} expects exactly one item, got {}", at(position), chunk.len()
        ))),
    }
}

fn at(position: Option<usize>) -> String {
    position.map(|p| format!(" at position {p}")).unwrap_or_default()
}

macro_rules! default_setters {
    ($t:ty) => {
        impl $t {
            /// Validates `value` and stores it as this checker's default.
            pub fn set_default(&mut self, value: Value) -> ShellResult<()> {
                let checked = self.check(std::slice::from_ref(&value), None)?;
                let name = self.type_name();
                self.default.set(checked, name)
            }

            pub fn with_default(mut self, value: impl Into<Value>) -> ShellResult<Self> {
                self.set_default(value.into())?;
                Ok(self)
            }

            pub fn is_shared(&self) -> bool { self.default.is_shared() }
        }
    };
}

#[derive(Clone, Debug, Default)]
pub struct StringChecker {
    pub min_len: usize,
    pub max_len: Option<usize>,
    default: DefaultSlot,
}

impl StringChecker {
    pub fn new() -> Self { Self::default() }

    pub fn with_bounds(min_len: usize, max_len: Option<usize>) -> ShellResult<Self> {
        check_bounds(min_len, max_len)?;
        Ok(Self { min_len, max_len, default: DefaultSlot::default() })
    }
}

impl ValueChecker for StringChecker {
    fn type_name(&self) -> &'static str { "string" }

    fn check(&self, chunk: &[Value], position: Option<usize>) -> ShellResult<Value> {
        let s = match single(chunk, self.type_name(), position)? {
            Value::Str(s) => s.clone(),
            Value::Path(p) => p.display().to_string(),
            other => other.to_string(),
        };
        let n = s.chars().count();
        if n < self.min_len || self.max_len.is_some_and(|m| n > m) {
            return Err(ShellError::invalid(format!(
                "string{} has length {n}, expected {}", at(position), range_text(self.min_len, self.max_len)
            )));
        }
        Ok(Value::Str(s))
    }

    fn default_value(&self) -> Option<&Value> { self.default.get() }
}
default_setters!(StringChecker);

#[derive(Clone, Debug, Default)]
pub struct IntegerChecker {
    pub min: Option<i64>,
    pub max: Option<i64>,
    default: DefaultSlot,
}

impl IntegerChecker {
    pub fn new() -> Self { Self::default() }

    pub fn with_range(min: Option<i64>, max: Option<i64>) -> ShellResult<Self> {
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi { return Err(ShellError::registration(format!("integer range {lo}..{hi} is empty"))); }
        }
        Ok(Self { min, max, default: DefaultSlot::default() })
    }
}

impl ValueChecker for IntegerChecker {
    fn type_name(&self) -> &'static str { "integer" }

    fn check(&self, chunk: &[Value], position: Option<usize>) -> ShellResult<Value> {
        let i = match single(chunk, self.type_name(), position)? {
            Value::Int(i) => *i,
            Value::Str(s) => s.trim().parse::<i64>().map_err(|_| {
                ShellError::invalid(format!("'{s}'{} is not an integer", at(position)))
            })?,
            other => return Err(ShellError::invalid(format!(
                "expected integer{}, got {}", at(position), other.type_name()
            ))),
        };
        if self.min.is_some_and(|m| i < m) || self.max.is_some_and(|m| i > m) {
            return Err(ShellError::invalid(format!("{i}{} is out of range", at(position))));
        }
        Ok(Value::Int(i))
    }

    fn default_value(&self) -> Option<&Value> { self.default.get() }

    fn usage(&self) -> String {
        match (self.min, self.max) {
            (None, None) => "<integer>".into(),
            (lo, hi) => format!("<integer {}..{}>", lo.map(|v| v.to_string()).unwrap_or_default(), hi.map(|v| v.to_string()).unwrap_or_default()),
        }
    }
}
default_setters!(IntegerChecker);

#[derive(Clone, Debug, Default)]
pub struct FloatChecker {
    pub min: Option<f64>,
    pub max: Option<f64>,
    default: DefaultSlot,
}

impl FloatChecker {
    pub fn new() -> Self { Self::default() }
}

impl ValueChecker for FloatChecker {
    fn type_name(&self) -> &'static str { "float" }

    fn check(&self, chunk: &[Value], position: Option<usize>) -> ShellResult<Value> {
        let x = match single(chunk, self.type_name(), position)? {
            Value::Float(x) => *x,
            Value::Int(i) => *i as f64,
            Value::Str(s) => s.trim().parse::<f64>().map_err(|_| {
                ShellError::invalid(format!("'{s}'{} is not a float", at(position)))
            })?,
            other => return Err(ShellError::invalid(format!(
                "expected float{}, got {}", at(position), other.type_name()
            ))),
        };
        if !x.is_finite() { return Err(ShellError::invalid(format!("{x}{} is not finite", at(position)))); }
        if self.min.is_some_and(|m| x < m) || self.max.is_some_and(|m| x > m) {
            return Err(ShellError::invalid(format!("{x}{} is out of range", at(position))));
        }
        Ok(Value::Float(x))
    }

    fn default_value(&self) -> Option<&Value> { self.default.get() }
}
default_setters!(FloatChecker);

#[derive(Clone, Debug, Default)]
pub struct BooleanChecker {
    default: DefaultSlot,
}

impl BooleanChecker {
    pub fn new() -> Self { Self::default() }
}

impl ValueChecker for BooleanChecker {
    fn type_name(&self) -> &'static str { "boolean" }

    fn check(&self, chunk: &[Value], position: Option<usize>) -> ShellResult<Value> {
        match single(chunk, self.type_name(), position)? {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Int(0) => Ok(Value::Bool(false)),
            Value::Int(1) => Ok(Value::Bool(true)),
            Value::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err(ShellError::invalid(format!("'{s}'{} is not a boolean", at(position)))),
            },
            other => Err(ShellError::invalid(format!("expected boolean{}, got {other}", at(position)))),
        }
    }

    fn default_value(&self) -> Option<&Value> { self.default.get() }
    fn usage(&self) -> String { "<true|false>".into() }
}
default_setters!(BooleanChecker);

#[derive(Clone, Debug, Default)]
pub struct FilePathChecker {
    pub must_exist: bool,
    default: DefaultSlot,
}

impl FilePathChecker {
    pub fn new() -> Self { Self::default() }
    pub fn existing() -> Self { Self { must_exist: true, default: DefaultSlot::default() } }
}

impl ValueChecker for FilePathChecker {
    fn type_name(&self) -> &'static str { "path" }

    fn check(&self, chunk: &[Value], position: Option<usize>) -> ShellResult<Value> {
        let p = match single(chunk, self.type_name(), position)? {
            Value::Path(p) => p.clone(),
            Value::Str(s) if !s.is_empty() => PathBuf::from(s),
            other => return Err(ShellError::invalid(format!("'{other}'{} is not a path", at(position)))),
        };
        if self.must_exist && !p.exists() {
            return Err(ShellError::invalid(format!("path {} does not exist", p.display())));
        }
        Ok(Value::Path(p))
    }

    fn default_value(&self) -> Option<&Value> { self.default.get() }
}
default_setters!(FilePathChecker);

fn check_bounds(min: usize, max: Option<usize>) -> ShellResult<()> {
    match max {
        Some(m) if min > m => Err(ShellError::registration(format!("min size {min} exceeds max size {m}"))),
        _ => Ok(()),
    }
}

fn range_text(min: usize, max: Option<usize>) -> String {
    match max {
        Some(m) if m == min => format!("{min}"),
        Some(m) => format!("{min}..={m}"),
        None => format!("at least {min}"),
    }
}

/// Sequence checker over a non-list leaf.
#[derive(Clone, Debug)]
pub struct ListChecker {
    inner: Arc<dyn ValueChecker>,
    min_size: usize,
    max_size: Option<usize>,
}

impl ListChecker {
    pub fn new(inner: Arc<dyn ValueChecker>, min_size: usize, max_size: Option<usize>) -> ShellResult<Self> {
        check_bounds(min_size, max_size)?;
        if inner.arity() == 0 {
            return Err(ShellError::registration(format!("{} checker has zero arity and cannot be listed", inner.type_name())));
        }
        Ok(Self { inner, min_size, max_size })
    }

    pub fn unbounded(inner: Arc<dyn ValueChecker>) -> Self { Self { inner, min_size: 0, max_size: None } }

    pub fn inner(&self) -> &Arc<dyn ValueChecker> { &self.inner }
    pub fn min_size(&self) -> usize { self.min_size }
    pub fn max_size(&self) -> Option<usize> { self.max_size }

    pub fn validate(&self, raw: &[Value]) -> ShellResult<Vec<Value>> {
        let arity = self.inner.arity();
        if raw.len() % arity != 0 {
            return Err(ShellError::invalid(format!(
                "{} items do not split into groups of {arity}", raw.len()
            )));
        }
        let count = raw.len() / arity;
        if let Some(max) = self.max_size {
            if count > max {
                return Err(ShellError::invalid(format!("got {count} values, expected {}", range_text(self.min_size, self.max_size))));
            }
        }
        let mut out = Vec::with_capacity(count.max(self.min_size));
        for (i, chunk) in raw.chunks(arity).enumerate() {
            out.push(self.inner.check(chunk, Some(i))?);
        }
        if out.len() < self.min_size {
            let Some(pad) = self.inner.default_value() else {
                return Err(ShellError::invalid(format!(
                    "got {count} values, expected {}", range_text(self.min_size, self.max_size)
                )));
            };
            out.resize(self.min_size, pad.clone());
        }
        Ok(out)
    }

    pub fn usage(&self) -> String {
        let item = self.inner.usage();
        match (self.min_size, self.max_size) {
            (0, None) => format!("[{item} ...]"),
            (n, None) => format!("{item}{{{n},}}"),
            (n, Some(m)) => format!("{item}{{{n},{m}}}"),
        }
    }
}

/// The checker attached to a parameter's settings.
#[derive(Clone, Debug)]
pub enum ArgChecker {
    Single(Arc<dyn ValueChecker>),
    List(ListChecker),
}

impl ArgChecker {
    pub fn single(checker: impl ValueChecker + 'static) -> Self { Self::Single(Arc::new(checker)) }

    pub fn list(checker: impl ValueChecker + 'static) -> Self { Self::List(ListChecker::unbounded(Arc::new(checker))) }

    pub fn is_list(&self) -> bool { matches!(self, Self::List(_)) }

    pub fn item_checker(&self) -> &Arc<dyn ValueChecker> {
        match self { Self::Single(c) => c, Self::List(l) => l.inner() }
    }

    pub fn type_name(&self) -> &'static str { self.item_checker().type_name() }

    pub fn min_size(&self) -> usize {
        match self { Self::Single(c) => c.arity(), Self::List(l) => l.min_size() * l.inner().arity() }
    }

    pub fn max_size(&self) -> Option<usize> {
        match self { Self::Single(c) => Some(c.arity()), Self::List(l) => l.max_size().map(|m| m * l.inner().arity()) }
    }

    pub fn default_value(&self) -> Option<&Value> { self.item_checker().default_value() }

    pub fn usage(&self) -> String {
        match self { Self::Single(c) => c.usage(), Self::List(l) => l.usage() }
    }

    pub fn validate(&self, raw: &[Value]) -> ShellResult<ParamValue> {
        match self {
            Self::Single(c) => {
                if raw.is_empty() {
                    if let Some(d) = c.default_value() { return Ok(ParamValue::Scalar(d.clone())); }
                }
                if raw.len() != c.arity() {
                    return Err(ShellError::invalid(format!(
                        "{} expects {} item(s), got {}", c.type_name(), c.arity(), raw.len()
                    )));
                }
                c.check(raw, None).map(ParamValue::Scalar)
            }
            Self::List(l) => l.validate(raw).map(ParamValue::List),
        }
    }

    /// Same leaf, with the list wrapping toggled.
    pub fn with_list(&self, list: bool) -> Self {
        match (self, list) {
            (Self::Single(c), true) => Self::List(ListChecker::unbounded(c.clone())),
            (Self::List(l), false) => Self::Single(l.inner().clone()),
            (same, _) => same.clone(),
        }
    }

    /// Swap the leaf while keeping list status and bounds.
    pub fn with_item_checker(&self, item: Arc<dyn ValueChecker>) -> ShellResult<Self> {
        Ok(match self {
            Self::Single(_) => Self::Single(item),
            Self::List(l) => Self::List(ListChecker::new(item, l.min_size(), l.max_size())?),
        })
    }
}

/// Shared, default-less checker instances, built once by the host.
#[derive(Clone, Debug)]
pub struct CheckerRegistry {
    string: Arc<StringChecker>,
    integer: Arc<IntegerChecker>,
    float: Arc<FloatChecker>,
    boolean: Arc<BooleanChecker>,
    path: Arc<FilePathChecker>,
}

impl Default for CheckerRegistry {
    fn default() -> Self { Self::new() }
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self {
            string: Arc::new(StringChecker { default: DefaultSlot::shared(), ..StringChecker::default() }),
            integer: Arc::new(IntegerChecker { default: DefaultSlot::shared(), ..IntegerChecker::default() }),
            float: Arc::new(FloatChecker { default: DefaultSlot::shared(), ..FloatChecker::default() }),
            boolean: Arc::new(BooleanChecker { default: DefaultSlot::shared() }),
            path: Arc::new(FilePathChecker { default: DefaultSlot::shared(), must_exist: false }),
        }
    }

    pub fn string(&self) -> Arc<dyn ValueChecker> { self.string.clone() }
    pub fn integer(&self) -> Arc<dyn ValueChecker> { self.integer.clone() }
    pub fn float(&self) -> Arc<dyn ValueChecker> { self.float.clone() }
    pub fn boolean(&self) -> Arc<dyn ValueChecker> { self.boolean.clone() }
    pub fn path(&self) -> Arc<dyn ValueChecker> { self.path.clone() }

    pub fn by_type_name(&self, name: &str) -> Option<Arc<dyn ValueChecker>> {
        match name {
            "string" => Some(self.string()),
            "integer" => Some(self.integer()),
            "float" => Some(self.float()),
            "boolean" => Some(self.boolean()),
            "path" => Some(self.path()),
            _ => None,
        }
    }

    /// Checker matching an already-typed value.
    pub fn for_value(&self, value: &Value) -> Arc<dyn ValueChecker> {
        self.by_type_name(value.type_name()).unwrap_or_else(|| self.string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(items: &[&str]) -> Vec<Value> { items.iter().map(|s| Value::str(*s)).collect() }

    #[test]
    fn test_list_pads_with_inner_default() {
        let inner = IntegerChecker::new().with_default(42i64).unwrap();
        let list = ListChecker::new(Arc::new(inner), 3, None).unwrap();
        let out = list.validate(&strs(&["1", "2"])).unwrap();
        assert_eq!(out, vec![Value::Int(1), Value::Int(2), Value::Int(42)]);
    }

    #[test]
    fn test_list_underflow_without_default_fails() {
        let list = ListChecker::new(Arc::new(IntegerChecker::new()), 3, None).unwrap();
        let err = list.validate(&strs(&["1"])).unwrap_err();
        assert!(matches!(err, ShellError::InvalidArgument(_)), "got: {err}");
    }

    #[test]
    fn test_list_overflow_fails() {
        let list = ListChecker::new(Arc::new(StringChecker::new()), 0, Some(2)).unwrap();
        assert!(list.validate(&strs(&["a", "b"])).is_ok());
        assert!(list.validate(&strs(&["a", "b", "c"])).is_err());
    }

    #[test]
    fn test_list_bounds_must_be_ordered() {
        let err = ListChecker::new(Arc::new(StringChecker::new()), 3, Some(1)).unwrap_err();
        assert!(matches!(err, ShellError::Registration(_)));
    }

    #[test]
    fn test_integer_range_and_parse() {
        let c = IntegerChecker::with_range(Some(0), Some(10)).unwrap();
        assert_eq!(c.check(&strs(&["7"]), None).unwrap(), Value::Int(7));
        assert!(c.check(&strs(&["11"]), None).is_err());
        let err = c.check(&strs(&["x"]), Some(2)).unwrap_err();
        assert!(err.to_string().contains("at position 2"), "got: {err}");
    }

    #[test]
    fn test_boolean_spellings() {
        let c = BooleanChecker::new();
        assert_eq!(c.check(&strs(&["True"]), None).unwrap(), Value::Bool(true));
        assert_eq!(c.check(&strs(&["off"]), None).unwrap(), Value::Bool(false));
        assert!(c.check(&strs(&["maybe"]), None).is_err());
    }

    #[test]
    fn test_single_arity_mismatch() {
        let c = ArgChecker::single(FloatChecker::new());
        assert!(c.validate(&strs(&["1.5", "2"])).is_err());
        assert_eq!(c.validate(&strs(&["1.5"])).unwrap(), ParamValue::Scalar(Value::Float(1.5)));
    }

    #[test]
    fn test_shared_default_instance_refuses_default() {
        let reg = CheckerRegistry::new();
        let mut copy = (*reg.integer).clone();
        assert!(copy.is_shared());
        let err = copy.set_default(Value::Int(1)).unwrap_err();
        assert!(matches!(err, ShellError::InvariantViolation(_)), "got: {err}");
        let mut own = IntegerChecker::new();
        own.set_default(Value::str("5")).unwrap();
        assert_eq!(own.default_value(), Some(&Value::Int(5)));
    }

    #[test]
    fn test_toggle_list_keeps_leaf() {
        let c = ArgChecker::single(StringChecker::new());
        let l = c.with_list(true);
        assert!(l.is_list());
        assert_eq!(l.type_name(), "string");
        assert!(!l.with_list(false).is_list());
        let swapped = l.with_item_checker(Arc::new(IntegerChecker::new())).unwrap();
        assert!(swapped.is_list());
        assert_eq!(swapped.type_name(), "integer");
    }
}
