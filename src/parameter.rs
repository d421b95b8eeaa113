// addon-shell/src/parameter.rs

use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use crate::{
    checker::{BooleanChecker, IntegerChecker, ValueChecker},
    error::{ShellError, ShellResult},
    loader::LoaderKind,
    settings::{ContextIndex, Property, Settings},
    value::{ParamValue, Value},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind { Environment, Context, Variable, Key, Procedure }

impl ParameterKind {
    pub const ALL: [ParameterKind; 5] = [Self::Environment, Self::Context, Self::Variable, Self::Key, Self::Procedure];

    /// Name used as the first word of replay-script lines.
    pub fn manager_name(self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::Context => "context",
            Self::Variable => "variable",
            Self::Key => "key",
            Self::Procedure => "procedure",
        }
    }

    pub fn from_manager_name(name: &str) -> Option<Self> { Self::ALL.into_iter().find(|k| k.manager_name() == name) }

    /// Loader that registers parameters of this kind. Procedures are only
    /// ever created at runtime.
    pub fn loader_kind(self) -> Option<LoaderKind> {
        match self {
            Self::Environment => Some(LoaderKind::ENVIRONMENT),
            Self::Context => Some(LoaderKind::CONTEXT),
            Self::Variable => Some(LoaderKind::VARIABLE),
            Self::Key => Some(LoaderKind::KEY),
            Self::Procedure => None,
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.manager_name()) }
}

/// A checked value bound to its settings. Every mutation goes back through
/// the settings' checker and is refused while the value is read-only.
#[derive(Clone, Debug)]
pub struct Parameter {
    kind: ParameterKind,
    value: ParamValue,
    settings: Settings,
}

impl Parameter {
    pub fn new(kind: ParameterKind, raw: &[Value], mut settings: Settings) -> ShellResult<Self> {
        if kind == ParameterKind::Context {
            if !settings.is_list_checker() {
                let list = settings.checker().with_list(true);
                settings.replace_checker(list);
            }
            if settings.context().is_none() { settings.set_context(Some(ContextIndex::default())); }
        }
        let value = settings.checker().validate(raw)?;
        if kind == ParameterKind::Context && value.is_empty() {
            return Err(ShellError::invariant("a context value needs at least one item"));
        }
        let mut p = Self { kind, value, settings };
        p.clamp_context();
        Ok(p)
    }

    pub fn kind(&self) -> ParameterKind { self.kind }
    pub fn value(&self) -> &ParamValue { &self.value }
    pub fn settings(&self) -> &Settings { &self.settings }
    pub fn is_global(&self) -> bool { self.settings.is_global() }
    pub fn is_context(&self) -> bool { self.kind == ParameterKind::Context }

    pub fn set_value(&mut self, raw: &[Value]) -> ShellResult<()> {
        self.settings.guard_writable("set value")?;
        let value = self.settings.checker().validate(raw)?;
        if self.is_context() && value.is_empty() {
            return Err(ShellError::invariant("a context value needs at least one item"));
        }
        self.value = value;
        self.clamp_context();
        Ok(())
    }

    pub fn add_values(&mut self, raw: &[Value]) -> ShellResult<()> {
        self.settings.guard_writable("add values")?;
        let current = self.list_items("add values")?;
        let mut combined = current.to_vec();
        combined.extend_from_slice(raw);
        self.value = self.settings.checker().validate(&combined)?;
        Ok(())
    }

    /// Removes, for each given value taken back to front, its last
    /// occurrence. Removing a trailing run therefore restores the prefix.
    pub fn remove_values(&mut self, raw: &[Value]) -> ShellResult<()> {
        self.settings.guard_writable("remove values")?;
        let mut remaining = self.list_items("remove values")?.to_vec();
        let item = self.settings.checker().item_checker().clone();
        for (i, r) in raw.iter().enumerate().rev() {
            let v = item.check(std::slice::from_ref(r), Some(i))?;
            if let Some(pos) = remaining.iter().rposition(|x| *x == v) { remaining.remove(pos); }
        }
        if self.is_context() && remaining.is_empty() {
            return Err(ShellError::invariant("cannot remove every value of a context parameter"));
        }
        self.value = self.settings.checker().validate(&remaining)?;
        self.clamp_context();
        Ok(())
    }

    fn list_items(&self, what: &str) -> ShellResult<&[Value]> {
        self.value.as_list().ok_or_else(|| ShellError::invalid(format!("cannot {what}: value is not a list")))
    }

    /// Swap the item checker, keeping list status. The current value must
    /// still validate.
    pub fn set_checker(&mut self, item: Arc<dyn ValueChecker>) -> ShellResult<()> {
        let mut settings = self.settings.clone();
        settings.set_checker(item)?;
        let value = settings.checker().validate(self.value.items())?;
        self.settings = settings;
        self.value = value;
        self.clamp_context();
        Ok(())
    }

    pub fn set_list_checker(&mut self, list: bool) -> ShellResult<()> {
        let mut settings = self.settings.clone();
        settings.set_list_checker(list)?;
        let value = settings.checker().validate(self.value.items())?;
        self.settings = settings;
        self.value = value;
        Ok(())
    }

    pub fn enable_global(&mut self) {
        if !self.is_global() { self.settings = self.settings.to_global(); }
        self.clamp_context();
    }

    pub fn enable_local(&mut self) {
        if self.is_global() { self.settings = self.settings.to_local(); }
        self.clamp_context();
    }

    pub fn index(&self) -> Option<usize> { self.settings.context().map(|c| c.index) }
    pub fn default_index(&self) -> Option<usize> { self.settings.context().map(|c| c.default_index) }

    /// The item a context parameter currently points at.
    pub fn selected(&self) -> Option<&Value> { self.index().and_then(|i| self.value.items().get(i)) }

    pub fn set_index(&mut self, index: usize) -> ShellResult<()> {
        self.settings.guard_writable("set index")?;
        let len = self.value.len();
        let ctx = self.context_mut("set index")?;
        if index >= len { return Err(ShellError::invalid(format!("index {index} out of range 0..{len}"))); }
        ctx.index = index;
        Ok(())
    }

    pub fn set_default_index(&mut self, index: usize) -> ShellResult<()> {
        self.settings.guard_writable("set default index")?;
        let len = self.value.len();
        let ctx = self.context_mut("set default index")?;
        if index >= len { return Err(ShellError::invalid(format!("default index {index} out of range 0..{len}"))); }
        ctx.default_index = index;
        Ok(())
    }

    pub fn reset_index(&mut self) -> ShellResult<()> {
        self.settings.guard_writable("reset index")?;
        let ctx = self.context_mut("reset index")?;
        ctx.index = ctx.default_index;
        Ok(())
    }

    fn context_mut(&mut self, what: &str) -> ShellResult<&mut ContextIndex> {
        let kind = self.kind;
        self.settings.context_mut().ok_or_else(|| ShellError::invalid(format!("cannot {what} on a {kind} parameter")))
    }

    fn clamp_context(&mut self) {
        let len = self.value.len();
        if let Some(ctx) = self.settings.context_mut() {
            if ctx.index >= len { ctx.index = 0; }
            if ctx.default_index >= len { ctx.default_index = 0; }
        }
    }

    pub fn property(&self, p: Property) -> Option<Value> { self.settings.property(p) }

    pub fn set_property(&mut self, p: Property, raw: &Value) -> ShellResult<()> {
        match p {
            Property::ReadOnly => { let b = parse_bool(raw)?; self.settings.set_read_only(b); Ok(()) }
            Property::Removable => self.settings.set_removable(parse_bool(raw)?),
            Property::Transient => self.settings.set_transient(parse_bool(raw)?),
            Property::DefaultIndex => self.set_default_index(parse_index(raw)?),
            Property::Index => self.set_index(parse_index(raw)?),
        }
    }

    /// Properties whose value differs from the type default, `readOnly` last.
    pub fn non_default_properties(&self) -> Vec<(Property, Value)> {
        self.settings.property_names().into_iter().filter_map(|p| {
            let current = self.settings.property(p)?;
            (Some(&current) != self.settings.property_default(p).as_ref()).then_some((p, current))
        }).collect()
    }
}

fn parse_bool(raw: &Value) -> ShellResult<bool> {
    BooleanChecker::new().check(std::slice::from_ref(raw), None).map(|v| v.as_bool().unwrap_or(false))
}

fn parse_index(raw: &Value) -> ShellResult<usize> {
    let c = IntegerChecker::with_range(Some(0), None)?;
    let i = c.check(std::slice::from_ref(raw), None)?.as_int().unwrap_or(0);
    usize::try_from(i).map_err(|_| ShellError::invalid(format!("{i} is not a valid index")))
}
