// addon-shell/src/settings.rs

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock,
    },
};

use crate::{
    checker::{ArgChecker, ValueChecker},
    error::{ShellError, ShellResult},
    value::Value,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind { Local, Global }

impl ScopeKind {
    /// Local values live in one execution context and are not persisted by
    /// default; global ones are.
    pub fn default_transient(self) -> bool { matches!(self, Self::Local) }
}

/// Selected position over a context parameter's list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextIndex {
    pub index: usize,
    pub default_index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Property { ReadOnly, Removable, Transient, DefaultIndex, Index }

impl Property {
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadOnly => "readOnly",
            Self::Removable => "removable",
            Self::Transient => "transient",
            Self::DefaultIndex => "defaultIndex",
            Self::Index => "index",
        }
    }

    pub fn parse(name: &str) -> ShellResult<Self> {
        match name {
            "readOnly" => Ok(Self::ReadOnly),
            "removable" => Ok(Self::Removable),
            "transient" => Ok(Self::Transient),
            "defaultIndex" => Ok(Self::DefaultIndex),
            "index" => Ok(Self::Index),
            other => Err(ShellError::invalid(format!("unknown property '{other}'"))),
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct ParamLock {
    id: u64,
    mutex: Mutex<()>,
}

#[derive(Debug)]
pub struct Settings {
    scope: ScopeKind,
    read_only: bool,
    removable: bool,
    transient: bool,
    checker: ArgChecker,
    context: Option<ContextIndex>,
    lock: OnceLock<ParamLock>,
}

impl Clone for Settings {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope,
            read_only: self.read_only,
            removable: self.removable,
            transient: self.transient,
            checker: self.checker.clone(),
            context: self.context,
            lock: OnceLock::new(),
        }
    }
}

impl Settings {
    pub fn new(scope: ScopeKind, checker: ArgChecker) -> Self {
        Self {
            scope,
            read_only: false,
            removable: true,
            transient: scope.default_transient(),
            checker,
            context: None,
            lock: OnceLock::new(),
        }
    }

    pub fn global(checker: ArgChecker) -> Self { Self::new(ScopeKind::Global, checker) }
    pub fn local(checker: ArgChecker) -> Self { Self::new(ScopeKind::Local, checker) }

    pub fn read_only(mut self, v: bool) -> Self { self.read_only = v; self }
    pub fn removable(mut self, v: bool) -> Self { self.removable = v; self }
    pub fn transient(mut self, v: bool) -> Self { self.transient = v; self }

    pub fn scope(&self) -> ScopeKind { self.scope }
    pub fn is_global(&self) -> bool { self.scope == ScopeKind::Global }
    pub fn is_read_only(&self) -> bool { self.read_only }
    pub fn is_removable(&self) -> bool { self.removable }
    pub fn is_transient(&self) -> bool { self.transient }
    pub fn checker(&self) -> &ArgChecker { &self.checker }
    pub fn is_list_checker(&self) -> bool { self.checker.is_list() }
    pub fn context(&self) -> Option<ContextIndex> { self.context }

    pub(crate) fn context_mut(&mut self) -> Option<&mut ContextIndex> { self.context.as_mut() }
    pub(crate) fn set_context(&mut self, ctx: Option<ContextIndex>) { self.context = ctx; }

    pub(crate) fn guard_writable(&self, what: &str) -> ShellResult<()> {
        if self.read_only { Err(ShellError::invariant(format!("cannot {what}: value is read-only"))) } else { Ok(()) }
    }

    /// Always allowed, this is how a read-only value gets unlocked.
    pub fn set_read_only(&mut self, v: bool) { self.read_only = v; }

    pub fn set_removable(&mut self, v: bool) -> ShellResult<()> {
        self.guard_writable("change removable")?;
        self.removable = v;
        Ok(())
    }

    pub fn set_transient(&mut self, v: bool) -> ShellResult<()> {
        self.guard_writable("change transient")?;
        self.transient = v;
        Ok(())
    }

    /// Replace the item checker; list wrapping and bounds are kept.
    pub fn set_checker(&mut self, item: Arc<dyn ValueChecker>) -> ShellResult<()> {
        self.guard_writable("change checker")?;
        self.checker = self.checker.with_item_checker(item)?;
        Ok(())
    }

    pub(crate) fn replace_checker(&mut self, checker: ArgChecker) { self.checker = checker; }

    pub fn set_list_checker(&mut self, list: bool) -> ShellResult<()> {
        self.guard_writable("change list mode")?;
        if !list && self.context.is_some() {
            return Err(ShellError::invariant("a context value is always a list"));
        }
        self.checker = self.checker.with_list(list);
        Ok(())
    }

    fn convert(&self, scope: ScopeKind) -> Self {
        Self {
            scope,
            read_only: self.read_only,
            removable: self.removable,
            transient: scope.default_transient(),
            checker: self.checker.clone(),
            context: self.context,
            lock: OnceLock::new(),
        }
    }

    pub fn to_global(&self) -> Self { self.convert(ScopeKind::Global) }
    pub fn to_local(&self) -> Self { self.convert(ScopeKind::Local) }

    /// Lock id, assigned on first use. Local settings have no lock.
    pub fn lock_id(&self) -> Option<u64> { self.param_lock().map(|l| l.id) }

    pub fn lock(&self) -> Option<MutexGuard<'_, ()>> { self.param_lock().map(|l| l.mutex.lock()) }

    fn param_lock(&self) -> Option<&ParamLock> {
        if !self.is_global() { return None; }
        Some(self.lock.get_or_init(|| ParamLock { id: NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed), mutex: Mutex::new(()) }))
    }

    pub fn property(&self, p: Property) -> Option<Value> {
        match p {
            Property::ReadOnly => Some(Value::Bool(self.read_only)),
            Property::Removable => Some(Value::Bool(self.removable)),
            Property::Transient => Some(Value::Bool(self.transient)),
            Property::DefaultIndex => self.context.map(|c| Value::Int(c.default_index as i64)),
            Property::Index => self.context.map(|c| Value::Int(c.index as i64)),
        }
    }

    pub fn property_default(&self, p: Property) -> Option<Value> {
        match p {
            Property::ReadOnly => Some(Value::Bool(false)),
            Property::Removable => Some(Value::Bool(true)),
            Property::Transient => Some(Value::Bool(self.scope.default_transient())),
            Property::DefaultIndex | Property::Index => self.context.map(|_| Value::Int(0)),
        }
    }

    /// Properties this settings object carries, in replay order with
    /// `readOnly` last.
    pub fn property_names(&self) -> Vec<Property> {
        let mut out = vec![Property::Removable, Property::Transient];
        if self.context.is_some() { out.extend([Property::DefaultIndex, Property::Index]); }
        out.push(Property::ReadOnly);
        out
    }
}

/// Lock several global settings in ascending lock-id order so two callers
/// locking the same set never deadlock. Local settings are skipped.
pub fn lock_ordered<'a>(settings: impl IntoIterator<Item = &'a Settings>) -> Vec<MutexGuard<'a, ()>> {
    let mut locks: Vec<&ParamLock> = settings.into_iter().filter_map(|s| s.param_lock()).collect();
    locks.sort_by_key(|l| l.id);
    locks.dedup_by_key(|l| l.id);
    locks.into_iter().map(|l| l.mutex.lock()).collect()
}
