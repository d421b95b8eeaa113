// addon-shell/src/manager.rs

//! Named parameter storage for one [`ParameterKind`], split into a local and a
//! global scope. Global entries may be owned ("frozen") by an addon.

use parking_lot::MutexGuard;
use std::collections::BTreeMap;
use tracing::debug;

use crate::{
    error::{ShellError, ShellResult},
    parameter::{Parameter, ParameterKind},
    settings::lock_ordered,
    value::Value,
};

#[derive(Clone, Debug)]
pub struct GlobalEntry {
    pub parameter: Parameter,
    /// Addon that registered the value, if any.
    pub origin: Option<String>,
    /// Frozen entries can only be removed through their origin's unload.
    pub frozen: bool,
}

#[derive(Clone, Debug)]
pub struct ParameterManager {
    kind: ParameterKind,
    global: BTreeMap<String, GlobalEntry>,
    local: BTreeMap<String, Parameter>,
}

pub fn validate_name(name: &str) -> ShellResult<()> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == '"') {
        return Err(ShellError::invalid(format!("invalid parameter name '{name}'")));
    }
    Ok(())
}

impl ParameterManager {
    pub fn new(kind: ParameterKind) -> Self { Self { kind, global: BTreeMap::new(), local: BTreeMap::new() } }

    pub fn kind(&self) -> ParameterKind { self.kind }
    pub fn name(&self) -> &'static str { self.kind.manager_name() }

    fn check_kind(&self, p: &Parameter) -> ShellResult<()> {
        if p.kind() != self.kind {
            return Err(ShellError::invalid(format!("{} manager cannot hold a {} parameter", self.kind, p.kind())));
        }
        Ok(())
    }

    /// Add a new value in the scope its settings declare.
    pub fn create(&mut self, name: &str, parameter: Parameter) -> ShellResult<()> {
        validate_name(name)?;
        self.check_kind(&parameter)?;
        if parameter.is_global() {
            if self.global.contains_key(name) {
                return Err(ShellError::invalid(format!("{} '{name}' already exists in global scope", self.kind)));
            }
            self.global.insert(name.to_string(), GlobalEntry { parameter, origin: None, frozen: false });
        } else {
            if self.local.contains_key(name) {
                return Err(ShellError::invalid(format!("{} '{name}' already exists in local scope", self.kind)));
            }
            self.local.insert(name.to_string(), parameter);
        }
        Ok(())
    }

    /// Insert a global value on behalf of an addon and freeze it. A value
    /// already owned by the same addon is replaced.
    pub fn insert_owned(&mut self, name: &str, mut parameter: Parameter, origin: &str) -> ShellResult<()> {
        validate_name(name)?;
        self.check_kind(&parameter)?;
        if let Some(e) = self.global.get(name) {
            if e.origin.as_deref() != Some(origin) {
                let owner = e.origin.as_deref().unwrap_or("the user");
                return Err(ShellError::invalid(format!("{} '{name}' is already set by {owner}", self.kind)));
            }
        }
        parameter.enable_global();
        debug!(manager = self.name(), name, origin, "frozen global value");
        self.global.insert(name.to_string(), GlobalEntry { parameter, origin: Some(origin.to_string()), frozen: true });
        Ok(())
    }

    fn lookup_order(start_with_local: bool, explore_other_scope: bool) -> &'static [bool] {
        match (start_with_local, explore_other_scope) {
            (true, true) => &[true, false],
            (true, false) => &[true],
            (false, true) => &[false, true],
            (false, false) => &[false],
        }
    }

    pub fn get(&self, name: &str, start_with_local: bool, explore_other_scope: bool) -> Option<&Parameter> {
        Self::lookup_order(start_with_local, explore_other_scope).iter().find_map(|local| {
            if *local { self.local.get(name) } else { self.global.get(name).map(|e| &e.parameter) }
        })
    }

    pub fn get_mut(&mut self, name: &str, start_with_local: bool, explore_other_scope: bool) -> Option<&mut Parameter> {
        let local = Self::lookup_order(start_with_local, explore_other_scope).iter()
            .find(|local| if **local { self.local.contains_key(name) } else { self.global.contains_key(name) })?;
        if *local { self.local.get_mut(name) } else { self.global.get_mut(name).map(|e| &mut e.parameter) }
    }

    fn require_mut(&mut self, name: &str, start_with_local: bool, explore_other_scope: bool) -> ShellResult<&mut Parameter> {
        let kind = self.kind;
        self.get_mut(name, start_with_local, explore_other_scope)
            .ok_or_else(|| ShellError::invalid(format!("unknown {kind} '{name}'")))
    }

    pub fn has(&self, name: &str, start_with_local: bool, explore_other_scope: bool) -> bool {
        self.get(name, start_with_local, explore_other_scope).is_some()
    }

    pub fn global_entry(&self, name: &str) -> Option<&GlobalEntry> { self.global.get(name) }
    pub fn owner(&self, name: &str) -> Option<&str> { self.global.get(name).and_then(|e| e.origin.as_deref()) }

    pub fn global_names(&self) -> impl Iterator<Item = &str> { self.global.keys().map(String::as_str) }
    pub fn local_names(&self) -> impl Iterator<Item = &str> { self.local.keys().map(String::as_str) }

    pub fn set_values(&mut self, name: &str, raw: &[Value], start_with_local: bool, explore_other_scope: bool) -> ShellResult<()> {
        self.require_mut(name, start_with_local, explore_other_scope)?.set_value(raw)
    }

    pub fn add_values(&mut self, name: &str, raw: &[Value], start_with_local: bool, explore_other_scope: bool) -> ShellResult<()> {
        self.require_mut(name, start_with_local, explore_other_scope)?.add_values(raw)
    }

    pub fn remove_values(&mut self, name: &str, raw: &[Value], start_with_local: bool, explore_other_scope: bool) -> ShellResult<()> {
        self.require_mut(name, start_with_local, explore_other_scope)?.remove_values(raw)
    }

    pub fn set_property(&mut self, name: &str, property: crate::settings::Property, raw: &Value, start_with_local: bool, explore_other_scope: bool) -> ShellResult<()> {
        self.require_mut(name, start_with_local, explore_other_scope)?.set_property(property, raw)
    }

    /// User-facing removal. Frozen and non-removable values are refused.
    pub fn unset(&mut self, name: &str, start_with_local: bool, explore_other_scope: bool) -> ShellResult<Parameter> {
        let local = Self::lookup_order(start_with_local, explore_other_scope).iter().copied()
            .find(|local| if *local { self.local.contains_key(name) } else { self.global.contains_key(name) })
            .ok_or_else(|| ShellError::invalid(format!("unknown {} '{name}'", self.kind)))?;
        if local {
            let p = &self.local[name];
            if !p.settings().is_removable() { return Err(ShellError::invariant(format!("{} '{name}' is not removable", self.kind))); }
            return self.local.remove(name).ok_or_else(|| ShellError::invalid(format!("unknown {} '{name}'", self.kind)));
        }
        let e = &self.global[name];
        if e.frozen {
            let owner = e.origin.as_deref().unwrap_or("an addon");
            return Err(ShellError::invariant(format!("{} '{name}' is owned by {owner}, unload it instead", self.kind)));
        }
        if !e.parameter.settings().is_removable() {
            return Err(ShellError::invariant(format!("{} '{name}' is not removable", self.kind)));
        }
        self.global.remove(name).map(|e| e.parameter).ok_or_else(|| ShellError::invalid(format!("unknown {} '{name}'", self.kind)))
    }

    /// Owner-side removal: unfreezes and removes a global value regardless
    /// of its removable flag.
    pub fn unset_owned(&mut self, name: &str, origin: &str) -> ShellResult<Parameter> {
        let Some(e) = self.global.get(name) else {
            return Err(ShellError::invalid(format!("unknown {} '{name}'", self.kind)));
        };
        if e.origin.as_deref() != Some(origin) {
            let owner = e.origin.as_deref().unwrap_or("the user");
            return Err(ShellError::invariant(format!("{} '{name}' belongs to {owner}, not {origin}", self.kind)));
        }
        debug!(manager = self.name(), name, origin, "unfrozen global value");
        self.global.remove(name).map(|e| e.parameter).ok_or_else(|| ShellError::invalid(format!("unknown {} '{name}'", self.kind)))
    }

    /// Release ownership but keep the value in place.
    pub fn unfreeze(&mut self, name: &str, origin: &str) -> ShellResult<()> {
        match self.global.get_mut(name) {
            Some(e) if e.origin.as_deref() == Some(origin) => { e.frozen = false; e.origin = None; Ok(()) }
            Some(_) => Err(ShellError::invariant(format!("{} '{name}' is not owned by {origin}", self.kind))),
            None => Err(ShellError::invalid(format!("unknown {} '{name}'", self.kind))),
        }
    }

    /// Lock the named global values in lock-id order.
    pub fn lock_globals(&self, names: &[&str]) -> ShellResult<Vec<MutexGuard<'_, ()>>> {
        let mut settings = Vec::with_capacity(names.len());
        for n in names {
            let e = self.global.get(*n).ok_or_else(|| ShellError::invalid(format!("unknown {} '{n}'", self.kind)))?;
            settings.push(e.parameter.settings());
        }
        Ok(lock_ordered(settings))
    }
}
