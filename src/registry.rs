// addon-shell/src/registry.rs

//! Per-addon registration API and lifecycle entry points.
//!
//! An [`AddonRegistry`] owns the addon's root profiles. Registration calls
//! declare what a profile carries (commands, parameters, dependencies, a
//! replay file); `load` and `unload` hand the profile to the root loader.

use parking_lot::{Mutex, RwLock};
use std::{collections::BTreeMap, sync::Arc};

use crate::{
    commands::{validate_keys, Command},
    container::Container,
    error::{FailureContext, Phase, ShellError, ShellResult},
    loader::{default_priorities, LoaderKind, RootLoader},
    manager::validate_name,
    parameter::{Parameter, ParameterKind},
    profile::{CapturedFailure, CommandEntry, Dependency, LoaderProfile, LoaderResult, ProfileData, ProfileState, ProfileStatus, ResultKind, RootProfile},
    settings::Settings,
    value::Value,
};

pub struct AddonRegistry {
    name: String,
    default_profile: String,
    profiles: RwLock<BTreeMap<String, Arc<Mutex<RootProfile>>>>,
    last_used: Mutex<Option<String>>,
}

impl std::fmt::Debug for AddonRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddonRegistry")
            .field("name", &self.name)
            .field("profiles", &self.profile_names())
            .finish()
    }
}

impl AddonRegistry {
    pub fn new(name: &str, default_profile: &str) -> ShellResult<Self> {
        validate_name(name).map_err(|_| ShellError::registration(format!("invalid addon name '{name}'")))?;
        validate_name(default_profile).map_err(|_| ShellError::registration(format!("invalid profile name '{default_profile}'")))?;
        Ok(Self {
            name: name.to_string(),
            default_profile: default_profile.to_string(),
            profiles: RwLock::new(BTreeMap::new()),
            last_used: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn default_profile(&self) -> &str { &self.default_profile }
    pub fn last_used(&self) -> Option<String> { self.last_used.lock().clone() }
    pub fn profile_names(&self) -> Vec<String> { self.profiles.read().keys().cloned().collect() }
    pub fn profile(&self, name: &str) -> Option<Arc<Mutex<RootProfile>>> { self.profiles.read().get(name).cloned() }

    /// `profile` if given, else the last profile loaded, else the default.
    pub fn resolve_profile(&self, profile: Option<&str>) -> String {
        profile.map(str::to_string)
            .or_else(|| self.last_used())
            .unwrap_or_else(|| self.default_profile.clone())
    }

    /// The profile currently in a loaded state, if any.
    pub fn loaded_profile(&self) -> Option<String> {
        self.profiles.read().iter()
            .find(|(_, p)| p.lock().state().is_some_and(ProfileState::is_loaded))
            .map(|(n, _)| n.clone())
    }

    // ---- profiles ----

    pub fn create_profile(&self, name: &str) -> ShellResult<Arc<Mutex<RootProfile>>> {
        validate_name(name).map_err(|_| ShellError::registration(format!("invalid profile name '{name}'")))?;
        let mut profiles = self.profiles.write();
        if profiles.contains_key(name) {
            return Err(ShellError::registration(format!("profile {}/{name} already exists", self.name)));
        }
        let root = Arc::new(Mutex::new(RootProfile::new(&self.name, name)));
        profiles.insert(name.to_string(), root.clone());
        Ok(root)
    }

    pub fn bind_loader_to_profile(&self, kind: LoaderKind, data: ProfileData, profile: &str) -> ShellResult<()> {
        let root = self.profile(profile)
            .ok_or_else(|| ShellError::registration(format!("no profile {}/{profile}", self.name)))?;
        let mut root = root.lock();
        self.guard_idle(&root)?;
        let (load, unload) = default_priorities(&kind);
        let child = root.bind(kind, data)?;
        child.load_priority = load;
        child.unload_priority = unload;
        Ok(())
    }

    /// Find or create the root profile and its `kind` binding, then apply
    /// `update` to the loader profile. When `update` fails, a root profile
    /// or binding created by this call is removed again.
    pub fn get_or_create_profile<T>(
        &self,
        kind: LoaderKind,
        profile: Option<&str>,
        init: impl FnOnce() -> ProfileData,
        update: impl FnOnce(&mut LoaderProfile) -> ShellResult<T>,
    ) -> ShellResult<T> {
        let name = profile.unwrap_or(&self.default_profile).to_string();
        let (root, created) = match self.profile(&name) {
            Some(r) => (r, false),
            None => (self.create_profile(&name)?, true),
        };
        let result = {
            let mut guard = root.lock();
            let bound_now = guard.loader(&kind).is_none();
            let result = self.guard_idle(&guard).and_then(|()| {
                if bound_now {
                    let (load, unload) = default_priorities(&kind);
                    let child = guard.bind(kind.clone(), init())?;
                    child.load_priority = load;
                    child.unload_priority = unload;
                }
                match guard.loader_mut(&kind) {
                    Some(child) => update(child),
                    None => Err(ShellError::invariant(format!("loader {kind} vanished from {}/{name}", self.name))),
                }
            });
            if result.is_err() && bound_now { guard.unbind(&kind); }
            result
        };
        if result.is_err() && created { self.profiles.write().remove(&name); }
        result
    }

    fn guard_idle(&self, root: &RootProfile) -> ShellResult<()> {
        if root.is_idle() { return Ok(()); }
        let state = root.state().map(|s| s.to_string()).unwrap_or_default();
        Err(ShellError::registration(format!("profile {}/{} is {state}, registration is closed", self.name, root.name())))
    }

    // ---- registration ----

    pub fn register_command(&self, keys: &[&str], command: Arc<dyn Command>, profile: Option<&str>) -> ShellResult<()> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        validate_keys(&keys)?;
        self.get_or_create_profile(
            LoaderKind::COMMAND, profile,
            || ProfileData::Commands { declared: vec![], inserted: vec![] },
            |child| match &mut child.data {
                ProfileData::Commands { declared, .. } => {
                    if declared.iter().any(|e| e.keys == keys) {
                        return Err(ShellError::registration(format!("command '{}' declared twice", keys.join(" "))));
                    }
                    declared.push(CommandEntry { keys, command });
                    Ok(())
                }
                other => Err(mismatch(&LoaderKind::COMMAND, other)),
            },
        )
    }

    /// Declare an already-built parameter. It is always registered global.
    pub fn register_parameter(&self, kind: ParameterKind, name: &str, mut parameter: Parameter, profile: Option<&str>) -> ShellResult<()> {
        let loader = kind.loader_kind()
            .ok_or_else(|| ShellError::registration(format!("{kind} values cannot be registered by an addon")))?;
        validate_name(name).map_err(|e| ShellError::registration(e.to_string()))?;
        if parameter.kind() != kind {
            return Err(ShellError::registration(format!("{} parameter '{name}' registered as {kind}", parameter.kind())));
        }
        parameter.enable_global();
        self.get_or_create_profile(
            loader.clone(), profile,
            || ProfileData::Parameters { kind, declared: vec![], loaded: vec![] },
            |child| match &mut child.data {
                ProfileData::Parameters { declared, .. } => {
                    if declared.iter().any(|(n, _)| n == name) {
                        return Err(ShellError::registration(format!("{kind} '{name}' declared twice")));
                    }
                    declared.push((name.to_string(), parameter));
                    Ok(())
                }
                other => Err(mismatch(&loader, other)),
            },
        )
    }

    /// Build a parameter from raw values and declare it.
    pub fn create_values(&self, kind: ParameterKind, name: &str, raw: &[Value], settings: Settings, profile: Option<&str>) -> ShellResult<()> {
        let parameter = Parameter::new(kind, raw, settings)?;
        self.register_parameter(kind, name, parameter, profile)
    }

    pub fn add_dependency(&self, addon: &str, dependency_profile: Option<&str>, profile: Option<&str>) -> ShellResult<()> {
        if addon == self.name {
            return Err(ShellError::registration(format!("addon {addon} cannot depend on itself")));
        }
        validate_name(addon).map_err(|_| ShellError::registration(format!("invalid addon name '{addon}'")))?;
        let dep = Dependency { addon: addon.to_string(), profile: dependency_profile.map(str::to_string) };
        self.get_or_create_profile(
            LoaderKind::DEPENDENCY, profile,
            || ProfileData::Dependencies(vec![]),
            |child| match &mut child.data {
                ProfileData::Dependencies(deps) => {
                    if deps.contains(&dep) {
                        return Err(ShellError::registration(format!("dependency on {addon} declared twice")));
                    }
                    deps.push(dep);
                    Ok(())
                }
                other => Err(mismatch(&LoaderKind::DEPENDENCY, other)),
            },
        )
    }

    /// Write a replay script for `profile` on unload and read it on load.
    pub fn enable_replay_file(&self, profile: Option<&str>) -> ShellResult<()> {
        self.get_or_create_profile(LoaderKind::FILE, profile, || ProfileData::File { path: None }, |_| Ok(()))
    }

    /// Bind a host- or addon-supplied loader kind with no built-in data.
    pub fn bind_custom_loader(&self, kind: LoaderKind, profile: Option<&str>) -> ShellResult<()> {
        self.get_or_create_profile(kind, profile, ProfileData::default, |_| Ok(()))
    }

    pub fn set_load_priority(&self, kind: &LoaderKind, priority: f64, profile: Option<&str>) -> ShellResult<()> {
        self.with_bound(kind, profile, |child| child.load_priority = priority, priority)
    }

    pub fn set_unload_priority(&self, kind: &LoaderKind, priority: f64, profile: Option<&str>) -> ShellResult<()> {
        self.with_bound(kind, profile, |child| child.unload_priority = priority, priority)
    }

    fn with_bound(&self, kind: &LoaderKind, profile: Option<&str>, apply: impl FnOnce(&mut LoaderProfile), priority: f64) -> ShellResult<()> {
        if !priority.is_finite() {
            return Err(ShellError::registration(format!("priority {priority} is not a finite number")));
        }
        let name = profile.unwrap_or(&self.default_profile);
        let root = self.profile(name).ok_or_else(|| ShellError::registration(format!("no profile {}/{name}", self.name)))?;
        let mut root = root.lock();
        self.guard_idle(&root)?;
        let child = root.loader_mut(kind)
            .ok_or_else(|| ShellError::registration(format!("loader {kind} is not bound to {}/{name}", self.name)))?;
        apply(child);
        Ok(())
    }

    // ---- lifecycle ----

    pub fn load(&self, container: &mut Container, profile: Option<&str>) -> ShellResult<()> {
        let name = self.resolve_profile(profile);
        let root = self.require_profile(&name, Phase::Load)?;
        let siblings: Vec<_> = self.profiles.read().values().cloned().collect();
        let result = RootLoader::load(&root, &siblings, container);
        let entered = root.lock().state().is_some_and(ProfileState::is_loaded);
        if entered { *self.last_used.lock() = Some(name); }
        result
    }

    /// With no profile given, unloads whichever profile is loaded.
    pub fn unload(&self, container: &mut Container, profile: Option<&str>) -> ShellResult<()> {
        let name = profile.map(str::to_string)
            .or_else(|| self.loaded_profile())
            .unwrap_or_else(|| self.resolve_profile(None));
        let root = self.require_profile(&name, Phase::Unload)?;
        RootLoader::unload(&root, container)
    }

    fn require_profile(&self, name: &str, phase: Phase) -> ShellResult<Arc<Mutex<RootProfile>>> {
        self.profile(name).ok_or_else(|| ShellError::failure(
            phase,
            FailureContext::new(self.name.as_str(), name, None),
            format!("addon {} has no profile '{name}'", self.name),
        ))
    }

    // ---- queries ----

    pub fn state(&self, profile: &str) -> Option<ProfileState> { self.profile(profile).and_then(|p| p.lock().state()) }

    pub fn status(&self) -> Vec<ProfileStatus> {
        self.profiles.read().values().map(|p| p.lock().status()).collect()
    }

    pub fn last_failure(&self, profile: &str, kind: &LoaderKind) -> Option<CapturedFailure> {
        self.profile(profile).and_then(|p| p.lock().loader(kind).and_then(|c| c.last_failure.clone()))
    }

    pub fn result(&self, profile: &str, kind: ResultKind, loader: &LoaderKind) -> Option<LoaderResult> {
        self.profile(profile).and_then(|p| p.lock().mailbox().get(kind, loader).cloned())
    }

    /// Script assembled by the last unload of `profile`.
    pub fn replay_script(&self, profile: &str) -> Option<String> { self.text_result(profile, ResultKind::Script) }

    /// Script read from disk by the last load of `profile`.
    pub fn stored_script(&self, profile: &str) -> Option<String> { self.text_result(profile, ResultKind::Stored) }

    fn text_result(&self, profile: &str, kind: ResultKind) -> Option<String> {
        match self.result(profile, kind, &LoaderKind::FILE)? {
            LoaderResult::Text(t) => Some(t),
            LoaderResult::Fragment(_) => None,
        }
    }
}

fn mismatch(kind: &LoaderKind, data: &ProfileData) -> ShellError {
    ShellError::invariant(format!("loader {kind} is bound with unexpected data {data:?}"))
}
