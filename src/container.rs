// addon-shell/src/container.rs

//! The host side: parameter managers, the command trie, loader
//! implementations and the installed addons.

use std::{collections::BTreeMap, sync::Arc};
use tracing::info;

use crate::{
    checker::CheckerRegistry,
    commands::{self, CommandTable, CommandTrie},
    config::HostConfig,
    error::{ShellError, ShellResult},
    loader::LoaderSet,
    manager::ParameterManager,
    parameter::ParameterKind,
    profile::{ProfileState, ProfileStatus},
    registry::AddonRegistry,
};

pub struct Container {
    config: HostConfig,
    checkers: CheckerRegistry,
    loaders: LoaderSet,
    managers: [ParameterManager; 5],
    commands: Box<dyn CommandTrie>,
    addons: BTreeMap<String, Arc<AddonRegistry>>,
}

impl Default for Container {
    fn default() -> Self { Self::new(HostConfig::default()) }
}

impl Container {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            checkers: CheckerRegistry::new(),
            loaders: LoaderSet::builtin(),
            managers: ParameterKind::ALL.map(ParameterManager::new),
            commands: Box::new(CommandTable::new()),
            addons: BTreeMap::new(),
        }
    }

    pub fn with_commands(mut self, trie: Box<dyn CommandTrie>) -> Self { self.commands = trie; self }

    pub fn config(&self) -> &HostConfig { &self.config }
    pub fn set_config(&mut self, config: HostConfig) { self.config = config; }
    pub fn checkers(&self) -> &CheckerRegistry { &self.checkers }
    pub fn loaders(&self) -> &LoaderSet { &self.loaders }
    pub fn loaders_mut(&mut self) -> &mut LoaderSet { &mut self.loaders }
    pub fn commands(&self) -> &dyn CommandTrie { self.commands.as_ref() }
    pub fn commands_mut(&mut self) -> &mut dyn CommandTrie { self.commands.as_mut() }

    pub fn manager(&self, kind: ParameterKind) -> &ParameterManager { &self.managers[kind as usize] }
    pub fn manager_mut(&mut self, kind: ParameterKind) -> &mut ParameterManager { &mut self.managers[kind as usize] }

    /// Create an addon, let `register` declare its profiles, and install it.
    /// Nothing is installed when `register` fails.
    pub fn install_addon<F>(&mut self, name: &str, register: F) -> ShellResult<Arc<AddonRegistry>>
    where
        F: FnOnce(&AddonRegistry) -> ShellResult<()>,
    {
        let registry = AddonRegistry::new(name, self.config.addons.default_profile())?;
        register(&registry)?;
        let registry = Arc::new(registry);
        self.register_addon(registry.clone())?;
        Ok(registry)
    }

    pub fn register_addon(&mut self, registry: Arc<AddonRegistry>) -> ShellResult<()> {
        if self.addons.contains_key(registry.name()) {
            return Err(ShellError::registration(format!("addon {} is already installed", registry.name())));
        }
        info!(addon = registry.name(), "addon installed");
        self.addons.insert(registry.name().to_string(), registry);
        Ok(())
    }

    pub fn addon(&self, name: &str) -> Option<Arc<AddonRegistry>> { self.addons.get(name).cloned() }
    pub fn addon_names(&self) -> impl Iterator<Item = &str> { self.addons.keys().map(String::as_str) }

    fn require_addon(&self, name: &str) -> ShellResult<Arc<AddonRegistry>> {
        self.addon(name).ok_or_else(|| ShellError::invalid(format!("unknown addon '{name}'")))
    }

    pub fn load_addon(&mut self, name: &str, profile: Option<&str>) -> ShellResult<()> {
        let registry = self.require_addon(name)?;
        registry.load(self, profile)
    }

    pub fn unload_addon(&mut self, name: &str, profile: Option<&str>) -> ShellResult<()> {
        let registry = self.require_addon(name)?;
        registry.unload(self, profile)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.addon(name).is_some_and(|r| r.loaded_profile().is_some())
    }

    /// Unload every loaded profile in reverse name order. Failures are
    /// collected and the pass continues.
    pub fn unload_all(&mut self) -> ShellResult<()> {
        let mut errors = vec![];
        let registries: Vec<Arc<AddonRegistry>> = self.addons.values().rev().cloned().collect();
        for registry in registries {
            let Some(profile) = registry.loaded_profile() else { continue };
            if let Err(e) = registry.unload(self, Some(&profile)) { errors.push(e); }
        }
        ShellError::collect(errors)
    }

    pub fn status(&self) -> Vec<ProfileStatus> {
        self.addons.values().flat_map(|r| r.status()).collect()
    }

    pub fn state(&self, addon: &str, profile: &str) -> Option<ProfileState> {
        self.addon(addon).and_then(|r| r.state(profile))
    }

    pub fn dispatch(&self, line: &str) -> anyhow::Result<String> { commands::dispatch(self.commands(), line) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_manager() {
        let c = Container::default();
        for kind in ParameterKind::ALL { assert_eq!(c.manager(kind).kind(), kind); }
    }

    #[test]
    fn test_failed_install_leaves_nothing_behind() {
        let mut c = Container::default();
        let err = c.install_addon("net", |_| Err(ShellError::registration("boom"))).unwrap_err();
        assert!(matches!(err, ShellError::Registration(_)));
        assert!(c.addon("net").is_none());
        c.install_addon("net", |_| Ok(())).unwrap();
        assert!(c.install_addon("net", |_| Ok(())).is_err());
    }

    #[test]
    fn test_unknown_addon_is_invalid() {
        let mut c = Container::default();
        assert!(matches!(c.load_addon("nope", None).unwrap_err(), ShellError::InvalidArgument(_)));
    }
}
