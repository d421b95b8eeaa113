// addon-shell/src/loader/mod.rs

//! Loaders turn an addon's registrations into effects on the host container
//! and back. Each loader is a stateless object keyed by [`LoaderKind`]; the
//! per-addon state lives in the [`LoaderProfile`] it is handed.

use serde::{Deserialize, Serialize};
use std::{borrow::Cow, collections::BTreeMap, fmt, sync::Arc};

use crate::{
    container::Container,
    error::{FailureContext, Phase, ShellResult},
    parameter::ParameterKind,
    profile::{LoaderProfile, Mailbox, DEFAULT_PRIORITY},
};

pub mod command;
pub mod dependency;
pub mod file;
pub mod internal;
pub mod parameter;
pub mod root;

pub use command::CommandLoader;
pub use dependency::DependencyLoader;
pub use file::FileLoader;
pub use internal::InternalLoader;
pub use parameter::ParameterLoader;
pub use root::RootLoader;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoaderKind(Cow<'static, str>);

impl LoaderKind {
    pub const DEPENDENCY: Self = Self(Cow::Borrowed("dependency"));
    pub const ENVIRONMENT: Self = Self(Cow::Borrowed("environment"));
    pub const CONTEXT: Self = Self(Cow::Borrowed("context"));
    pub const VARIABLE: Self = Self(Cow::Borrowed("variable"));
    pub const KEY: Self = Self(Cow::Borrowed("key"));
    pub const COMMAND: Self = Self(Cow::Borrowed("command"));
    pub const FILE: Self = Self(Cow::Borrowed("file"));

    /// Kind for a loader supplied by the host or an addon.
    pub fn custom(name: impl Into<String>) -> Self { Self(Cow::Owned(name.into())) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// `(load, unload)` priorities a fresh binding of `kind` starts with.
/// Dependencies are checked before anything else is touched; the replay file
/// is assembled after every parameter loader has posted its fragment.
pub fn default_priorities(kind: &LoaderKind) -> (f64, f64) {
    if *kind == LoaderKind::DEPENDENCY {
        (0.0, DEFAULT_PRIORITY)
    } else if *kind == LoaderKind::FILE {
        (DEFAULT_PRIORITY, 1000.0)
    } else {
        (DEFAULT_PRIORITY, DEFAULT_PRIORITY)
    }
}

/// What a loader sees of the root profile it runs under.
pub struct LoaderContext<'a> {
    pub addon: &'a str,
    pub profile_name: &'a str,
    pub kind: &'a LoaderKind,
    pub profile: &'a mut LoaderProfile,
    pub mailbox: &'a mut Mailbox,
}

impl LoaderContext<'_> {
    pub fn failure_context(&self) -> FailureContext {
        FailureContext::new(self.addon, self.profile_name, Some(self.kind.clone()))
    }
}

pub trait Loader: Send + Sync {
    fn kind(&self) -> LoaderKind;
    fn load(&self, ctx: &mut LoaderContext<'_>, container: Option<&mut Container>) -> ShellResult<()>;
    fn unload(&self, ctx: &mut LoaderContext<'_>, container: Option<&mut Container>) -> ShellResult<()>;

    fn run(&self, phase: Phase, ctx: &mut LoaderContext<'_>, container: Option<&mut Container>) -> ShellResult<()> {
        match phase {
            Phase::Load => self.load(ctx, container),
            Phase::Unload => self.unload(ctx, container),
        }
    }
}

/// Loader implementations available to the host, by kind.
#[derive(Clone)]
pub struct LoaderSet {
    loaders: BTreeMap<LoaderKind, Arc<dyn Loader>>,
}

impl Default for LoaderSet {
    fn default() -> Self { Self::builtin() }
}

impl LoaderSet {
    pub fn empty() -> Self { Self { loaders: BTreeMap::new() } }

    pub fn builtin() -> Self {
        let mut s = Self::empty();
        s.register(Arc::new(DependencyLoader));
        s.register(Arc::new(CommandLoader));
        s.register(Arc::new(FileLoader));
        for kind in ParameterKind::ALL {
            if kind.loader_kind().is_some() { s.register(Arc::new(ParameterLoader::new(kind))); }
        }
        s
    }

    /// Later registrations replace earlier ones of the same kind.
    pub fn register(&mut self, loader: Arc<dyn Loader>) -> Option<Arc<dyn Loader>> {
        self.loaders.insert(loader.kind(), loader)
    }

    pub fn get(&self, kind: &LoaderKind) -> Option<Arc<dyn Loader>> { self.loaders.get(kind).cloned() }
    pub fn kinds(&self) -> impl Iterator<Item = &LoaderKind> { self.loaders.keys() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_set_covers_parameter_kinds() {
        let set = LoaderSet::builtin();
        for kind in [LoaderKind::DEPENDENCY, LoaderKind::ENVIRONMENT, LoaderKind::CONTEXT, LoaderKind::VARIABLE, LoaderKind::KEY, LoaderKind::COMMAND, LoaderKind::FILE] {
            assert!(set.get(&kind).is_some(), "missing {kind}");
        }
        assert_eq!(set.kinds().count(), 7);
    }

    #[test]
    fn test_default_priorities() {
        assert_eq!(default_priorities(&LoaderKind::DEPENDENCY), (0.0, DEFAULT_PRIORITY));
        assert_eq!(default_priorities(&LoaderKind::FILE).1, 1000.0);
        assert_eq!(default_priorities(&LoaderKind::custom("audit")), (DEFAULT_PRIORITY, DEFAULT_PRIORITY));
    }

    #[test]
    fn test_custom_kind_equals_by_name() {
        assert_eq!(LoaderKind::custom("command"), LoaderKind::COMMAND);
        assert_eq!(LoaderKind::custom("audit").to_string(), "audit");
    }
}
