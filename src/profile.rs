// addon-shell/src/profile.rs

//! Root profiles (one per addon and configuration name) own the lifecycle
//! state machine, the loader profiles bound to them and the result mailbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::PathBuf,
    sync::Arc,
};

use crate::{
    commands::Command,
    error::{Phase, ShellError, ShellResult},
    loader::LoaderKind,
    parameter::{Parameter, ParameterKind},
    script::ScriptFragment,
};

pub const DEFAULT_PRIORITY: f64 = 100.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileState {
    #[serde(rename = "LOADING")] Loading,
    #[serde(rename = "LOADED")] Loaded,
    #[serde(rename = "LOADED_E")] LoadedE,
    #[serde(rename = "UNLOADING")] Unloading,
    #[serde(rename = "UNLOADED")] Unloaded,
    #[serde(rename = "UNLOADED_E")] UnloadedE,
}

impl ProfileState {
    pub fn is_loaded(self) -> bool { matches!(self, Self::Loaded | Self::LoadedE) }
    pub fn is_unloaded(self) -> bool { matches!(self, Self::Unloaded | Self::UnloadedE) }
    pub fn is_error(self) -> bool { matches!(self, Self::LoadedE | Self::UnloadedE) }

    /// The transition table. `None` stands for a profile that never loaded.
    pub fn can_follow(from: Option<Self>, to: Self) -> bool {
        use ProfileState::*;
        match from {
            None => to == Loading,
            Some(Loading) => matches!(to, Loaded | LoadedE),
            Some(Loaded | LoadedE) => to == Unloading,
            Some(Unloading) => matches!(to, Unloaded | UnloadedE),
            Some(Unloaded | UnloadedE) => to == Loading,
        }
    }
}

impl fmt::Display for ProfileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Loading => "LOADING",
            Self::Loaded => "LOADED",
            Self::LoadedE => "LOADED_E",
            Self::Unloading => "UNLOADING",
            Self::Unloaded => "UNLOADED",
            Self::UnloadedE => "UNLOADED_E",
        })
    }
}

/// A failure recorded on the loader profile that produced it.
#[derive(Clone, Debug)]
pub struct CapturedFailure {
    pub error: ShellError,
    pub phase: Phase,
    pub at: DateTime<Utc>,
    pub backtrace: String,
}

#[derive(Clone)]
pub struct CommandEntry {
    pub keys: Vec<String>,
    pub command: Arc<dyn Command>,
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEntry").field("keys", &self.keys).field("command", &self.command.name()).finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub addon: String,
    pub profile: Option<String>,
}

/// Loader-specific registrations and teardown bookkeeping.
#[derive(Clone, Debug, Default)]
pub enum ProfileData {
    #[default]
    Empty,
    Dependencies(Vec<Dependency>),
    Parameters {
        kind: ParameterKind,
        declared: Vec<(String, Parameter)>,
        loaded: Vec<String>,
    },
    Commands {
        declared: Vec<CommandEntry>,
        inserted: Vec<Vec<String>>,
    },
    File {
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Debug)]
pub struct LoaderProfile {
    pub load_priority: f64,
    pub unload_priority: f64,
    pub last_failure: Option<CapturedFailure>,
    pub data: ProfileData,
    addon: String,
    root: String,
    seq: u64,
}

impl LoaderProfile {
    pub(crate) fn new(addon: &str, root: &str, seq: u64, data: ProfileData) -> Self {
        Self {
            load_priority: DEFAULT_PRIORITY,
            unload_priority: DEFAULT_PRIORITY,
            last_failure: None,
            data,
            addon: addon.to_string(),
            root: root.to_string(),
            seq,
        }
    }

    pub fn addon(&self) -> &str { &self.addon }
    pub fn root_name(&self) -> &str { &self.root }
    pub fn sequence(&self) -> u64 { self.seq }

    pub fn priority(&self, phase: Phase) -> f64 {
        match phase { Phase::Load => self.load_priority, Phase::Unload => self.unload_priority }
    }

    pub(crate) fn record_failure(&mut self, phase: Phase, error: ShellError) {
        self.last_failure = Some(CapturedFailure {
            error,
            phase,
            at: Utc::now(),
            backtrace: std::backtrace::Backtrace::capture().to_string(),
        });
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// A replay-script fragment from one loader.
    Fragment,
    /// A fully assembled replay script.
    Script,
    /// A script read back from disk at load time.
    Stored,
}

#[derive(Clone, Debug)]
pub enum LoaderResult {
    Fragment(ScriptFragment),
    Text(String),
}

/// Results handed back by loaders during one cycle. Flushed when a load
/// starts.
#[derive(Clone, Debug, Default)]
pub struct Mailbox {
    results: BTreeMap<(ResultKind, LoaderKind), LoaderResult>,
}

impl Mailbox {
    pub fn post(&mut self, kind: ResultKind, loader: LoaderKind, result: LoaderResult) -> ShellResult<()> {
        let key = (kind, loader);
        if self.results.contains_key(&key) {
            return Err(ShellError::invariant(format!("{:?} result from {} already posted this cycle", key.0, key.1)));
        }
        self.results.insert(key, result);
        Ok(())
    }

    pub fn get(&self, kind: ResultKind, loader: &LoaderKind) -> Option<&LoaderResult> {
        self.results.get(&(kind, loader.clone()))
    }

    pub fn fragments(&self) -> impl Iterator<Item = &ScriptFragment> {
        self.results.iter().filter_map(|((k, _), r)| match (k, r) {
            (ResultKind::Fragment, LoaderResult::Fragment(f)) => Some(f),
            _ => None,
        })
    }

    pub fn flush(&mut self) { self.results.clear(); }
    pub fn is_empty(&self) -> bool { self.results.is_empty() }
}

#[derive(Debug)]
pub struct RootProfile {
    pub(crate) name: String,
    pub(crate) addon: String,
    pub(crate) state: Option<ProfileState>,
    pub(crate) changed_at: Option<DateTime<Utc>>,
    pub(crate) children: BTreeMap<LoaderKind, LoaderProfile>,
    pub(crate) mailbox: Mailbox,
    next_seq: u64,
}

impl RootProfile {
    pub fn new(addon: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            addon: addon.to_string(),
            state: None,
            changed_at: None,
            children: BTreeMap::new(),
            mailbox: Mailbox::default(),
            next_seq: 0,
        }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn addon(&self) -> &str { &self.addon }
    pub fn state(&self) -> Option<ProfileState> { self.state }
    pub fn changed_at(&self) -> Option<DateTime<Utc>> { self.changed_at }
    pub fn mailbox(&self) -> &Mailbox { &self.mailbox }

    /// Not loaded, loading or unloading.
    pub fn is_idle(&self) -> bool { self.state.is_none_or(|s| s.is_unloaded()) }

    pub fn set_state(&mut self, to: ProfileState) -> ShellResult<()> {
        if !ProfileState::can_follow(self.state, to) {
            return Err(ShellError::IllegalStateTransition { from: self.state, to });
        }
        self.state = Some(to);
        self.changed_at = Some(Utc::now());
        Ok(())
    }

    pub fn loader(&self, kind: &LoaderKind) -> Option<&LoaderProfile> { self.children.get(kind) }
    pub fn loader_mut(&mut self, kind: &LoaderKind) -> Option<&mut LoaderProfile> { self.children.get_mut(kind) }
    pub fn loaders(&self) -> impl Iterator<Item = (&LoaderKind, &LoaderProfile)> { self.children.iter() }

    pub fn bind(&mut self, kind: LoaderKind, data: ProfileData) -> ShellResult<&mut LoaderProfile> {
        if self.children.contains_key(&kind) {
            return Err(ShellError::registration(format!("loader {kind} already bound to profile {}/{}", self.addon, self.name)));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let child = LoaderProfile::new(&self.addon, &self.name, seq, data);
        Ok(self.children.entry(kind).or_insert(child))
    }

    pub(crate) fn unbind(&mut self, kind: &LoaderKind) -> Option<LoaderProfile> { self.children.remove(kind) }

    pub fn status(&self) -> ProfileStatus {
        ProfileStatus {
            addon: self.addon.clone(),
            profile: self.name.clone(),
            state: self.state,
            changed_at: self.changed_at,
            failures: self.children.iter()
                .filter_map(|(k, c)| c.last_failure.as_ref().map(|f| (k.to_string(), f.error.to_string())))
                .collect(),
            addons_referenced: self.mailbox.fragments().flat_map(|f| f.addons.iter().cloned()).collect(),
        }
    }
}

/// Serializable snapshot for status queries.
#[derive(Clone, Debug, Serialize)]
pub struct ProfileStatus {
    pub addon: String,
    pub profile: String,
    pub state: Option<ProfileState>,
    pub changed_at: Option<DateTime<Utc>>,
    pub failures: BTreeMap<String, String>,
    pub addons_referenced: BTreeSet<String>,
}
