pub mod error;
pub mod value;
pub mod checker;
pub mod settings;
pub mod parameter;
pub mod manager;
pub mod script;
pub mod profile;
pub mod loader;
pub mod commands;
pub mod config;
pub mod container;
pub mod registry;
pub mod replay;

pub use error::{FailureContext, Phase, ShellError, ShellResult};
pub use value::{ParamValue, Value};
pub use checker::{ArgChecker, CheckerRegistry, ListChecker, ValueChecker};
pub use settings::{Property, ScopeKind, Settings};
pub use parameter::{Parameter, ParameterKind};
pub use manager::ParameterManager;
pub use profile::{ProfileState, ProfileStatus, ResultKind};
pub use loader::{Loader, LoaderContext, LoaderKind, LoaderSet};
pub use commands::{Command, CommandTable, CommandTrie, FnCommand};
pub use config::{ConfigManager, HostConfig, Scope};
pub use container::Container;
pub use registry::AddonRegistry;
pub use replay::apply_script;
