// addon-shell/src/error.rs

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::{loader::LoaderKind, profile::ProfileState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase { Load, Unload }

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Load => write!(f, "load"), Self::Unload => write!(f, "unload") }
    }
}

/// Where a loader-phase failure happened. Filled in when the error is built,
/// never patched afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailureContext {
    pub addon: String,
    pub profile: String,
    pub loader: Option<LoaderKind>,
}

impl FailureContext {
    pub fn new(addon: impl Into<String>, profile: impl Into<String>, loader: Option<LoaderKind>) -> Self {
        Self { addon: addon.into(), profile: profile.into(), loader }
    }
}

impl fmt::Display for FailureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.loader {
            Some(l) => write!(f, "{}/{}/{}", self.addon, self.profile, l),
            None => write!(f, "{}/{}", self.addon, self.profile),
        }
    }
}

#[derive(Clone, Debug, Error)]
pub enum ShellError {
    /// User input rejected by a checker.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("illegal state transition: {} -> {to}", .from.map(|s| s.to_string()).unwrap_or_else(|| "unset".into()))]
    IllegalStateTransition { from: Option<ProfileState>, to: ProfileState },

    #[error("load failure [{context}]: {message}")]
    LoadFailure { context: FailureContext, message: String, #[source] cause: Option<Box<ShellError>> },

    #[error("unload failure [{context}]: {message}")]
    UnloadFailure { context: FailureContext, message: String, #[source] cause: Option<Box<ShellError>> },

    /// Misuse of the registration API by an addon author. Never aggregated.
    #[error("registration error: {0}")]
    Registration(String),

    #[error("{}", render_aggregate(.0))]
    Aggregated(Vec<ShellError>),
}

fn render_aggregate(errors: &[ShellError]) -> String {
    let mut s = format!("{} error(s):", errors.len());
    for (i, e) in errors.iter().enumerate() {
        s.push_str(&format!("\n  {}. {}", i + 1, e));
        if let Some(cause) = e.cause() { s.push_str(&format!(" (caused by: {cause})")); }
    }
    s
}

pub type ShellResult<T> = std::result::Result<T, ShellError>;

impl ShellError {
    pub fn invalid(msg: impl Into<String>) -> Self { Self::InvalidArgument(msg.into()) }
    pub fn invariant(msg: impl Into<String>) -> Self { Self::InvariantViolation(msg.into()) }
    pub fn registration(msg: impl Into<String>) -> Self { Self::Registration(msg.into()) }

    pub fn failure(phase: Phase, context: FailureContext, message: impl Into<String>) -> Self {
        let message = message.into();
        match phase {
            Phase::Load => Self::LoadFailure { context, message, cause: None },
            Phase::Unload => Self::UnloadFailure { context, message, cause: None },
        }
    }

    pub fn failure_caused_by(phase: Phase, context: FailureContext, message: impl Into<String>, cause: ShellError) -> Self {
        let message = message.into();
        let cause = Some(Box::new(cause));
        match phase {
            Phase::Load => Self::LoadFailure { context, message, cause },
            Phase::Unload => Self::UnloadFailure { context, message, cause },
        }
    }

    /// `Ok(())` for an empty list, the single error for a list of one,
    /// `Aggregated` otherwise.
    pub fn collect(mut errors: Vec<ShellError>) -> ShellResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Aggregated(errors)),
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::LoadFailure { .. } => Some(Phase::Load),
            Self::UnloadFailure { .. } => Some(Phase::Unload),
            _ => None,
        }
    }

    pub fn context(&self) -> Option<&FailureContext> {
        match self {
            Self::LoadFailure { context, .. } | Self::UnloadFailure { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn cause(&self) -> Option<&ShellError> {
        match self {
            Self::LoadFailure { cause, .. } | Self::UnloadFailure { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }

    /// Sub-errors of an aggregate; a single-element slice for anything else.
    pub fn errors(&self) -> &[ShellError] {
        match self {
            Self::Aggregated(v) => v,
            other => std::slice::from_ref(other),
        }
    }
}
