// addon-shell/src/loader/command.rs

use tracing::debug;

use crate::{
    container::Container,
    error::{Phase, ShellError, ShellResult},
    loader::{Loader, LoaderContext, LoaderKind},
    profile::ProfileData,
};

/// Inserts an addon's commands into the host command trie and takes back
/// exactly what it inserted.
pub struct CommandLoader;

impl Loader for CommandLoader {
    fn kind(&self) -> LoaderKind { LoaderKind::COMMAND }

    fn load(&self, ctx: &mut LoaderContext<'_>, container: Option<&mut Container>) -> ShellResult<()> {
        let fctx = ctx.failure_context();
        let Some(container) = container else {
            return Err(ShellError::failure(Phase::Load, fctx, "no container holds a command trie"));
        };
        let ProfileData::Commands { declared, inserted } = &mut ctx.profile.data else { return Ok(()) };
        let mut errors = vec![];
        for entry in declared.iter() {
            match container.commands_mut().insert(&entry.keys, entry.command.clone()) {
                Ok(()) => {
                    debug!(addon = ctx.addon, path = %entry.keys.join(" "), "command inserted");
                    inserted.push(entry.keys.clone());
                }
                Err(e) => errors.push(ShellError::failure_caused_by(
                    Phase::Load, fctx.clone(), format!("cannot insert command '{}'", entry.keys.join(" ")), e,
                )),
            }
        }
        ShellError::collect(errors)
    }

    fn unload(&self, ctx: &mut LoaderContext<'_>, container: Option<&mut Container>) -> ShellResult<()> {
        let fctx = ctx.failure_context();
        let Some(container) = container else {
            return Err(ShellError::failure(Phase::Unload, fctx, "no container holds a command trie"));
        };
        let ProfileData::Commands { inserted, .. } = &mut ctx.profile.data else { return Ok(()) };
        let mut errors = vec![];
        for keys in std::mem::take(inserted) {
            if container.commands_mut().remove(&keys).is_none() {
                errors.push(ShellError::failure(Phase::Unload, fctx.clone(), format!("command '{}' was already gone", keys.join(" "))));
            }
        }
        ShellError::collect(errors)
    }
}
