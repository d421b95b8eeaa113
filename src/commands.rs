// addon-shell/src/commands.rs

use anyhow::{anyhow, Result};
use std::{collections::BTreeMap, sync::Arc};

use crate::error::{ShellError, ShellResult};

pub trait Command: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, args: &[String]) -> Result<String>;
}

/// Token-path router the command loader inserts into. The real shell plugs
/// its prefix tree in here.
pub trait CommandTrie: Send + Sync {
    fn insert(&mut self, keys: &[String], cmd: Arc<dyn Command>) -> ShellResult<()>;
    fn remove(&mut self, keys: &[String]) -> Option<Arc<dyn Command>>;
    fn contains(&self, keys: &[String]) -> bool;
    /// Longest registered prefix of `tokens`, with the remaining arguments.
    fn resolve<'t>(&self, tokens: &'t [String]) -> Option<(Arc<dyn Command>, &'t [String])>;
    fn paths(&self) -> Vec<Vec<String>>;
}

pub fn validate_keys(keys: &[String]) -> ShellResult<()> {
    if keys.is_empty() { return Err(ShellError::registration("command key list is empty")); }
    for k in keys {
        if k.is_empty() || k.chars().any(char::is_whitespace) {
            return Err(ShellError::registration(format!("invalid command key '{k}' in {keys:?}")));
        }
    }
    Ok(())
}

#[derive(Clone, Default)]
pub struct CommandTable {
    cmds: BTreeMap<Vec<String>, Arc<dyn Command>>,
}

impl CommandTable {
    pub fn new() -> Self { Self::default() }
}

impl CommandTrie for CommandTable {
    fn insert(&mut self, keys: &[String], cmd: Arc<dyn Command>) -> ShellResult<()> {
        validate_keys(keys)?;
        if self.cmds.contains_key(keys) {
            return Err(ShellError::invalid(format!("command path '{}' already in use", keys.join(" "))));
        }
        self.cmds.insert(keys.to_vec(), cmd);
        Ok(())
    }

    fn remove(&mut self, keys: &[String]) -> Option<Arc<dyn Command>> { self.cmds.remove(keys) }
    fn contains(&self, keys: &[String]) -> bool { self.cmds.contains_key(keys) }

    fn resolve<'t>(&self, tokens: &'t [String]) -> Option<(Arc<dyn Command>, &'t [String])> {
        (1..=tokens.len()).rev().find_map(|n| self.cmds.get(&tokens[..n]).map(|c| (c.clone(), &tokens[n..])))
    }

    fn paths(&self) -> Vec<Vec<String>> { self.cmds.keys().cloned().collect() }
}

/// Run one command line against a trie.
pub fn dispatch(trie: &dyn CommandTrie, input: &str) -> Result<String> {
    let parts: Vec<String> = crate::value::tokenize(input.trim())?;
    if parts.is_empty() { return Err(anyhow!("empty command")); }
    let (cmd, args) = trie.resolve(&parts).ok_or_else(|| anyhow!("unknown command: {}", parts[0]))?;
    cmd.run(args)
}

/// Command backed by a closure, for addons that do not need their own type.
pub struct FnCommand<F> {
    name: String,
    f: F,
}

impl<F> FnCommand<F>
where
    F: Fn(&[String]) -> Result<String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self { Self { name: name.into(), f } }
}

impl<F> Command for FnCommand<F>
where
    F: Fn(&[String]) -> Result<String> + Send + Sync,
{
    fn name(&self) -> &str { &self.name }
    fn run(&self, args: &[String]) -> Result<String> { (self.f)(args) }
}
