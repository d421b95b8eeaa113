// addon-shell/src/replay.rs

//! Executes replay scripts against a container.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    checker::{ArgChecker, ListChecker, ValueChecker},
    container::Container,
    error::{ShellError, ShellResult},
    manager::ParameterManager,
    parameter::{Parameter, ParameterKind},
    settings::{Property, Settings},
    value::{tokenize_marked, Token, Value},
};

const BOOL_FLAGS: [&str; 4] = ["-local_param", "-start_with_local", "-explore_other_scope", "-list"];
const CHECKER_FLAG: &str = "-checker";

struct Args {
    positional: Vec<String>,
    local_param: bool,
    start_with_local: bool,
    explore_other_scope: bool,
    list: Option<bool>,
    checker: Option<String>,
}

impl Args {
    /// Unquoted flag names take the next token as their value. Everything
    /// else is positional, quoted flag names included.
    fn parse(tokens: &[Token]) -> ShellResult<Self> {
        let mut out = Self {
            positional: vec![],
            local_param: true,
            start_with_local: true,
            explore_other_scope: true,
            list: None,
            checker: None,
        };
        let mut it = tokens.iter();
        while let Some(tok) = it.next() {
            let flag = tok.text.as_str();
            if tok.quoted || !(BOOL_FLAGS.contains(&flag) || flag == CHECKER_FLAG) {
                out.positional.push(tok.text.clone());
                continue;
            }
            let raw = &it.next().ok_or_else(|| ShellError::invalid(format!("flag {flag} needs a value")))?.text;
            if flag == CHECKER_FLAG {
                out.checker = Some(raw.clone());
                continue;
            }
            let Value::Bool(v) = Value::infer(raw) else {
                return Err(ShellError::invalid(format!("flag {flag} expects True or False, got '{raw}'")));
            };
            match flag {
                "-local_param" => out.local_param = v,
                "-start_with_local" => out.start_with_local = v,
                "-explore_other_scope" => out.explore_other_scope = v,
                _ => out.list = Some(v),
            }
        }
        Ok(out)
    }

    fn name(&self) -> ShellResult<&str> {
        self.positional.first().map(String::as_str).ok_or_else(|| ShellError::invalid("missing parameter name"))
    }

    fn values(&self) -> Vec<Value> { self.positional.iter().skip(1).map(|t| Value::str(t.as_str())).collect() }
}

/// Run every line of `text`. Blank lines and `#` comments are skipped; a
/// failing line is logged and the rest still runs.
pub fn apply_script(container: &mut Container, text: &str) -> ShellResult<()> {
    let mut errors = vec![];
    for (no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') { continue; }
        debug!(line = no + 1, text = line, "replay");
        if let Err(e) = apply_line(container, line) {
            warn!(line = no + 1, error = %e, "replay line failed");
            errors.push(e);
        }
    }
    ShellError::collect(errors)
}

pub fn apply_line(container: &mut Container, line: &str) -> ShellResult<()> {
    let tokens = tokenize_marked(line)?;
    let Some((head, rest)) = tokens.split_first() else { return Ok(()) };
    let profile = |tail: &[Token]| tail.first().map(|t| t.text.clone());
    if head.text == "addon" {
        return match rest {
            [verb, name, tail @ ..] if verb.text == "load" => {
                if container.is_loaded(&name.text) { return Ok(()); }
                container.load_addon(&name.text, profile(tail).as_deref())
            }
            [verb, name, tail @ ..] if verb.text == "unload" => container.unload_addon(&name.text, profile(tail).as_deref()),
            _ => Err(ShellError::invalid(format!("cannot parse: {line}"))),
        };
    }
    let kind = ParameterKind::from_manager_name(&head.text)
        .ok_or_else(|| ShellError::invalid(format!("unknown manager '{}'", head.text)))?;
    let Some((verb, rest)) = rest.split_first() else {
        return Err(ShellError::invalid(format!("missing {kind} operation")));
    };
    match verb.text.as_str() {
        "create" => create(container, kind, &Args::parse(rest)?),
        "set" => {
            let a = Args::parse(rest)?;
            container.manager_mut(kind).set_values(a.name()?, &a.values(), a.start_with_local, a.explore_other_scope)
        }
        "add" => {
            let a = Args::parse(rest)?;
            container.manager_mut(kind).add_values(a.name()?, &a.values(), a.start_with_local, a.explore_other_scope)
        }
        "subtract" => {
            let a = Args::parse(rest)?;
            container.manager_mut(kind).remove_values(a.name()?, &a.values(), a.start_with_local, a.explore_other_scope)
        }
        "unset" => {
            let a = Args::parse(rest)?;
            container.manager_mut(kind).unset(a.name()?, a.start_with_local, a.explore_other_scope).map(|_| ())
        }
        "properties" => set_property(container, kind, rest),
        other => Err(ShellError::invalid(format!("unknown {kind} operation '{other}'"))),
    }
}

/// `create`. For a global name an addon already holds, the values are read
/// through that entry's own checker and must match it. Otherwise `-checker` and
/// `-list` pick the checker; without them one token gives a scalar, several a
/// list, and the item type follows the tokens when they all agree.
fn create(container: &mut Container, kind: ParameterKind, args: &Args) -> ShellResult<()> {
    let name = args.name()?;
    let values = args.values();
    if !args.local_param && container.manager(kind).owner(name).is_some() {
        return match_owned(container.manager(kind), name, &values);
    }
    let item: Arc<dyn ValueChecker> = match &args.checker {
        Some(type_name) => container.checkers().by_type_name(type_name)
            .ok_or_else(|| ShellError::invalid(format!("unknown checker type '{type_name}'")))?,
        None => {
            let typed: Vec<Value> = args.positional.iter().skip(1).map(|t| Value::infer(t)).collect();
            match typed.first() {
                Some(first) if typed.iter().all(|v| v.type_name() == first.type_name()) => container.checkers().for_value(first),
                _ => container.checkers().string(),
            }
        }
    };
    let list = kind == ParameterKind::Context || args.list.unwrap_or(values.len() != 1);
    let checker = if list { ArgChecker::List(ListChecker::unbounded(item)) } else { ArgChecker::Single(item) };
    let settings = if args.local_param { Settings::local(checker) } else { Settings::global(checker) };
    let parameter = Parameter::new(kind, &values, settings)?;
    container.manager_mut(kind).create(name, parameter)
}

fn match_owned(manager: &ParameterManager, name: &str, values: &[Value]) -> ShellResult<()> {
    let current = manager.get(name, false, false)
        .ok_or_else(|| ShellError::invalid(format!("unknown {} '{name}'", manager.kind())))?;
    if current.settings().checker().validate(values)? == *current.value() { return Ok(()); }
    let owner = manager.owner(name).unwrap_or("an addon");
    Err(ShellError::invalid(format!("{} '{name}' already exists in global scope, owned by {owner}", manager.kind())))
}

/// `properties set <name> <property> <value>`. A property already holding
/// the value is left alone, so read-only values accept their own settings.
fn set_property(container: &mut Container, kind: ParameterKind, rest: &[Token]) -> ShellResult<()> {
    let a = Args::parse(rest)?;
    let [verb, name, property, raw] = a.positional.as_slice() else {
        return Err(ShellError::invalid(format!("expected: {kind} properties set <name> <property> <value>")));
    };
    if verb != "set" { return Err(ShellError::invalid(format!("unknown properties operation '{verb}'"))); }
    let property = Property::parse(property)?;
    let manager = container.manager_mut(kind);
    let current = manager.get(name, a.start_with_local, a.explore_other_scope)
        .ok_or_else(|| ShellError::invalid(format!("unknown {kind} '{name}'")))?
        .property(property);
    if current == Some(Value::infer(raw)) { return Ok(()); }
    manager.set_property(name, property, &Value::str(raw.as_str()), a.start_with_local, a.explore_other_scope)
}
