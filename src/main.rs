// addon-shell/src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use std::{fs, path::PathBuf, sync::Arc};
use tracing::{info, warn};

use addon_shell::{
    checker::{ArgChecker, StringChecker},
    replay, AddonRegistry, Container, ConfigManager, FnCommand, ParameterKind, Settings, ShellResult, Value,
};

#[derive(Parser)]
#[command(name = "addon-shell", version, about = "Addon host: load addons, replay scripts, run commands")]
struct Args {
    /// Workspace root; `<root>/.addon-shell/config.toml` is the workspace config layer
    #[arg(long, default_value = ".")]
    workspace: PathBuf,
    /// Addons to load on top of the configured autoload list
    #[arg(long = "load")]
    load: Vec<String>,
    /// Replay the scripts stored by the previous unload of each loaded addon
    #[arg(long)]
    restore: bool,
    /// Replay script files to run, in order
    #[arg(long = "script")]
    scripts: Vec<PathBuf>,
    /// Command or replay lines to run, in order
    #[arg(long = "exec")]
    exec: Vec<String>,
    /// Print profile status as JSON
    #[arg(long)]
    status: bool,
    /// Unload every addon before exiting and print the generated replay scripts
    #[arg(long)]
    unload_all: bool,
}

fn install_std(registry: &AddonRegistry) -> ShellResult<()> {
    registry.register_command(&["echo"], Arc::new(FnCommand::new("echo", |args: &[String]| Ok(args.join(" ")))), None)?;
    registry.register_command(
        &["std", "version"],
        Arc::new(FnCommand::new("version", |_: &[String]| Ok(env!("CARGO_PKG_VERSION").to_string()))),
        None,
    )?;
    registry.create_values(
        ParameterKind::Environment, "prompt", &[Value::str("addon-shell> ")],
        Settings::global(ArgChecker::single(StringChecker::new())), None,
    )?;
    registry.create_values(
        ParameterKind::Context, "log_level", &[Value::str("info"), Value::str("debug"), Value::str("trace")],
        Settings::global(ArgChecker::list(StringChecker::new())), None,
    )?;
    registry.enable_replay_file(None)
}

/// Replay-grammar lines go to the replay processor, anything else to the
/// command trie.
fn run_line(container: &mut Container, line: &str) -> Result<String> {
    let head = line.split_whitespace().next().unwrap_or_default();
    if head == "addon" || ParameterKind::from_manager_name(head).is_some() {
        replay::apply_line(container, line)?;
        return Ok(String::new());
    }
    container.dispatch(line)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = ConfigManager::load(&args.workspace).context("load configuration")?;
    let cfg = config.get();

    let filter = std::env::var("RUST_LOG").ok().or_else(|| cfg.log.filter.clone()).unwrap_or_else(|| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut container = Container::new(cfg.clone());
    container.install_addon("std", install_std).context("install std addon")?;

    for name in cfg.addons.autoload.iter().chain(&args.load) {
        match container.load_addon(name, None) {
            Ok(()) => info!(addon = %name, "loaded"),
            Err(e) => warn!(addon = %name, error = %e, "load failed"),
        }
    }

    if args.restore {
        let stored: Vec<String> = container.addon_names()
            .filter_map(|n| container.addon(n))
            .filter_map(|r| r.loaded_profile().and_then(|p| r.stored_script(&p)))
            .collect();
        for text in stored {
            if let Err(e) = replay::apply_script(&mut container, &text) { warn!(error = %e, "restore incomplete"); }
        }
    }

    for path in &args.scripts {
        let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        replay::apply_script(&mut container, &text).with_context(|| format!("replay {}", path.display()))?;
    }

    for line in &args.exec {
        let out = run_line(&mut container, line).with_context(|| format!("run `{line}`"))?;
        if !out.is_empty() { println!("{out}"); }
    }

    if args.unload_all {
        if let Err(e) = container.unload_all() { warn!(error = %e, "unload incomplete"); }
        for name in container.addon_names().map(str::to_string).collect::<Vec<_>>() {
            let Some(registry) = container.addon(&name) else { continue };
            for profile in registry.profile_names() {
                if let Some(script) = registry.replay_script(&profile) {
                    println!("# {name}/{profile}\n{script}");
                }
            }
        }
    }

    if args.status {
        println!("{}", serde_json::to_string_pretty(&container.status()).context("serialize status")?);
    }
    Ok(())
}
