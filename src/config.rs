use anyhow::{Context, Result};
use directories::ProjectDirs;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}, sync::Arc};
use tracing::warn;

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    pub replay: ReplayConfig,
    pub addons: AddonsConfig,
    pub log: LogConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ReplayConfig {
    /// Where unload writes `<addon>.<profile>.<extension>` scripts.
    pub script_dir: Option<PathBuf>,
    pub extension: Option<String>,
    pub write_on_unload: Option<bool>,
}

impl ReplayConfig {
    pub fn extension(&self) -> &str { self.extension.as_deref().unwrap_or("pys") }
    pub fn writes_on_unload(&self) -> bool { self.write_on_unload.unwrap_or(self.script_dir.is_some()) }

    pub fn script_path(&self, addon: &str, profile: &str) -> Option<PathBuf> {
        let dir = self.script_dir.as_ref()?;
        Some(dir.join(format!("{addon}.{profile}.{}", self.extension())))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AddonsConfig {
    pub default_profile: Option<String>,
    pub autoload: Vec<String>,
}

impl AddonsConfig {
    pub fn default_profile(&self) -> &str { self.default_profile.as_deref().unwrap_or("default") }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub filter: Option<String>, // e.g. "addon_shell=debug"
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scope { System, User, Workspace, Runtime }

pub fn merge(a: &mut HostConfig, b: &HostConfig) {
    let overlay = |dst: &mut Option<String>, src: &Option<String>| { if src.is_some() { *dst = src.clone(); } };
    if b.replay.script_dir.is_some() { a.replay.script_dir = b.replay.script_dir.clone(); }
    overlay(&mut a.replay.extension, &b.replay.extension);
    if let Some(v) = b.replay.write_on_unload { a.replay.write_on_unload = Some(v); }

    overlay(&mut a.addons.default_profile, &b.addons.default_profile);
    if !b.addons.autoload.is_empty() { a.addons.autoload = b.addons.autoload.clone(); }

    overlay(&mut a.log.filter, &b.log.filter);
}

fn config_paths(workspace_root: &Path) -> Result<(PathBuf, PathBuf, PathBuf)> {
    let proj = ProjectDirs::from("org", "addon-shell", "addon-shell").context("ProjectDirs not available")?;
    let user = proj.config_dir().join("config.toml");
    let system = if cfg!(target_os = "windows") {
        PathBuf::from(r"C:\ProgramData\AddonShell\config.toml")
    } else {
        PathBuf::from("/etc/addon-shell/config.toml")
    };
    let workspace = workspace_root.join(".addon-shell").join("config.toml");
    Ok((system, user, workspace))
}

#[derive(Clone)]
pub struct ConfigManager {
    inner: Arc<RwLock<HostConfig>>,
    system_path: PathBuf,
    user_path: PathBuf,
    workspace_path: PathBuf,
    runtime_overlay: Arc<RwLock<HostConfig>>,
}

impl ConfigManager {
    pub fn load(workspace_root: impl AsRef<Path>) -> Result<Self> {
        let (system, user, workspace) = config_paths(workspace_root.as_ref())?;
        Self::from_paths(system, user, workspace)
    }

    pub fn from_paths(system_path: PathBuf, user_path: PathBuf, workspace_path: PathBuf) -> Result<Self> {
        let me = Self {
            inner: Arc::new(RwLock::new(HostConfig::default())),
            system_path, user_path, workspace_path,
            runtime_overlay: Arc::new(RwLock::new(HostConfig::default())),
        };
        me.reload_all()?;
        Ok(me)
    }

    /// Missing files are skipped; unparsable ones are logged and skipped.
    fn read_file(path: &Path) -> Option<HostConfig> {
        let text = fs::read_to_string(path).ok()?;
        match toml::from_str(&text) {
            Ok(c) => Some(c),
            Err(e) => { warn!(path = %path.display(), error = %e, "ignoring malformed config"); None }
        }
    }

    pub fn reload_all(&self) -> Result<()> {
        let mut merged = HostConfig::default();
        if let Some(sys) = Self::read_file(&self.system_path) { merge(&mut merged, &sys); }
        if let Some(usr) = Self::read_file(&self.user_path) { merge(&mut merged, &usr); }
        if let Some(ws)  = Self::read_file(&self.workspace_path) { merge(&mut merged, &ws); }
        let rt = self.runtime_overlay.read().clone();
        merge(&mut merged, &rt);
        *self.inner.write() = merged;
        Ok(())
    }

    pub fn get(&self) -> HostConfig { self.inner.read().clone() }

    pub fn apply_runtime_overlay(&self, patch: HostConfig) -> Result<()> {
        {
            let mut rt = self.runtime_overlay.write();
            merge(&mut rt, &patch);
        }
        self.reload_all()
    }

    pub fn write_patch(&self, scope: Scope, patch: &HostConfig) -> Result<()> {
        let path = match scope {
            Scope::System    => &self.system_path,
            Scope::User      => &self.user_path,
            Scope::Workspace => &self.workspace_path,
            Scope::Runtime   => anyhow::bail!("Runtime scope is ephemeral; cannot persist"),
        };
        if let Some(dir) = path.parent() { fs::create_dir_all(dir)?; }
        let mut merged = Self::read_file(path).unwrap_or_default();
        merge(&mut merged, patch);
        let text = toml::to_string_pretty(&merged).context("serialize toml")?;
        fs::write(path, text).with_context(|| format!("write {}", path.display()))?;
        self.reload_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &Path) -> ConfigManager {
        ConfigManager::from_paths(dir.join("sys.toml"), dir.join("user.toml"), dir.join("ws.toml")).unwrap()
    }

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let c = manager(dir.path()).get();
        assert_eq!(c.addons.default_profile(), "default");
        assert_eq!(c.replay.extension(), "pys");
        assert!(!c.replay.writes_on_unload());
        assert!(c.replay.script_path("net", "default").is_none());
    }

    #[test]
    fn test_layers_merge_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sys.toml"), "[addons]\ndefault_profile = \"sys\"\nautoload = [\"a\"]\n").unwrap();
        fs::write(dir.path().join("ws.toml"), "[addons]\ndefault_profile = \"ws\"\n[replay]\nscript_dir = \"/tmp/r\"\n").unwrap();
        let cm = manager(dir.path());
        let c = cm.get();
        assert_eq!(c.addons.default_profile(), "ws");
        assert_eq!(c.addons.autoload, vec!["a".to_string()]);
        assert!(c.replay.writes_on_unload());
        assert_eq!(c.replay.script_path("net", "p").unwrap(), PathBuf::from("/tmp/r/net.p.pys"));

        let mut patch = HostConfig::default();
        patch.replay.write_on_unload = Some(false);
        cm.apply_runtime_overlay(patch).unwrap();
        assert!(!cm.get().replay.writes_on_unload());
    }

    #[test]
    fn test_malformed_layer_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("user.toml"), "[addons\n").unwrap();
        assert_eq!(manager(dir.path()).get(), HostConfig::default());
    }

    #[test]
    fn test_write_patch() {
        let dir = tempfile::tempdir().unwrap();
        let cm = manager(dir.path());
        let mut patch = HostConfig::default();
        patch.log.filter = Some("debug".into());
        cm.write_patch(Scope::Workspace, &patch).unwrap();
        assert_eq!(cm.get().log.filter.as_deref(), Some("debug"));
        assert!(cm.write_patch(Scope::Runtime, &patch).is_err());
    }
}
