// addon-shell/src/loader/file.rs

use std::fs;
use tracing::info;

use crate::{
    container::Container,
    error::{Phase, ShellError, ShellResult},
    loader::{Loader, LoaderContext, LoaderKind},
    profile::{LoaderResult, ProfileData, ResultKind},
    script,
};

/// Persists the replay script of one root profile.
///
/// Unload assembles every fragment posted so far into the `Script` result and
/// writes it to `<script_dir>/<addon>.<profile>.<ext>`. Load reads that file
/// back and posts it as the `Stored` result for the host to replay.
pub struct FileLoader;

impl Loader for FileLoader {
    fn kind(&self) -> LoaderKind { LoaderKind::FILE }

    fn load(&self, ctx: &mut LoaderContext<'_>, container: Option<&mut Container>) -> ShellResult<()> {
        let fctx = ctx.failure_context();
        let Some(container) = container else {
            return Err(ShellError::failure(Phase::Load, fctx, "no container to read the replay settings from"));
        };
        let path = container.config().replay.script_path(ctx.addon, ctx.profile_name);
        ctx.profile.data = ProfileData::File { path: path.clone() };
        let Some(path) = path.filter(|p| p.is_file()) else { return Ok(()) };
        let text = fs::read_to_string(&path)
            .map_err(|e| ShellError::failure(Phase::Load, fctx, format!("cannot read {}: {e}", path.display())))?;
        ctx.mailbox.post(ResultKind::Stored, self.kind(), LoaderResult::Text(text))
    }

    fn unload(&self, ctx: &mut LoaderContext<'_>, container: Option<&mut Container>) -> ShellResult<()> {
        let fctx = ctx.failure_context();
        let text = script::assemble(ctx.mailbox.fragments());
        if !text.is_empty() {
            ctx.mailbox.post(ResultKind::Script, self.kind(), LoaderResult::Text(text.clone()))?;
        }
        let Some(container) = container else { return Ok(()) };
        let replay = &container.config().replay;
        if !replay.writes_on_unload() { return Ok(()); }
        let Some(path) = replay.script_path(ctx.addon, ctx.profile_name) else { return Ok(()) };
        let io_err = |e: std::io::Error| ShellError::failure(Phase::Unload, fctx.clone(), format!("cannot write {}: {e}", path.display()));
        if text.is_empty() {
            if path.is_file() { fs::remove_file(&path).map_err(io_err)?; }
            return Ok(());
        }
        if let Some(dir) = path.parent() { fs::create_dir_all(dir).map_err(io_err)?; }
        fs::write(&path, &text).map_err(io_err)?;
        info!(addon = ctx.addon, profile = ctx.profile_name, path = %path.display(), "wrote replay script");
        ctx.profile.data = ProfileData::File { path: Some(path) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::HostConfig,
        parameter::ParameterKind,
        profile::{LoaderProfile, Mailbox},
        script::{Instruction, ScriptFragment},
    };

    fn container(dir: &std::path::Path) -> Container {
        let mut cfg = HostConfig::default();
        cfg.replay.script_dir = Some(dir.to_path_buf());
        Container::new(cfg)
    }

    fn run(phase: Phase, mailbox: &mut Mailbox, c: &mut Container) -> ShellResult<()> {
        let mut p = LoaderProfile::new("net", "default", 0, ProfileData::File { path: None });
        let kind = LoaderKind::FILE;
        let mut ctx = LoaderContext { addon: "net", profile_name: "default", kind: &kind, profile: &mut p, mailbox };
        FileLoader.run(phase, &mut ctx, Some(c))
    }

    #[test]
    fn test_unload_writes_and_load_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = container(dir.path());
        let mut m = Mailbox::default();
        let mut f = ScriptFragment::for_manager(ParameterKind::Variable);
        f.addons.insert("net".into());
        f.instructions.push(Instruction::Unset { name: "v".into() });
        m.post(ResultKind::Fragment, LoaderKind::VARIABLE, LoaderResult::Fragment(f)).unwrap();
        run(Phase::Unload, &mut m, &mut c).unwrap();

        let written = std::fs::read_to_string(dir.path().join("net.default.pys")).unwrap();
        assert_eq!(written, "addon load net\n\nvariable unset v -start_with_local False -explore_other_scope False\n");
        assert!(matches!(m.get(ResultKind::Script, &LoaderKind::FILE), Some(LoaderResult::Text(t)) if *t == written));

        let mut fresh = Mailbox::default();
        run(Phase::Load, &mut fresh, &mut c).unwrap();
        assert!(matches!(fresh.get(ResultKind::Stored, &LoaderKind::FILE), Some(LoaderResult::Text(t)) if *t == written));
    }

    #[test]
    fn test_empty_unload_removes_stale_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.default.pys");
        std::fs::write(&path, "addon load x\n").unwrap();
        let mut c = container(dir.path());
        run(Phase::Unload, &mut Mailbox::default(), &mut c).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_without_script_dir_only_posts() {
        let mut c = Container::default();
        let mut m = Mailbox::default();
        m.post(ResultKind::Fragment, LoaderKind::DEPENDENCY, LoaderResult::Fragment(ScriptFragment {
            addons: ["core".to_string()].into(),
            ..ScriptFragment::default()
        })).unwrap();
        run(Phase::Unload, &mut m, &mut c).unwrap();
        assert!(matches!(m.get(ResultKind::Script, &LoaderKind::FILE), Some(LoaderResult::Text(t)) if t == "addon load core\n"));
        run(Phase::Load, &mut Mailbox::default(), &mut c).unwrap();
    }
}
