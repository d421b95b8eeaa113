// addon-shell/src/loader/dependency.rs

use tracing::warn;

use crate::{
    container::Container,
    error::{Phase, ShellError, ShellResult},
    loader::{Loader, LoaderContext, LoaderKind},
    profile::{LoaderResult, ProfileData, ResultKind},
    script::ScriptFragment,
};

/// Checks that every addon this profile depends on is loaded. On unload it
/// hands the dependency names to the replay script header.
pub struct DependencyLoader;

impl Loader for DependencyLoader {
    fn kind(&self) -> LoaderKind { LoaderKind::DEPENDENCY }

    fn load(&self, ctx: &mut LoaderContext<'_>, container: Option<&mut Container>) -> ShellResult<()> {
        let fctx = ctx.failure_context();
        let Some(container) = container else {
            return Err(ShellError::failure(Phase::Load, fctx, "no container to resolve dependencies against"));
        };
        let ProfileData::Dependencies(deps) = &ctx.profile.data else { return Ok(()) };
        let mut errors = vec![];
        for dep in deps {
            let Some(target) = container.addon(&dep.addon) else {
                warn!(addon = ctx.addon, dependency = %dep.addon, "dependency not installed");
                errors.push(ShellError::failure(Phase::Load, fctx.clone(), format!("dependency {} is not installed", dep.addon)));
                continue;
            };
            let profile = dep.profile.clone().unwrap_or_else(|| target.resolve_profile(None));
            match target.state(&profile) {
                Some(state) if state.is_loaded() => {}
                state => {
                    let state = state.map(|s| s.to_string()).unwrap_or_else(|| "not loaded".into());
                    warn!(addon = ctx.addon, dependency = %dep.addon, profile = %profile, %state, "dependency not loaded");
                    errors.push(ShellError::failure(
                        Phase::Load, fctx.clone(),
                        format!("dependency {}/{profile} is {state}", dep.addon),
                    ));
                }
            }
        }
        ShellError::collect(errors)
    }

    fn unload(&self, ctx: &mut LoaderContext<'_>, _container: Option<&mut Container>) -> ShellResult<()> {
        let ProfileData::Dependencies(deps) = &ctx.profile.data else { return Ok(()) };
        if deps.is_empty() { return Ok(()); }
        let fragment = ScriptFragment { addons: deps.iter().map(|d| d.addon.clone()).collect(), ..ScriptFragment::default() };
        ctx.mailbox.post(ResultKind::Fragment, self.kind(), LoaderResult::Fragment(fragment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Dependency, LoaderProfile, Mailbox};

    fn run(phase: Phase, deps: Vec<Dependency>, container: Option<&mut Container>) -> (ShellResult<()>, Mailbox) {
        let mut profile = LoaderProfile::new("app", "default", 0, ProfileData::Dependencies(deps));
        let mut mailbox = Mailbox::default();
        let kind = LoaderKind::DEPENDENCY;
        let mut ctx = LoaderContext { addon: "app", profile_name: "default", kind: &kind, profile: &mut profile, mailbox: &mut mailbox };
        let res = DependencyLoader.run(phase, &mut ctx, container);
        (res, mailbox)
    }

    fn dep(addon: &str) -> Dependency { Dependency { addon: addon.into(), profile: None } }

    #[test]
    fn test_no_container_fails_immediately() {
        let (res, _) = run(Phase::Load, vec![dep("a"), dep("b")], None);
        let err = res.unwrap_err();
        assert!(matches!(err, ShellError::LoadFailure { .. }));
        assert!(err.to_string().contains("no container"));
    }

    #[test]
    fn test_each_unmet_dependency_is_reported() {
        let mut c = Container::default();
        c.install_addon("a", |_| Ok(())).unwrap();
        let (res, _) = run(Phase::Load, vec![dep("a"), dep("missing")], Some(&mut c));
        let err = res.unwrap_err();
        assert_eq!(err.errors().len(), 2);
        assert!(err.errors()[0].to_string().contains("dependency a/default is not loaded"), "got: {err}");
        assert!(err.errors()[1].to_string().contains("missing is not installed"), "got: {err}");
    }

    #[test]
    fn test_loaded_dependency_passes() {
        let mut c = Container::default();
        c.install_addon("a", |r| r.create_profile("default").map(|_| ())).unwrap();
        c.load_addon("a", None).unwrap();
        let (res, _) = run(Phase::Load, vec![dep("a")], Some(&mut c));
        res.unwrap();
        let (res, _) = run(Phase::Load, vec![Dependency { addon: "a".into(), profile: Some("other".into()) }], Some(&mut c));
        assert!(res.is_err());
    }

    #[test]
    fn test_unload_posts_header_addons() {
        let (res, mailbox) = run(Phase::Unload, vec![dep("b"), dep("a")], None);
        res.unwrap();
        let f: Vec<_> = mailbox.fragments().collect();
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].addons.iter().cloned().collect::<Vec<_>>(), vec!["a".to_string(), "b".to_string()]);
    }
}
