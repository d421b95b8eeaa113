use std::sync::Arc;

use addon_shell::{
    Container, Loader, LoaderContext, LoaderKind, Phase, ProfileState, ShellError, ShellResult,
};
use parking_lot::Mutex;

struct Probe {
    kind: LoaderKind,
    log: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl Probe {
    fn record(&self, phase: &str, ctx: &LoaderContext<'_>) -> ShellResult<()> {
        self.log.lock().push(format!("{phase}:{}", self.kind));
        if self.fail {
            return Err(ShellError::failure(
                if phase == "load" { Phase::Load } else { Phase::Unload },
                ctx.failure_context(),
                format!("{} refused", self.kind),
            ));
        }
        Ok(())
    }
}

impl Loader for Probe {
    fn kind(&self) -> LoaderKind { self.kind.clone() }
    fn load(&self, ctx: &mut LoaderContext<'_>, _: Option<&mut Container>) -> ShellResult<()> { self.record("load", ctx) }
    fn unload(&self, ctx: &mut LoaderContext<'_>, _: Option<&mut Container>) -> ShellResult<()> { self.record("unload", ctx) }
}

fn host(failing: &[&str]) -> (Container, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(vec![]));
    let mut c = Container::default();
    for name in ["A", "B", "C"] {
        c.loaders_mut().register(Arc::new(Probe { kind: LoaderKind::custom(name), log: log.clone(), fail: failing.contains(&name) }));
    }
    (c, log)
}

fn install_probes(c: &mut Container) {
    c.install_addon("probe", |r| {
        let (a, b) = (LoaderKind::custom("A"), LoaderKind::custom("B"));
        r.bind_custom_loader(b.clone(), None)?;
        r.bind_custom_loader(a.clone(), None)?;
        r.set_load_priority(&a, 10.0, None)?;
        r.set_load_priority(&b, 20.0, None)?;
        r.set_unload_priority(&a, 20.0, None)?;
        r.set_unload_priority(&b, 10.0, None)
    }).unwrap();
}

#[test]
fn test_priority_order_on_load_and_unload() {
    let (mut c, log) = host(&[]);
    install_probes(&mut c);
    c.load_addon("probe", None).unwrap();
    c.unload_addon("probe", None).unwrap();
    assert_eq!(*log.lock(), vec!["load:A", "load:B", "unload:B", "unload:A"]);
    assert_eq!(c.state("probe", "default"), Some(ProfileState::Unloaded));
}

#[test]
fn test_default_priorities_break_ties_by_binding_order() {
    let (mut c, log) = host(&[]);
    c.install_addon("probe", |r| {
        let a = LoaderKind::custom("A");
        r.bind_custom_loader(a.clone(), None)?;
        r.bind_custom_loader(LoaderKind::custom("B"), None)?;
        r.bind_custom_loader(LoaderKind::custom("C"), None)?;
        r.set_load_priority(&a, 50.0, None)?;
        r.set_unload_priority(&a, 200.0, None)
    }).unwrap();
    c.load_addon("probe", None).unwrap();
    c.unload_addon("probe", None).unwrap();
    assert_eq!(*log.lock(), vec!["load:A", "load:B", "load:C", "unload:B", "unload:C", "unload:A"]);
}

#[test]
fn test_two_failing_loaders_give_one_aggregate() {
    let (mut c, log) = host(&["A", "B"]);
    install_probes(&mut c);
    let err = c.load_addon("probe", None).unwrap_err();
    let ShellError::Aggregated(errors) = &err else { panic!("expected an aggregate, got {err}") };
    assert_eq!(errors.len(), 2);
    assert_eq!(log.lock().len(), 2, "the pass runs every loader");
    assert!(err.to_string().starts_with("2 error(s):"));

    let registry = c.addon("probe").unwrap();
    for kind in ["A", "B"] {
        let failure = registry.last_failure("default", &LoaderKind::custom(kind)).unwrap();
        assert_eq!(failure.phase, Phase::Load);
        assert_eq!(failure.error.context().unwrap().addon, "probe");
    }
    let status = &registry.status()[0];
    assert_eq!(status.state, Some(ProfileState::LoadedE));
    assert_eq!(status.failures.len(), 2);

    let unload = c.unload_addon("probe", None).unwrap_err();
    assert_eq!(unload.errors().len(), 2);
    assert_eq!(c.state("probe", "default"), Some(ProfileState::UnloadedE));
    c.load_addon("probe", None).unwrap_err();
    assert_eq!(c.state("probe", "default"), Some(ProfileState::LoadedE), "error states can cycle again");
}

#[test]
fn test_second_load_is_a_load_failure() {
    let (mut c, _) = host(&[]);
    install_probes(&mut c);
    c.load_addon("probe", None).unwrap();
    let err = c.load_addon("probe", None).unwrap_err();
    assert!(matches!(err, ShellError::LoadFailure { .. }));
    assert_eq!(c.state("probe", "default"), Some(ProfileState::Loaded));
}

#[test]
fn test_missing_profile_is_a_load_failure() {
    let (mut c, _) = host(&[]);
    install_probes(&mut c);
    let err = c.load_addon("probe", Some("other")).unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Load));
}

#[test]
fn test_dependencies_aggregate_and_recover() {
    let mut c = Container::default();
    c.install_addon("core", |r| r.create_profile("default").map(|_| ())).unwrap();
    c.install_addon("app", |r| {
        r.add_dependency("core", None, None)?;
        r.add_dependency("db", None, None)
    }).unwrap();

    let err = c.load_addon("app", None).unwrap_err();
    assert_eq!(err.errors().len(), 2);
    for e in err.errors() {
        assert_eq!(e.context().unwrap().loader, Some(LoaderKind::DEPENDENCY));
    }
    assert_eq!(c.state("app", "default"), Some(ProfileState::LoadedE));
    c.unload_addon("app", None).unwrap();

    c.install_addon("db", |r| r.create_profile("default").map(|_| ())).unwrap();
    c.load_addon("core", None).unwrap();
    c.load_addon("db", None).unwrap();
    c.load_addon("app", None).unwrap();
    assert_eq!(c.state("app", "default"), Some(ProfileState::Loaded));
}

#[test]
fn test_profiles_of_one_addon_are_exclusive() {
    let mut c = Container::default();
    c.install_addon("net", |r| {
        r.create_profile("home")?;
        r.create_profile("work").map(|_| ())
    }).unwrap();
    c.load_addon("net", Some("home")).unwrap();
    let err = c.load_addon("net", Some("work")).unwrap_err();
    assert!(matches!(err, ShellError::LoadFailure { .. }));
    assert_eq!(c.state("net", "work"), None);

    c.unload_addon("net", None).unwrap();
    c.load_addon("net", Some("work")).unwrap();
    assert_eq!(c.addon("net").unwrap().last_used().as_deref(), Some("work"));
    c.unload_all().unwrap();
    assert!(!c.is_loaded("net"));
}
