// addon-shell/src/loader/internal.rs

use tracing::{debug, warn};

use crate::{
    container::Container,
    error::{FailureContext, Phase, ShellError, ShellResult},
    loader::{LoaderContext, LoaderKind, LoaderSet},
    profile::RootProfile,
};

/// Runs every loader bound to one root profile, in priority order, and
/// aggregates their failures.
pub struct InternalLoader;

impl InternalLoader {
    /// Kinds bound to `root`, ordered by `(priority, binding sequence)`.
    pub fn schedule(root: &RootProfile, phase: Phase) -> Vec<LoaderKind> {
        let mut order: Vec<(f64, u64, &LoaderKind)> = root.children.iter()
            .map(|(k, c)| (c.priority(phase), c.sequence(), k))
            .collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        order.into_iter().map(|(_, _, k)| k.clone()).collect()
    }

    pub fn run(phase: Phase, root: &mut RootProfile, loaders: &LoaderSet, mut container: Option<&mut Container>) -> ShellResult<()> {
        let mut errors = vec![];
        for kind in Self::schedule(root, phase) {
            let Some(child) = root.children.get_mut(&kind) else { continue };
            let fctx = FailureContext::new(root.addon.as_str(), root.name.as_str(), Some(kind.clone()));
            let result = match loaders.get(&kind) {
                None => Err(ShellError::failure(phase, fctx.clone(), format!("no {kind} loader is registered"))),
                Some(loader) => {
                    debug!(addon = %root.addon, profile = %root.name, loader = %kind, %phase, priority = child.priority(phase), "running loader");
                    let mut ctx = LoaderContext {
                        addon: &root.addon,
                        profile_name: &root.name,
                        kind: &kind,
                        profile: &mut *child,
                        mailbox: &mut root.mailbox,
                    };
                    loader.run(phase, &mut ctx, container.as_deref_mut())
                }
            };
            match result {
                Ok(()) => child.last_failure = None,
                Err(e) => {
                    let wrapped = wrap(phase, &fctx, e);
                    for w in &wrapped { warn!(context = %fctx, error = %w, "loader failed"); }
                    let recorded = match wrapped.as_slice() {
                        [one] => one.clone(),
                        _ => ShellError::Aggregated(wrapped.clone()),
                    };
                    child.record_failure(phase, recorded);
                    errors.extend(wrapped);
                }
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(ShellError::Aggregated(errors)) }
    }
}

/// Give every failure a phase and a context. Nested aggregates are flattened.
fn wrap(phase: Phase, fctx: &FailureContext, error: ShellError) -> Vec<ShellError> {
    match error {
        ShellError::Aggregated(inner) => inner.into_iter().flat_map(|e| wrap(phase, fctx, e)).collect(),
        e if e.phase() == Some(phase) => vec![e],
        e => vec![ShellError::failure_caused_by(phase, fctx.clone(), format!("{phase} raised an error"), e)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{loader::Loader, profile::ProfileData};
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Probe {
        kind: LoaderKind,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Probe {
        fn record(&self, phase: &str) -> ShellResult<()> {
            self.log.lock().push(format!("{phase}:{}", self.kind));
            if self.fail { Err(ShellError::invalid(format!("{} broke", self.kind))) } else { Ok(()) }
        }
    }

    impl Loader for Probe {
        fn kind(&self) -> LoaderKind { self.kind.clone() }
        fn load(&self, _: &mut LoaderContext<'_>, _: Option<&mut Container>) -> ShellResult<()> { self.record("load") }
        fn unload(&self, _: &mut LoaderContext<'_>, _: Option<&mut Container>) -> ShellResult<()> { self.record("unload") }
    }

    fn setup(fail: &[&str]) -> (RootProfile, LoaderSet, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(vec![]));
        let mut set = LoaderSet::empty();
        let mut root = RootProfile::new("addon", "default");
        for name in ["a", "b"] {
            let kind = LoaderKind::custom(name);
            set.register(Arc::new(Probe { kind: kind.clone(), log: log.clone(), fail: fail.contains(&name) }));
            root.bind(kind, ProfileData::Empty).unwrap();
        }
        (root, set, log)
    }

    #[test]
    fn test_priority_order_per_phase() {
        let (mut root, set, log) = setup(&[]);
        let a = root.loader_mut(&LoaderKind::custom("a")).unwrap();
        a.load_priority = 1.0;
        a.unload_priority = 10.0;
        let b = root.loader_mut(&LoaderKind::custom("b")).unwrap();
        b.load_priority = 5.0;
        b.unload_priority = 2.0;
        InternalLoader::run(Phase::Load, &mut root, &set, None).unwrap();
        InternalLoader::run(Phase::Unload, &mut root, &set, None).unwrap();
        assert_eq!(*log.lock(), vec!["load:a", "load:b", "unload:b", "unload:a"]);
    }

    #[test]
    fn test_equal_priority_keeps_binding_order() {
        let (root, _, _) = setup(&[]);
        assert_eq!(InternalLoader::schedule(&root, Phase::Load), vec![LoaderKind::custom("a"), LoaderKind::custom("b")]);
    }

    #[test]
    fn test_failures_aggregate_and_pass_continues() {
        let (mut root, set, log) = setup(&["a", "b"]);
        let err = InternalLoader::run(Phase::Load, &mut root, &set, None).unwrap_err();
        assert_eq!(err.errors().len(), 2);
        assert_eq!(log.lock().len(), 2);
        for e in err.errors() {
            assert_eq!(e.phase(), Some(Phase::Load));
            assert!(matches!(e.cause(), Some(ShellError::InvalidArgument(_))));
        }
        for kind in ["a", "b"] {
            let failure = root.loader(&LoaderKind::custom(kind)).unwrap().last_failure.as_ref().unwrap();
            assert_eq!(failure.phase, Phase::Load);
            assert_eq!(failure.error.context().unwrap().loader, Some(LoaderKind::custom(kind)));
        }
    }

    #[test]
    fn test_single_failure_still_aggregated() {
        let (mut root, set, _) = setup(&["b"]);
        let err = InternalLoader::run(Phase::Unload, &mut root, &set, None).unwrap_err();
        assert!(matches!(err, ShellError::Aggregated(ref v) if v.len() == 1));
        assert!(root.loader(&LoaderKind::custom("a")).unwrap().last_failure.is_none());
    }

    #[test]
    fn test_missing_implementation_is_a_failure() {
        let (mut root, set, log) = setup(&[]);
        root.bind(LoaderKind::custom("ghost"), ProfileData::Empty).unwrap();
        let err = InternalLoader::run(Phase::Load, &mut root, &set, None).unwrap_err();
        assert_eq!(err.errors().len(), 1);
        assert!(err.to_string().contains("no ghost loader"), "got: {err}");
        assert_eq!(log.lock().len(), 2);
    }
}
