// addon-shell/src/loader/root.rs

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use crate::{
    container::Container,
    error::{FailureContext, Phase, ShellError, ShellResult},
    loader::InternalLoader,
    profile::{ProfileState, RootProfile},
};

/// Drives one root profile through a load or unload cycle: state machine,
/// mutual exclusion with sibling profiles, then the scheduler.
pub struct RootLoader;

impl RootLoader {
    pub fn load(root: &Mutex<RootProfile>, siblings: &[Arc<Mutex<RootProfile>>], container: &mut Container) -> ShellResult<()> {
        let (addon, name) = {
            let r = root.lock();
            (r.addon.clone(), r.name.clone())
        };
        let fctx = FailureContext::new(addon.as_str(), name.as_str(), None);
        for sibling in siblings {
            let s = sibling.lock();
            if s.name != name && !s.is_idle() {
                let state = s.state.map(|st| st.to_string()).unwrap_or_default();
                return Err(ShellError::failure(Phase::Load, fctx, format!("profile '{}' of {addon} is {state}, unload it first", s.name)));
            }
        }

        let mut r = root.lock();
        r.set_state(ProfileState::Loading)
            .map_err(|e| ShellError::failure_caused_by(Phase::Load, fctx.clone(), "profile cannot be loaded now", e))?;
        r.mailbox.flush();
        info!(addon = %addon, profile = %name, "loading");
        let loaders = container.loaders().clone();
        let result = InternalLoader::run(Phase::Load, &mut r, &loaders, Some(container));
        let state = if result.is_ok() { ProfileState::Loaded } else { ProfileState::LoadedE };
        r.set_state(state)?;
        info!(addon = %addon, profile = %name, %state, "load finished");
        result
    }

    pub fn unload(root: &Mutex<RootProfile>, container: &mut Container) -> ShellResult<()> {
        let mut r = root.lock();
        let fctx = FailureContext::new(r.addon.as_str(), r.name.as_str(), None);
        r.set_state(ProfileState::Unloading)
            .map_err(|e| ShellError::failure_caused_by(Phase::Unload, fctx.clone(), "profile cannot be unloaded now", e))?;
        info!(addon = %fctx.addon, profile = %fctx.profile, "unloading");
        let loaders = container.loaders().clone();
        let result = InternalLoader::run(Phase::Unload, &mut r, &loaders, Some(container));
        let state = if result.is_ok() { ProfileState::Unloaded } else { ProfileState::UnloadedE };
        r.set_state(state)?;
        info!(addon = %fctx.addon, profile = %fctx.profile, %state, "unload finished");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(name: &str) -> Arc<Mutex<RootProfile>> { Arc::new(Mutex::new(RootProfile::new("net", name))) }

    #[test]
    fn test_load_unload_cycle_without_loaders() {
        let mut c = Container::default();
        let r = root("default");
        RootLoader::load(&r, &[r.clone()], &mut c).unwrap();
        assert_eq!(r.lock().state(), Some(ProfileState::Loaded));
        RootLoader::unload(&r, &mut c).unwrap();
        assert_eq!(r.lock().state(), Some(ProfileState::Unloaded));
    }

    #[test]
    fn test_second_load_refused_without_side_effects() {
        let mut c = Container::default();
        let r = root("default");
        RootLoader::load(&r, &[], &mut c).unwrap();
        let before = r.lock().changed_at();
        let err = RootLoader::load(&r, &[], &mut c).unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Load));
        assert!(matches!(err.cause(), Some(ShellError::IllegalStateTransition { .. })));
        assert_eq!(r.lock().state(), Some(ProfileState::Loaded));
        assert_eq!(r.lock().changed_at(), before);
    }

    #[test]
    fn test_unload_before_load_refused() {
        let mut c = Container::default();
        let r = root("default");
        let err = RootLoader::unload(&r, &mut c).unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Unload));
        assert_eq!(r.lock().state(), None);
    }

    #[test]
    fn test_sibling_profiles_are_exclusive() {
        let mut c = Container::default();
        let (a, b) = (root("a"), root("b"));
        let all = [a.clone(), b.clone()];
        RootLoader::load(&a, &all, &mut c).unwrap();
        let err = RootLoader::load(&b, &all, &mut c).unwrap_err();
        assert!(err.to_string().contains("profile 'a' of net is LOADED"), "got: {err}");
        assert_eq!(b.lock().state(), None);
        RootLoader::unload(&a, &mut c).unwrap();
        RootLoader::load(&b, &all, &mut c).unwrap();
    }
}
