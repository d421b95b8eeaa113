// addon-shell/src/loader/parameter.rs

//! Loader for addon-registered parameters. Load inserts frozen global copies
//! into the matching manager; unload removes them and describes what the user
//! changed in the meantime as replay instructions.

use tracing::debug;

use crate::{
    container::Container,
    error::{Phase, ShellError, ShellResult},
    loader::{Loader, LoaderContext, LoaderKind},
    parameter::{Parameter, ParameterKind},
    profile::{LoaderResult, ProfileData, ResultKind},
    script::{Instruction, ScriptFragment},
    value::ParamValue,
};

pub struct ParameterLoader {
    kind: ParameterKind,
}

impl ParameterLoader {
    pub fn new(kind: ParameterKind) -> Self { Self { kind } }
    pub fn parameter_kind(&self) -> ParameterKind { self.kind }
}

/// Minimal instructions turning `a` into `b`.
///
/// Scalars on either side give a plain `set`. For two lists the common prefix
/// is kept; the rest of `a` is subtracted and the rest of `b` added, unless
/// that touches more elements than `b` holds, in which case `set` is shorter.
pub fn diff_values(name: &str, a: &ParamValue, b: &ParamValue) -> Vec<Instruction> {
    let (Some(a), Some(b)) = (a.as_list(), b.as_list()) else {
        return vec![Instruction::Set { name: name.to_string(), value: b.clone() }];
    };
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let remove = a.len() - prefix;
    let add = b.len() - prefix;
    if remove + add > b.len() {
        return vec![Instruction::Set { name: name.to_string(), value: ParamValue::List(b.to_vec()) }];
    }
    let mut out = vec![];
    if remove > 0 { out.push(Instruction::Subtract { name: name.to_string(), values: a[prefix..].to_vec() }); }
    if add > 0 { out.push(Instruction::Add { name: name.to_string(), values: b[prefix..].to_vec() }); }
    out
}

/// `properties set` lines for every property that differs from its default.
pub fn property_instructions(name: &str, parameter: &Parameter) -> Vec<Instruction> {
    parameter.non_default_properties().into_iter()
        .map(|(property, value)| Instruction::SetProperty { name: name.to_string(), property, value })
        .collect()
}

fn recreate(name: &str, original: &Parameter) -> Vec<Instruction> {
    let mut out = vec![Instruction::Create {
        name: name.to_string(),
        value: original.value().clone(),
        local: !original.is_global(),
        checker: original.settings().checker().type_name().to_string(),
    }];
    out.extend(property_instructions(name, original));
    out
}

impl Loader for ParameterLoader {
    fn kind(&self) -> LoaderKind {
        self.kind.loader_kind().unwrap_or_else(|| LoaderKind::custom(self.kind.manager_name()))
    }

    fn load(&self, ctx: &mut LoaderContext<'_>, container: Option<&mut Container>) -> ShellResult<()> {
        let fctx = ctx.failure_context();
        let Some(container) = container else {
            return Err(ShellError::failure(Phase::Load, fctx, format!("no container holds a {} manager", self.kind)));
        };
        let ProfileData::Parameters { declared, loaded, .. } = &mut ctx.profile.data else { return Ok(()) };
        let manager = container.manager_mut(self.kind);
        let mut errors = vec![];
        for (name, parameter) in declared.iter() {
            match manager.insert_owned(name, parameter.clone(), ctx.addon) {
                Ok(()) if loaded.contains(name) => {}
                Ok(()) => loaded.push(name.clone()),
                Err(e) => errors.push(ShellError::failure_caused_by(
                    Phase::Load, fctx.clone(), format!("cannot register {} '{name}'", self.kind), e,
                )),
            }
        }
        ShellError::collect(errors)
    }

    fn unload(&self, ctx: &mut LoaderContext<'_>, container: Option<&mut Container>) -> ShellResult<()> {
        let fctx = ctx.failure_context();
        let Some(container) = container else {
            return Err(ShellError::failure(Phase::Unload, fctx, format!("no container holds a {} manager", self.kind)));
        };
        let ProfileData::Parameters { declared, loaded, .. } = &mut ctx.profile.data else { return Ok(()) };
        let manager = container.manager_mut(self.kind);
        let mut fragment = ScriptFragment::for_manager(self.kind);
        let mut errors = vec![];
        let mut kept = vec![];
        for name in std::mem::take(loaded) {
            let Some((_, original)) = declared.iter().find(|(n, _)| *n == name) else { continue };
            if manager.global_entry(&name).is_none() {
                if !original.settings().is_transient() {
                    fragment.instructions.extend(recreate(&name, original));
                }
                continue;
            }
            match manager.unset_owned(&name, ctx.addon) {
                Ok(removed) => {
                    if removed.settings().is_transient() { continue; }
                    if removed.value().content_hash() != original.value().content_hash() {
                        fragment.instructions.extend(diff_values(&name, original.value(), removed.value()));
                    }
                    fragment.instructions.extend(property_instructions(&name, &removed));
                }
                Err(e) => {
                    errors.push(ShellError::failure_caused_by(
                        Phase::Unload, fctx.clone(), format!("cannot remove {} '{name}'", self.kind), e,
                    ));
                    kept.push(name);
                }
            }
        }
        *loaded = kept;
        if !fragment.instructions.is_empty() {
            debug!(addon = ctx.addon, manager = self.kind.manager_name(), lines = fragment.instructions.len(), "replay fragment");
            fragment.addons.insert(ctx.addon.to_string());
            if let Err(e) = ctx.mailbox.post(ResultKind::Fragment, self.kind(), LoaderResult::Fragment(fragment)) {
                errors.push(e);
            }
        }
        ShellError::collect(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        checker::{ArgChecker, IntegerChecker, StringChecker},
        profile::{LoaderProfile, Mailbox},
        settings::{Property, Settings},
        value::Value,
    };

    fn ints(items: &[i64]) -> ParamValue { ParamValue::List(items.iter().map(|i| Value::Int(*i)).collect()) }
    fn vals(items: &[i64]) -> Vec<Value> { items.iter().map(|i| Value::Int(*i)).collect() }

    #[test]
    fn test_diff_prefix_add_and_subtract() {
        assert_eq!(diff_values("p", &ints(&[1, 2, 3]), &ints(&[1, 2, 3, 4])), vec![Instruction::Add { name: "p".into(), values: vals(&[4]) }]);
        assert_eq!(diff_values("p", &ints(&[1, 2, 3]), &ints(&[1, 2])), vec![Instruction::Subtract { name: "p".into(), values: vals(&[3]) }]);
        assert_eq!(diff_values("p", &ints(&[1, 2, 3]), &ints(&[1, 2, 9])), vec![
            Instruction::Subtract { name: "p".into(), values: vals(&[3]) },
            Instruction::Add { name: "p".into(), values: vals(&[9]) },
        ]);
        assert!(diff_values("p", &ints(&[1]), &ints(&[1])).is_empty());
    }

    #[test]
    fn test_diff_falls_back_to_set() {
        assert_eq!(diff_values("p", &ints(&[1, 2, 3]), &ints(&[9, 2])), vec![Instruction::Set { name: "p".into(), value: ints(&[9, 2]) }]);
        let scalar = ParamValue::Scalar(Value::Int(1));
        assert_eq!(diff_values("p", &ints(&[1]), &scalar), vec![Instruction::Set { name: "p".into(), value: scalar.clone() }]);
        assert_eq!(diff_values("p", &scalar, &ints(&[1])), vec![Instruction::Set { name: "p".into(), value: ints(&[1]) }]);
    }

    #[test]
    fn test_diff_instruction_count_is_minimal() {
        let cases: &[(&[i64], &[i64])] = &[(&[], &[1]), (&[1, 2], &[1, 2, 3, 4]), (&[1, 2, 3, 4], &[1]), (&[5, 6], &[7, 8]), (&[1, 2, 3], &[1, 3])];
        for (a, b) in cases {
            let ops = diff_values("p", &ints(a), &ints(b));
            let prefix = a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();
            let (remove, add) = (a.len() - prefix, b.len() - prefix);
            if remove + add > b.len() {
                assert!(matches!(ops.as_slice(), [Instruction::Set { .. }]), "{a:?} -> {b:?}");
            } else {
                assert_eq!(ops.len(), usize::from(remove > 0) + usize::from(add > 0), "{a:?} -> {b:?}");
            }
        }
    }

    fn declared(kind: ParameterKind, entries: Vec<(&str, Parameter)>) -> LoaderProfile {
        let declared = entries.into_iter().map(|(n, p)| (n.to_string(), p)).collect();
        LoaderProfile::new("net", "default", 0, ProfileData::Parameters { kind, declared, loaded: vec![] })
    }

    fn cycle(phase: Phase, profile: &mut LoaderProfile, mailbox: &mut Mailbox, c: &mut Container) -> ShellResult<()> {
        let kind = LoaderKind::ENVIRONMENT;
        let mut ctx = LoaderContext { addon: "net", profile_name: "default", kind: &kind, profile, mailbox };
        ParameterLoader::new(ParameterKind::Environment).run(phase, &mut ctx, Some(c))
    }

    fn env_list(items: &[i64]) -> Parameter {
        Parameter::new(ParameterKind::Environment, &vals(items), Settings::global(ArgChecker::list(IntegerChecker::new()))).unwrap()
    }

    fn lines(mailbox: &Mailbox) -> Vec<String> { mailbox.fragments().flat_map(|f| f.lines()).collect() }

    #[test]
    fn test_unload_untouched_value_posts_nothing() {
        let mut c = Container::default();
        let mut p = declared(ParameterKind::Environment, vec![("path", env_list(&[1, 2]))]);
        let mut m = Mailbox::default();
        cycle(Phase::Load, &mut p, &mut m, &mut c).unwrap();
        assert_eq!(c.manager(ParameterKind::Environment).owner("path"), Some("net"));
        cycle(Phase::Unload, &mut p, &mut m, &mut c).unwrap();
        assert!(m.is_empty());
        assert!(!c.manager(ParameterKind::Environment).has("path", false, true));
    }

    #[test]
    fn test_unload_diffs_user_changes() {
        let mut c = Container::default();
        let mut p = declared(ParameterKind::Environment, vec![("path", env_list(&[1, 2]))]);
        let mut m = Mailbox::default();
        cycle(Phase::Load, &mut p, &mut m, &mut c).unwrap();
        let mgr = c.manager_mut(ParameterKind::Environment);
        mgr.add_values("path", &vals(&[3]), false, false).unwrap();
        mgr.set_property("path", Property::Removable, &Value::Bool(false), false, false).unwrap();
        mgr.set_property("path", Property::ReadOnly, &Value::Bool(true), false, false).unwrap();
        cycle(Phase::Unload, &mut p, &mut m, &mut c).unwrap();
        assert_eq!(lines(&m), vec![
            "environment add path 3",
            "environment properties set path removable False",
            "environment properties set path readOnly True",
        ]);
        assert!(m.fragments().next().unwrap().addons.contains("net"));
    }

    #[test]
    fn test_unload_recreates_lost_value() {
        let mut c = Container::default();
        let mut p = declared(ParameterKind::Environment, vec![("path", env_list(&[1, 2]))]);
        let mut m = Mailbox::default();
        cycle(Phase::Load, &mut p, &mut m, &mut c).unwrap();
        c.manager_mut(ParameterKind::Environment).unset_owned("path", "net").unwrap();
        cycle(Phase::Unload, &mut p, &mut m, &mut c).unwrap();
        assert_eq!(lines(&m), vec!["environment create path 1 2 -list True -checker integer -local_param False"]);
    }

    #[test]
    fn test_reload_over_names_left_from_a_failed_unload() {
        let mut c = Container::default();
        let mut p = declared(ParameterKind::Environment, vec![("path", env_list(&[1, 2]))]);
        let mut m = Mailbox::default();
        cycle(Phase::Load, &mut p, &mut m, &mut c).unwrap();
        c.manager_mut(ParameterKind::Environment).add_values("path", &vals(&[3]), false, false).unwrap();
        cycle(Phase::Load, &mut p, &mut m, &mut c).unwrap();
        let ProfileData::Parameters { loaded, .. } = &p.data else { panic!("wrong data") };
        assert_eq!(loaded, &vec!["path".to_string()]);
        let mgr = c.manager(ParameterKind::Environment);
        assert_eq!(mgr.owner("path"), Some("net"));
        assert_eq!(mgr.get("path", false, false).unwrap().value(), &ints(&[1, 2]));
    }

    #[test]
    fn test_transient_values_leave_no_trace() {
        let mut c = Container::default();
        let settings = Settings::global(ArgChecker::single(StringChecker::new())).transient(true);
        let param = Parameter::new(ParameterKind::Environment, &[Value::str("x")], settings).unwrap();
        let mut p = declared(ParameterKind::Environment, vec![("t", param)]);
        let mut m = Mailbox::default();
        cycle(Phase::Load, &mut p, &mut m, &mut c).unwrap();
        c.manager_mut(ParameterKind::Environment).set_values("t", &[Value::str("y")], false, false).unwrap();
        cycle(Phase::Unload, &mut p, &mut m, &mut c).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn test_load_conflicts_aggregate() {
        let mut c = Container::default();
        c.manager_mut(ParameterKind::Environment).create("a", env_list(&[0])).unwrap();
        c.manager_mut(ParameterKind::Environment).insert_owned("b", env_list(&[0]), "other").unwrap();
        let mut p = declared(ParameterKind::Environment, vec![("a", env_list(&[1])), ("b", env_list(&[1])), ("c", env_list(&[1]))]);
        let mut m = Mailbox::default();
        let err = cycle(Phase::Load, &mut p, &mut m, &mut c).unwrap_err();
        assert_eq!(err.errors().len(), 2);
        assert!(err.to_string().contains("already set by the user"), "got: {err}");
        assert!(err.to_string().contains("already set by other"), "got: {err}");
        let ProfileData::Parameters { loaded, .. } = &p.data else { panic!("wrong data") };
        assert_eq!(loaded, &vec!["c".to_string()]);
    }
}
