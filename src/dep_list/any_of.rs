//! Choosing an alternative of a `|| ( )` group.
//!
//! Alternatives are tried in this order, stopping at the first that works:
//!
//! 1. one that is already satisfied, re-added so upgrades kick in
//! 2. a plain atom for a package with some version installed
//! 3. every viable alternative in declaration order
//!
//! Steps 2 and 3 run as trials: blockers are fatal and mask overrides are
//! off. If nothing resolves, the first alternative is added normally so
//! that its error is what the caller sees.

use std::borrow::Cow;

use tracing::debug;

use super::{DepList, Scope};
use crate::dep_spec::DepSpec;
use crate::environment::QueryKind;
use crate::error::{Result, ResultExt};
use crate::range_rewriter::rewrite_ranges;

impl DepList<'_> {
    /// Alternatives that are not switched off by a conditional, with ranges
    /// over one package merged.
    pub(super) fn viable_children<'s>(&self, children: &'s [DepSpec]) -> Vec<Cow<'s, DepSpec>> {
        let viable: Vec<Cow<'s, DepSpec>> = children
            .iter()
            .filter(|child| match child {
                DepSpec::Conditional { flag, inverse, .. } => self.condition_met(flag, *inverse),
                _ => true,
            })
            .map(Cow::Borrowed)
            .collect();

        match rewrite_ranges(viable.iter().map(|c| &**c)) {
            Some(merged) => vec![Cow::Owned(DepSpec::Atom(merged))],
            None => viable,
        }
    }

    pub(super) fn add_any_of(&mut self, children: &[DepSpec], scope: Scope<'_>) -> Result<()> {
        let viable = self.viable_children(children);
        let Some(first) = viable.first() else {
            return Ok(());
        };

        for child in &viable {
            if self.query_satisfied(child)? {
                return self.add_scoped(child, scope);
            }
        }

        let has_installed_version: Vec<&DepSpec> = viable
            .iter()
            .map(|c| &**c)
            .filter(|c| match c {
                DepSpec::Atom(atom) => !self
                    .env
                    .query(&atom.package_only(), QueryKind::InstalledOnly, None)
                    .is_empty(),
                _ => false,
            })
            .collect();

        let trial = Scope {
            opts: scope.opts.for_any_of_trial(),
            ..scope
        };
        for child in has_installed_version
            .into_iter()
            .chain(viable.iter().map(|c| &**c))
        {
            match self.add_scoped(child, trial) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_recoverable() => {
                    debug!(alternative = %child, error = %err, "alternative did not resolve");
                }
                Err(err) => return Err(err),
            }
        }

        debug!("no resolvable item in || ( ) block, using first item for error message");
        self.add_scoped(first, scope)
            .context(|| "Inside || ( ) block with other options".to_string())
    }
}

#[cfg(test)]
mod tests {
    use portage_atom::Cpv;

    use crate::dep_spec::DepSpec;
    use crate::environment::{InMemoryEnvironment, MaskReason};
    use crate::error::DepListError;
    use crate::merge_list::EntryKind;
    use crate::options::{MaskOverride, MaskOverrides, Options};
    use crate::package::PackageMetadata;
    use crate::DepList;

    fn meta(cpv: &str) -> PackageMetadata {
        PackageMetadata::new(Cpv::parse(cpv).unwrap(), "repo")
    }

    fn spec(s: &str) -> DepSpec {
        DepSpec::parse(s).unwrap()
    }

    fn dest() -> Vec<String> {
        vec!["installed".to_string()]
    }

    fn planned(list: &DepList<'_>) -> Vec<String> {
        list.iter()
            .map(|e| format!("{} {}", e.package().cpv, e.kind()))
            .collect()
    }

    #[test]
    fn prefers_satisfied_alternative() {
        let mut env = InMemoryEnvironment::new();
        env.add_installable(meta("cat/a-1"));
        env.add_installable(meta("cat/b-1"));
        env.add_installed(meta("cat/a-1"));

        let mut list = DepList::new(&env, Options::default());
        list.add(&spec("|| ( cat/b cat/a )"), &dest()).unwrap();
        assert_eq!(planned(&list), ["cat/a-1 package"]);
    }

    #[test]
    fn prefers_package_with_installed_version() {
        let mut env = InMemoryEnvironment::new();
        env.add_installable(meta("cat/two-1"));
        env.add_installable(meta("cat/three-1"));
        env.add_installable(meta("cat/three-2"));
        env.add_installed(meta("cat/three-1"));

        let mut list = DepList::new(&env, Options::default());
        list.add(&spec("|| ( cat/two >=cat/three-2 )"), &dest())
            .unwrap();
        assert_eq!(planned(&list), ["cat/three-2 package"]);
    }

    #[test]
    fn falls_through_unresolvable_alternatives() {
        let mut env = InMemoryEnvironment::new();
        env.add_installable(meta("cat/b-1"));

        let mut list = DepList::new(&env, Options::default());
        list.add(&spec("|| ( cat/missing cat/b )"), &dest()).unwrap();
        assert_eq!(planned(&list), ["cat/b-1 package"]);
    }

    #[test]
    fn reports_first_alternative_when_nothing_resolves() {
        let env = InMemoryEnvironment::new();
        let mut list = DepList::new(&env, Options::default());
        let err = list
            .add(&spec("|| ( cat/x cat/y )"), &dest())
            .unwrap_err();
        assert_eq!(
            err.dep_list_error(),
            Some(&DepListError::AllMasked {
                query: "cat/x".into()
            })
        );
        assert_eq!(err.context()[0], "Inside || ( ) block with other options");
        assert!(list.is_empty());
    }

    #[test]
    fn disabled_conditionals_are_not_viable() {
        let mut env = InMemoryEnvironment::new();
        env.add_installable(meta("cat/a-1"));
        env.add_installable(meta("cat/b-1"));

        let mut list = DepList::new(&env, Options::default());
        list.add(&spec("|| ( gtk? ( cat/a ) cat/b )"), &dest())
            .unwrap();
        assert_eq!(planned(&list), ["cat/b-1 package"]);

        list.clear();
        list.add(&spec("|| ( gtk? ( cat/a ) )"), &dest()).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn version_ranges_pick_best_version() {
        let mut env = InMemoryEnvironment::new();
        for v in ["1.2", "1.5", "2.0", "3.1"] {
            env.add_installable(meta(&format!("cat/a-{v}")));
        }

        let mut list = DepList::new(&env, Options::default());
        list.add(&spec("|| ( =cat/a-1* =cat/a-2* )"), &dest())
            .unwrap();
        assert_eq!(planned(&list), ["cat/a-2.0 package"]);
    }

    #[test]
    fn trials_do_not_override_masks() {
        let mut env = InMemoryEnvironment::new();
        let masked = env.add_installable(meta("cat/a-1"));
        env.mask(&masked, MaskReason::RepositoryMask);
        env.add_installable(meta("cat/b-1"));

        let options = Options {
            override_masks: MaskOverrides::empty().with(MaskOverride::RepositoryMasks),
            ..Options::default()
        };
        let mut list = DepList::new(&env, options);
        list.add(&spec("|| ( cat/a cat/b )"), &dest()).unwrap();
        assert_eq!(planned(&list), ["cat/b-1 package"]);
        assert!(!list.iter().any(|e| e.kind() == EntryKind::Masked));
    }

    #[test]
    fn trials_treat_blockers_as_fatal() {
        let mut env = InMemoryEnvironment::new();
        env.add_installed(meta("cat/old-1"));
        let blocker = meta("cat/a-1").with_dependencies(crate::package::PackageDeps {
            build: spec("!cat/old"),
            ..Default::default()
        });
        env.add_installable(blocker);
        env.add_installable(meta("cat/b-1"));

        let mut list = DepList::new(&env, Options::default());
        list.add(&spec("|| ( cat/a cat/b )"), &dest()).unwrap();
        assert_eq!(planned(&list), ["cat/b-1 package"]);
        assert!(!list.has_errors());
    }
}
