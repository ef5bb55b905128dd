//! Non-binding suggestions.

use tracing::warn;

use super::{DepList, Scope};
use crate::dep_spec::{DepSpec, PackageSpec};
use crate::environment::{KeywordOverrides, QueryKind};
use crate::error::{Result, ResultExt};

impl DepList<'_> {
    /// Record `Suggested` entries for the atoms of `spec`. Nothing here
    /// fails because a suggestion cannot be satisfied.
    pub(super) fn show_suggestions(&mut self, spec: &DepSpec, scope: Scope<'_>) -> Result<()> {
        match spec {
            DepSpec::Atom(atom) => self
                .suggest_atom(atom, scope)
                .context(|| format!("When adding suggested dep '{atom}'")),
            DepSpec::AllOf(children) | DepSpec::AnyOf(children) => {
                for child in children {
                    self.show_suggestions(child, scope)?;
                }
                Ok(())
            }
            DepSpec::Conditional {
                flag,
                inverse,
                children,
            } => {
                if self.condition_met(flag, *inverse) {
                    for child in children {
                        self.show_suggestions(child, scope)?;
                    }
                }
                Ok(())
            }
            DepSpec::Block(_) => Ok(()),
        }
    }

    fn suggest_atom(&mut self, atom: &PackageSpec, scope: Scope<'_>) -> Result<()> {
        let consumer = self.current_package();
        let matches = self
            .env
            .query(atom, QueryKind::InstallableOnly, consumer.as_ref());
        if matches.is_empty() {
            warn!(spec = %atom, "nothing found for suggestion");
            return Ok(());
        }

        let visible = matches
            .iter()
            .find(|p| self.env.mask_reasons(p, KeywordOverrides::default()).is_empty());
        match visible {
            Some(pkg) => self.add_suggested_package(pkg, scope.destinations),
            None => {
                warn!(spec = %atom, "nothing visible found for suggestion");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use portage_atom::Cpv;

    use crate::dep_spec::{DepSpec, DepTag};
    use crate::environment::{InMemoryEnvironment, MaskReason};
    use crate::merge_list::EntryKind;
    use crate::options::{Options, SuggestedOption};
    use crate::package::{PackageDeps, PackageMetadata};
    use crate::DepList;

    fn meta(cpv: &str) -> PackageMetadata {
        PackageMetadata::new(Cpv::parse(cpv).unwrap(), "repo")
    }

    fn app_suggesting(suggested: &str) -> PackageMetadata {
        meta("cat/app-1").with_dependencies(PackageDeps {
            suggested: DepSpec::parse(suggested).unwrap(),
            ..Default::default()
        })
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
    fn suggestions_follow_their_consumer() {
        let mut env = InMemoryEnvironment::new();
        env.add_installable(app_suggesting("cat/extra !cat/nothing cat/missing"));
        env.add_installable(meta("cat/extra-1"));
        env.add_installable(meta("cat/extra-2"));

        let mut list = DepList::new(&env, Options::default());
        list.add(&DepSpec::parse("cat/app").unwrap(), &dest()).unwrap();
        assert_eq!(planned(&list), ["cat/app-1 package", "cat/extra-1 suggested"]);

        let extra = list.iter().nth(1).unwrap();
        assert_eq!(extra.destinations(), ["installed"]);
        assert!(matches!(
            extra.tags().next(),
            Some(DepTag::Dependency { package }) if package.cpv.to_string() == "cat/app-1"
        ));
        assert!(!list.has_errors());
    }

    #[test]
    fn masked_suggestions_are_skipped() {
        let mut env = InMemoryEnvironment::new();
        env.add_installable(app_suggesting("cat/extra"));
        let masked = env.add_installable(meta("cat/extra-1"));
        env.mask(&masked, MaskReason::UserMask);

        let mut list = DepList::new(&env, Options::default());
        list.add(&DepSpec::parse("cat/app").unwrap(), &dest()).unwrap();
        assert_eq!(planned(&list), ["cat/app-1 package"]);
    }

    #[test]
    fn discard_ignores_and_install_resolves() {
        let mut env = InMemoryEnvironment::new();
        env.add_installable(app_suggesting("cat/extra"));
        env.add_installable(meta("cat/extra-1"));

        let options = Options {
            suggested: SuggestedOption::Discard,
            ..Options::default()
        };
        let mut list = DepList::new(&env, options);
        list.add(&DepSpec::parse("cat/app").unwrap(), &dest()).unwrap();
        assert_eq!(planned(&list), ["cat/app-1 package"]);

        list.options_mut().suggested = SuggestedOption::Install;
        list.clear();
        list.add(&DepSpec::parse("cat/app").unwrap(), &dest()).unwrap();
        assert_eq!(planned(&list), ["cat/app-1 package", "cat/extra-1 package"]);
        assert!(list.iter().all(|e| e.kind() != EntryKind::Suggested));
    }
}
