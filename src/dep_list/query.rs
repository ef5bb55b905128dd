//! "Is this already satisfied?" queries.
//!
//! A spec counts as satisfied when an installed package matches it and is
//! not about to be replaced in its slot, or when the merge list already
//! holds a matching entry.

use super::DepList;
use crate::dep_spec::{DepSpec, PackageSpec};
use crate::environment::QueryKind;
use crate::error::Result;

impl DepList<'_> {
    pub(super) fn query_satisfied(&self, spec: &DepSpec) -> Result<bool> {
        match spec {
            DepSpec::Atom(atom) => self.atom_satisfied(atom),
            DepSpec::AllOf(children) => self.all_satisfied(children),
            DepSpec::Conditional {
                flag,
                inverse,
                children,
            } => {
                // A disabled conditional is vacuously true so that
                // `|| ( flag? ( ... ) )` still works.
                if self.condition_met(flag, *inverse) {
                    self.all_satisfied(children)
                } else {
                    Ok(true)
                }
            }
            DepSpec::AnyOf(children) => {
                let viable = self.viable_children(children);
                if viable.is_empty() {
                    return Ok(true);
                }
                for child in &viable {
                    if self.query_satisfied(child)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            DepSpec::Block(blocked) => Ok(!self.atom_satisfied(blocked)?),
        }
    }

    fn all_satisfied(&self, children: &[DepSpec]) -> Result<bool> {
        for child in children {
            if !self.query_satisfied(child)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn atom_satisfied(&self, atom: &PackageSpec) -> Result<bool> {
        let consumer = self.current_package();
        let just_package = atom.package_only();

        for pkg in self
            .env
            .query(atom, QueryKind::InstalledOnly, consumer.as_ref())
        {
            let slot = self.metadata(&pkg)?.slot.clone();
            let replaced = self.merge_list.equal_range(atom.cpn()).any(|id| {
                self.entry_matches(id, &just_package, None)
                    && self.merge_list.entry(id).slot() == slot
            });
            if !replaced {
                return Ok(true);
            }
        }

        Ok(self.find_matching_entry(atom, consumer.as_ref()).is_some())
    }
}

#[cfg(test)]
mod tests {
    use portage_atom::Cpv;

    use crate::dep_spec::DepSpec;
    use crate::environment::InMemoryEnvironment;
    use crate::options::Options;
    use crate::package::PackageMetadata;
    use crate::DepList;

    fn meta(cpv: &str) -> PackageMetadata {
        PackageMetadata::new(Cpv::parse(cpv).unwrap(), "repo")
    }

    fn spec(s: &str) -> DepSpec {
        DepSpec::parse(s).unwrap()
    }

    #[test]
    fn installed_counts_until_replaced_in_slot() {
        let mut env = InMemoryEnvironment::new();
        env.add_installed(meta("cat/a-1"));
        env.add_installable(meta("cat/a-1"));
        env.add_installable(meta("cat/a-2"));

        let mut list = DepList::new(&env, Options::default());
        assert!(list.already_installed(&spec("cat/a")).unwrap());
        assert!(list.already_installed(&spec("=cat/a-1")).unwrap());
        assert!(!list.already_installed(&spec(">=cat/a-2")).unwrap());

        list.add(&spec("cat/a"), &["installed".into()]).unwrap();
        // cat/a-2 is now scheduled in slot 0, so the installed cat/a-1 no
        // longer satisfies `=cat/a-1`.
        assert!(!list.already_installed(&spec("=cat/a-1")).unwrap());
        assert!(list.already_installed(&spec(">=cat/a-2")).unwrap());
    }

    #[test]
    fn composite_specs() {
        let mut env = InMemoryEnvironment::new();
        env.add_installed(meta("cat/a-1"));
        let list = DepList::new(&env, Options::default());

        assert!(list.already_installed(&spec("")).unwrap());
        assert!(list.already_installed(&spec("|| ( )")).unwrap());
        assert!(list.already_installed(&spec("|| ( cat/b cat/a )")).unwrap());
        assert!(!list.already_installed(&spec("cat/a cat/b")).unwrap());
        assert!(list.already_installed(&spec("!cat/b")).unwrap());
        assert!(!list.already_installed(&spec("!cat/a")).unwrap());
        assert!(list.already_installed(&spec("ssl? ( cat/b )")).unwrap());
        assert!(list.already_installed(&spec("!ssl? ( cat/a )")).unwrap());
        assert!(!list.already_installed(&spec("!ssl? ( cat/b )")).unwrap());
    }
}
