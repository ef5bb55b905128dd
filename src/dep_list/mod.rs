//! The DepList engine.
//!
//! [`DepList`] owns a [`MergeList`] and turns dependency specifications into
//! an ordered, validated plan. Every [`add`](DepList::add) runs in its own
//! transaction: if anything fails, the merge list is left exactly as it was.
//!
//! The work is split by visitor:
//!
//! - [`add`] resolves atoms and records packages with their dependencies
//! - [`any_of`] picks an alternative of a `|| ( )` group
//! - [`block`] checks blockers
//! - [`query`] answers "would this already be satisfied?"
//! - [`suggest`] records non-binding suggestions

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::dep_spec::{DepSpec, DepTag, PackageSpec};
use crate::environment::Environment;
use crate::error::{DepListError, Error, Result, ResultExt};
use crate::merge_list::{
    EntryId, EntryKind, EntryState, InsertPosition, MergeList, ResolutionEntry,
};
use crate::options::{Options, UseOption};
use crate::package::{PackageId, PackageMetadata};
use crate::version_match::package_matches;

mod add;
mod any_of;
mod block;
mod query;
mod suggest;

/// Per-call resolution parameters threaded through the visitors.
///
/// OR-group trials and post-dependency retries hand a modified copy down
/// instead of touching the engine's configured [`Options`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scope<'a> {
    pub(crate) opts: Options,
    pub(crate) destinations: &'a [String],
}

/// Ordered dependency resolver.
///
/// ```
/// use portage_atom::Cpv;
/// use portage_atom_deplist::{DepList, DepSpec, InMemoryEnvironment, Options, PackageMetadata};
///
/// let mut env = InMemoryEnvironment::new();
/// env.add_installable(PackageMetadata::new(Cpv::parse("app-misc/foo-1").unwrap(), "gentoo"));
///
/// let mut list = DepList::new(&env, Options::default());
/// list.add(&DepSpec::parse("app-misc/foo").unwrap(), &["installed".to_string()])
///     .unwrap();
/// assert_eq!(list.len(), 1);
/// ```
pub struct DepList<'e> {
    env: &'e dyn Environment,
    options: Options,
    merge_list: MergeList,
    /// Entry whose dependencies are being added.
    current: Option<EntryId>,
    /// Where the next entry goes.
    insert_position: InsertPosition,
    top_level_target: Option<DepSpec>,
    /// Reference time for SCM reinstall windows.
    now: DateTime<Utc>,
}

impl<'e> DepList<'e> {
    pub fn new(env: &'e dyn Environment, options: Options) -> Self {
        Self {
            env,
            options,
            merge_list: MergeList::new(),
            current: None,
            insert_position: InsertPosition::End,
            top_level_target: None,
            now: Utc::now(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    /// Drop every entry, keeping the options.
    pub fn clear(&mut self) {
        self.merge_list.clear();
        self.current = None;
        self.insert_position = InsertPosition::End;
        self.top_level_target = None;
    }

    /// Resolve `spec` and merge the result into the plan.
    ///
    /// New packages are assigned the first of `destinations` that accepts
    /// them. On error nothing is changed.
    pub fn add(&mut self, spec: &DepSpec, destinations: &[String]) -> Result<()> {
        let scope = Scope {
            opts: self.options,
            destinations,
        };
        self.add_scoped(spec, scope)
    }

    /// Whether `spec` would already be satisfied by installed packages and
    /// the current plan.
    pub fn already_installed(&self, spec: &DepSpec) -> Result<bool> {
        self.query_satisfied(spec)
    }

    /// True if any entry is a block or a force-unmasked package.
    pub fn has_errors(&self) -> bool {
        self.merge_list.iter().any(|e| e.kind().is_error())
    }

    /// Entries in build order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolutionEntry> {
        self.merge_list.iter()
    }

    pub fn len(&self) -> usize {
        self.merge_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merge_list.is_empty()
    }

    pub fn merge_list(&self) -> &MergeList {
        &self.merge_list
    }

    /// Whether `pkg` matches an atom of the top-level target being added.
    pub(crate) fn is_top_level_target(&self, pkg: &PackageId) -> Result<bool> {
        let Some(target) = &self.top_level_target else {
            return Err(Error::Internal(
                "is_top_level_target called with no top level target".into(),
            ));
        };
        let meta = self.metadata(pkg)?;
        Ok(target.any_atom(&mut |spec| {
            package_matches(self.env, spec, pkg, &meta, None)
        }))
    }

    /// One transaction: visit `spec`, then commit or roll back.
    pub(crate) fn add_scoped(&mut self, spec: &DepSpec, scope: Scope<'_>) -> Result<()> {
        let tx = self.merge_list.begin_transaction();
        let outermost = self.top_level_target.is_none();
        if outermost {
            self.top_level_target = Some(spec.clone());
        }

        let result = self.visit_add(spec, scope);

        if outermost {
            self.top_level_target = None;
        }
        match result {
            Ok(()) => {
                tx.commit();
                Ok(())
            }
            Err(err) => {
                self.merge_list.rollback(tx);
                Err(err)
            }
        }
    }

    /// [`add_scoped`](Self::add_scoped) with a context frame naming `role`.
    pub(crate) fn add_in_role(
        &mut self,
        spec: &DepSpec,
        role: &str,
        scope: Scope<'_>,
    ) -> Result<()> {
        self.add_scoped(spec, scope)
            .context(|| format!("When adding {role}"))
    }

    fn visit_add(&mut self, spec: &DepSpec, scope: Scope<'_>) -> Result<()> {
        match spec {
            DepSpec::Atom(atom) => self.add_package_spec(atom, scope),
            DepSpec::AllOf(children) => {
                for child in children {
                    self.visit_add(child, scope)?;
                }
                Ok(())
            }
            DepSpec::Conditional {
                flag,
                inverse,
                children,
            } => {
                if self.condition_taken(flag, *inverse, scope.opts) {
                    for child in children {
                        self.visit_add(child, scope)?;
                    }
                }
                Ok(())
            }
            DepSpec::AnyOf(children) => self.add_any_of(children, scope),
            DepSpec::Block(blocked) => self.add_block(blocked, scope),
        }
    }

    pub(crate) fn current_package(&self) -> Option<PackageId> {
        self.current
            .map(|id| self.merge_list.entry(id).package().clone())
    }

    pub(crate) fn metadata(&self, pkg: &PackageId) -> Result<Arc<PackageMetadata>> {
        self.env
            .metadata(pkg)
            .ok_or_else(|| Error::Internal(format!("no metadata for '{pkg}'")))
    }

    /// Plain flag evaluation against the consuming package.
    pub(crate) fn condition_met(&self, flag: &str, inverse: bool) -> bool {
        let consumer = self.current_package();
        self.env.query_use(flag, consumer.as_ref()) ^ inverse
    }

    /// Flag evaluation honouring [`UseOption::TakeAll`].
    pub(crate) fn condition_taken(&self, flag: &str, inverse: bool, opts: Options) -> bool {
        match opts.use_option {
            UseOption::Standard => self.condition_met(flag, inverse),
            UseOption::TakeAll => {
                let consumer = self.current_package();
                if consumer.is_none() {
                    return true;
                }
                if inverse {
                    !self.env.query_use_force(flag, consumer.as_ref())
                } else {
                    !self.env.query_use_mask(flag, consumer.as_ref())
                }
            }
        }
    }

    /// First entry keyed under the atom's name that it matches.
    pub(crate) fn find_matching_entry(
        &self,
        spec: &PackageSpec,
        consumer: Option<&PackageId>,
    ) -> Option<EntryId> {
        self.merge_list.equal_range(spec.cpn()).find(|&id| {
            self.entry_matches(id, spec, consumer)
        })
    }

    pub(crate) fn entry_matches(
        &self,
        id: EntryId,
        spec: &PackageSpec,
        consumer: Option<&PackageId>,
    ) -> bool {
        let entry = self.merge_list.entry(id);
        entry.kind().satisfies_atoms()
            && package_matches(self.env, spec, entry.package(), entry.metadata(), consumer)
    }

    /// Attach the spec's tag and, when enabled, a tag naming the consumer.
    pub(crate) fn tag_entry(&mut self, id: EntryId, tag: Option<&DepTag>, opts: Options) {
        if let Some(tag) = tag {
            self.merge_list.add_tag(id, tag.clone());
        }
        if opts.dependency_tags {
            if let Some(package) = self.current_package() {
                self.merge_list.add_tag(id, DepTag::Dependency { package });
            }
        }
    }

    pub(crate) fn find_destination(
        &self,
        pkg: &PackageId,
        destinations: &[String],
    ) -> Result<String> {
        destinations
            .iter()
            .find(|d| self.env.is_suitable_destination(d, pkg))
            .cloned()
            .ok_or_else(|| {
                DepListError::NoDestination {
                    package: pkg.to_string(),
                    destinations: destinations.join(", "),
                }
                .into()
            })
    }

    /// Record a block or masked marker at the front of the list.
    pub(crate) fn add_error_package(&mut self, pkg: &PackageId, kind: EntryKind) -> Result<()> {
        let consumer = self.current_package();
        let existing = self.merge_list.equal_range(pkg.cpn()).find(|&id| {
            let e = self.merge_list.entry(id);
            e.kind() == kind && e.package() == pkg
        });
        if let Some(id) = existing {
            if let Some(package) = consumer {
                self.merge_list.add_tag(id, DepTag::Dependency { package });
            }
            return Ok(());
        }

        let mut entry = ResolutionEntry::new(self.metadata(pkg)?, kind, EntryState::AllDepsProcessed);
        entry.associated = self.current;
        let id = self.merge_list.insert(InsertPosition::Front, entry);
        if let Some(package) = consumer {
            self.merge_list.add_tag(id, DepTag::Dependency { package });
        }
        Ok(())
    }

    /// Record a suggestion at the insert position unless already planned.
    pub(crate) fn add_suggested_package(
        &mut self,
        pkg: &PackageId,
        destinations: &[String],
    ) -> Result<()> {
        let planned = self.merge_list.equal_range(pkg.cpn()).any(|id| {
            let e = self.merge_list.entry(id);
            e.package() == pkg
                && matches!(
                    e.kind(),
                    EntryKind::Suggested
                        | EntryKind::AlreadyInstalled
                        | EntryKind::Package
                        | EntryKind::Provided
                        | EntryKind::Subpackage
                )
        });
        if planned {
            return Ok(());
        }

        let mut entry = ResolutionEntry::new(
            self.metadata(pkg)?,
            EntryKind::Suggested,
            EntryState::AllDepsProcessed,
        );
        entry.destinations.push(self.find_destination(pkg, destinations)?);
        entry.associated = self.current;
        let consumer = self.current_package();
        let id = self.merge_list.insert(self.insert_position, entry);
        if let Some(package) = consumer {
            self.merge_list.add_tag(id, DepTag::Dependency { package });
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a DepList<'_> {
    type Item = &'a ResolutionEntry;
    type IntoIter = Box<dyn Iterator<Item = &'a ResolutionEntry> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.merge_list.iter())
    }
}
