//! Resolving a single atom into a merge list entry.

use std::collections::HashSet;

use portage_atom::Cpn;
use tracing::{debug, warn};

use super::{DepList, Scope};
use crate::dep_spec::{DepSpec, DepTag, PackageSpec};
use crate::environment::{KeywordOverrides, MaskReason, MaskReasons, QueryKind};
use crate::error::{DepListError, Result, ResultExt};
use crate::merge_list::{EntryId, EntryKind, EntryState, InsertPosition, ResolutionEntry};
use crate::options::{
    CircularOption, DepsOption, DowngradeOption, FallBackOption, MaskOverride, MaskOverrides,
    NewSlotsOption, ReinstallOption, ReinstallScmOption, SuggestedOption, TargetType,
    UpgradeOption,
};
use crate::package::{DepClass, PackageId, PackageMetadata};
use crate::version_match::{is_scm_name, is_scm_version};

const DAY_SECONDS: i64 = 24 * 60 * 60;
const WEEK_SECONDS: i64 = 7 * DAY_SECONDS;

impl DepList<'_> {
    pub(super) fn add_package_spec(&mut self, spec: &PackageSpec, scope: Scope<'_>) -> Result<()> {
        self.resolve_atom(spec, scope)
            .context(|| format!("When adding PackageDepSpec '{spec}'"))
    }

    fn resolve_atom(&mut self, spec: &PackageSpec, scope: Scope<'_>) -> Result<()> {
        let consumer = self.current_package();
        let installed = self
            .env
            .query(spec, QueryKind::InstalledOnly, consumer.as_ref());

        if let Some(id) = self.find_matching_entry(spec, consumer.as_ref()) {
            return self.revisit_entry(id, spec, !installed.is_empty(), scope);
        }

        let installable = self
            .env
            .query(spec, QueryKind::InstallableOnly, consumer.as_ref());
        let Some(best) = self.best_visible_candidate(&installable, scope)? else {
            return self.fall_back(spec, &installed, scope);
        };

        let best_meta = self.metadata(&best)?;
        let best_label = describe(&best, &best_meta);

        let mut in_same_slot = Vec::new();
        for pkg in &installed {
            if self.metadata(pkg)?.slot == best_meta.slot {
                in_same_slot.push(pkg.clone());
            }
        }

        if let Some(last) = in_same_slot.last() {
            if self.prefer_installed(last, &best, scope)? {
                debug!(installed = %last, candidate = %best_label, "taking installed package");
                return self.add_already_installed(last, spec.tag(), scope);
            }
            debug!(installed = %last, candidate = %best_label, "not taking installed package");
        } else if let Some(last) = installed.last() {
            if scope.opts.new_slots == NewSlotsOption::AsNeeded {
                if self.prefer_installed(last, &best, scope)? {
                    debug!(
                        installed = %last,
                        candidate = %best_label,
                        "taking installed package in a different slot"
                    );
                    return self.add_already_installed(last, spec.tag(), scope);
                }
                debug!(
                    installed = %last,
                    candidate = %best_label,
                    "not taking installed package in a different slot"
                );
            }
        } else {
            debug!(slot = %best_meta.slot, candidate = %best_label, "nothing installed in slot");
        }

        self.check_downgrade(spec, &best, &best_meta, &best_label, scope)?;
        self.add_package(&best, spec.tag(), scope)
    }

    /// An entry for the atom already exists: tag it and detect cycles.
    fn revisit_entry(
        &mut self,
        id: EntryId,
        spec: &PackageSpec,
        installed: bool,
        scope: Scope<'_>,
    ) -> Result<()> {
        self.tag_entry(id, spec.tag(), scope.opts);

        let entry = self.merge_list.entry(id);
        if entry.state() != EntryState::NoDepsProcessed || installed {
            return Ok(());
        }
        match scope.opts.circular {
            CircularOption::Discard => {
                warn!(
                    target: "portage_atom_deplist::qa",
                    package = %entry.package(),
                    "dropping circular dependency"
                );
                Ok(())
            }
            CircularOption::DiscardSilently => Ok(()),
            CircularOption::Error => Err(DepListError::CircularDependency {
                spec: spec.to_string(),
                package: entry.package().to_string(),
            }
            .into()),
        }
    }

    /// Highest unmasked installable version, escalating mask overrides if
    /// nothing is visible.
    fn best_visible_candidate(
        &mut self,
        installable: &[PackageId],
        scope: Scope<'_>,
    ) -> Result<Option<PackageId>> {
        let visible = installable
            .iter()
            .rev()
            .find(|p| self.env.mask_reasons(p, KeywordOverrides::default()).is_empty());
        if let Some(best) = visible {
            return Ok(Some(best.clone()));
        }

        let mut overridden = MaskOverrides::empty();
        for step in scope.opts.override_masks.iter() {
            overridden.insert(step);
            let keywords = KeywordOverrides {
                tilde: overridden.contains(MaskOverride::TildeKeywords),
                unkeyworded: overridden.contains(MaskOverride::Unkeyworded),
            };
            let ignored = ignored_mask_reasons(overridden);
            let forced = installable
                .iter()
                .rev()
                .find(|p| self.env.mask_reasons(p, keywords).without(ignored).is_empty());
            if let Some(best) = forced.cloned() {
                warn!(package = %best, mask_override = %step, "overriding masks");
                self.add_error_package(&best, EntryKind::Masked)?;
                return Ok(Some(best));
            }
        }
        Ok(None)
    }

    /// Nothing installable is visible; maybe keep what is installed.
    fn fall_back(
        &mut self,
        spec: &PackageSpec,
        installed: &[PackageId],
        scope: Scope<'_>,
    ) -> Result<()> {
        let can_fall_back = match scope.opts.fall_back {
            FallBackOption::Never => false,
            FallBackOption::AsNeeded => true,
            FallBackOption::AsNeededExceptTargets => match installed.last() {
                _ if self.current.is_none() => false,
                None => true,
                Some(last) => !self.is_top_level_target(last)?,
            },
        };

        match installed.last() {
            Some(last) if can_fall_back => {
                warn!(
                    spec = %spec,
                    installed = %last,
                    "no visible packages, falling back to installed package"
                );
                self.add_already_installed(last, spec.tag(), scope)
            }
            _ => Err(self.unavailable_error(spec).into()),
        }
    }

    fn unavailable_error(&self, spec: &PackageSpec) -> DepListError {
        let query = spec.to_string();
        if !spec.has_use_requirements() {
            return DepListError::AllMasked { query };
        }
        let relaxed = spec.without_use_requirements();
        let visible_without_use = self
            .env
            .query(&relaxed, QueryKind::Any, None)
            .iter()
            .any(|p| self.env.mask_reasons(p, KeywordOverrides::default()).is_empty());
        if visible_without_use {
            DepListError::UseRequirementsNotMet { query }
        } else {
            DepListError::AllMasked { query }
        }
    }

    fn check_downgrade(
        &self,
        spec: &PackageSpec,
        best: &PackageId,
        best_meta: &PackageMetadata,
        best_label: &str,
        scope: Scope<'_>,
    ) -> Result<()> {
        if scope.opts.downgrade == DowngradeOption::AsNeeded {
            return Ok(());
        }

        let mut newest_in_slot = None;
        for pkg in self
            .env
            .query(&spec.package_only(), QueryKind::InstalledOnly, None)
        {
            let meta = self.metadata(&pkg)?;
            if meta.slot == best_meta.slot {
                newest_in_slot = Some((pkg, meta));
            }
        }
        let Some((last, last_meta)) = newest_in_slot else {
            return Ok(());
        };
        if last.cpv.version <= best.cpv.version {
            return Ok(());
        }

        let from = describe(&last, &last_meta);
        if scope.opts.downgrade == DowngradeOption::Error {
            return Err(DepListError::DowngradeNotAllowed {
                to: best_label.to_string(),
                from,
            }
            .into());
        }
        warn!(to = %best_label, from = %from, "downgrade forced");
        Ok(())
    }

    /// Whether `installed` should satisfy a dependency instead of `candidate`.
    pub(super) fn prefer_installed(
        &self,
        installed: &PackageId,
        candidate: &PackageId,
        scope: Scope<'_>,
    ) -> Result<bool> {
        let opts = scope.opts;
        if opts.target_type == TargetType::Package
            && (self.current.is_none() || self.is_top_level_target(candidate)?)
        {
            return Ok(false);
        }

        if opts.reinstall == ReinstallOption::Always {
            return Ok(false);
        }
        if opts.upgrade == UpgradeOption::AsNeeded {
            return Ok(true);
        }

        let same_version = installed.cpv.version == candidate.cpv.version;
        if opts.reinstall_scm != ReinstallScmOption::Never
            && same_version
            && (is_scm_version(&installed.cpv.version) || is_scm_name(&installed.cpn().package))
        {
            let elapsed = self
                .env
                .installed_time(installed)
                .map(|t| (self.now - t).num_seconds());
            let stale = |limit: i64| elapsed.is_none_or(|secs| secs > limit);
            let rebuild = match opts.reinstall_scm {
                ReinstallScmOption::Always => true,
                ReinstallScmOption::Daily => stale(DAY_SECONDS),
                ReinstallScmOption::Weekly => stale(WEEK_SECONDS),
                ReinstallScmOption::Never => false,
            };
            if rebuild {
                return Ok(false);
            }
        }

        // Any difference, including a newer installed version, means the
        // candidate wins so that removed versions get downgraded.
        if !same_version {
            return Ok(false);
        }

        if opts.reinstall == ReinstallOption::IfUseChanged {
            let installed_meta = self.metadata(installed)?;
            let candidate_meta = self.metadata(candidate)?;
            let candidate_iuse: HashSet<&str> =
                candidate_meta.iuse.iter().map(String::as_str).collect();
            let changed = installed_meta
                .iuse
                .iter()
                .filter(|flag| candidate_iuse.contains(flag.as_str()))
                .any(|flag| {
                    self.env.query_use(flag, Some(installed))
                        != self.env.query_use(flag, Some(candidate))
                });
            if changed {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Record an installed package as kept, processing its dependencies
    /// with the `installed_deps_*` options.
    pub(super) fn add_already_installed(
        &mut self,
        pkg: &PackageId,
        tag: Option<&DepTag>,
        scope: Scope<'_>,
    ) -> Result<()> {
        let saved_current = self.current;
        let saved_position = self.insert_position;
        let result = self
            .add_already_installed_inner(pkg, tag, scope)
            .context(|| format!("When adding installed package '{pkg}'"));
        self.current = saved_current;
        self.insert_position = saved_position;
        result
    }

    fn add_already_installed_inner(
        &mut self,
        pkg: &PackageId,
        tag: Option<&DepTag>,
        scope: Scope<'_>,
    ) -> Result<()> {
        let meta = self.metadata(pkg)?;
        let entry = ResolutionEntry::new(
            meta.clone(),
            EntryKind::AlreadyInstalled,
            EntryState::PreDepsProcessed,
        );
        let id = self.merge_list.insert(self.insert_position, entry);
        self.tag_entry(id, tag, scope.opts);
        debug!(package = %pkg, "kept installed package");

        self.current = Some(id);
        self.insert_position = InsertPosition::Before(id);
        for (class, deps) in meta.dependencies.iter_classes() {
            let option = scope.opts.deps_option(class, true);
            self.add_predeps(deps, option, class, scope)?;
        }

        self.insert_position = self.merge_list.after(id);
        for (class, deps) in meta.dependencies.iter_classes() {
            let option = scope.opts.deps_option(class, true);
            self.add_postdeps(deps, option, class, scope)?;
        }
        self.merge_list.set_state(id, EntryState::AllDepsProcessed);
        Ok(())
    }

    /// Schedule `pkg` for installation, with its provides, suggestions and
    /// dependencies.
    pub(super) fn add_package(
        &mut self,
        pkg: &PackageId,
        tag: Option<&DepTag>,
        scope: Scope<'_>,
    ) -> Result<()> {
        let saved_current = self.current;
        let saved_position = self.insert_position;
        let result = self
            .add_package_inner(pkg, tag, scope)
            .context(|| format!("When adding package '{pkg}'"));
        self.current = saved_current;
        self.insert_position = saved_position;
        result
    }

    fn add_package_inner(
        &mut self,
        pkg: &PackageId,
        tag: Option<&DepTag>,
        scope: Scope<'_>,
    ) -> Result<()> {
        let meta = self.metadata(pkg)?;
        let kind = if meta.is_virtual() {
            EntryKind::Virtual
        } else {
            EntryKind::Package
        };
        let mut entry = ResolutionEntry::new(meta.clone(), kind, EntryState::NoDepsProcessed);
        if kind == EntryKind::Package {
            entry
                .destinations
                .push(self.find_destination(pkg, scope.destinations)?);
        }
        let id = self.merge_list.insert(self.insert_position, entry);
        self.tag_entry(id, tag, scope.opts);
        debug!(package = %pkg, kind = %kind, "added to merge list");

        self.current = Some(id);
        self.insert_position = InsertPosition::Before(id);

        let post_position = self.add_provides(id, &meta)?;

        if scope.opts.suggested == SuggestedOption::Show && !meta.dependencies.suggested.is_empty() {
            let saved = self.insert_position;
            self.insert_position = self.merge_list.after(id);
            let shown = self
                .show_suggestions(&meta.dependencies.suggested, scope)
                .context(|| "When showing suggestions".to_string());
            self.insert_position = saved;
            shown?;
        }

        let classes = installable_classes(scope);
        for &class in &classes {
            let option = scope.opts.deps_option(class, false);
            self.add_predeps(meta.dependencies.get(class), option, class, scope)?;
        }

        self.merge_list.set_state(id, EntryState::PreDepsProcessed);
        self.insert_position = self.merge_list.after(post_position);

        for &class in &classes {
            let option = scope.opts.deps_option(class, false);
            self.add_postdeps(meta.dependencies.get(class), option, class, scope)?;
        }

        self.merge_list.set_state(id, EntryState::AllDepsProcessed);
        Ok(())
    }

    /// Insert provided-virtual entries after `id`; returns the last entry
    /// of the package's block.
    fn add_provides(&mut self, id: EntryId, meta: &PackageMetadata) -> Result<EntryId> {
        let mut names = Vec::new();
        self.collect_provides(&meta.provides, &mut names);

        let mut post_position = id;
        for name in names {
            if self.merge_list.equal_range(&name).next().is_some() {
                continue;
            }
            let provided = PackageMetadata::provided(&name, meta)?;
            let mut entry = ResolutionEntry::new(
                provided.into(),
                EntryKind::Provided,
                EntryState::AllDepsProcessed,
            );
            entry.associated = Some(id);
            post_position = self
                .merge_list
                .insert(self.merge_list.after(post_position), entry);
        }
        Ok(post_position)
    }

    fn collect_provides(&self, spec: &DepSpec, out: &mut Vec<Cpn>) {
        match spec {
            DepSpec::Atom(atom) => out.push(atom.cpn().clone()),
            DepSpec::AllOf(children) | DepSpec::AnyOf(children) => {
                for child in children {
                    self.collect_provides(child, out);
                }
            }
            DepSpec::Conditional {
                flag,
                inverse,
                children,
            } => {
                if self.condition_met(flag, *inverse) {
                    for child in children {
                        self.collect_provides(child, out);
                    }
                }
            }
            DepSpec::Block(_) => {}
        }
    }

    pub(super) fn add_predeps(
        &mut self,
        deps: &DepSpec,
        option: DepsOption,
        class: DepClass,
        scope: Scope<'_>,
    ) -> Result<()> {
        if !option.adds_pre() || deps.is_empty() {
            return Ok(());
        }
        let role = format!("{} as pre dependencies", class.role());
        match self.add_in_role(deps, &role, scope) {
            Err(err) if option == DepsOption::PreOrPost && err.is_recoverable() => {
                warn!(class = %class, error = %err, "dropping dependencies to post dependencies");
                Ok(())
            }
            other => other,
        }
    }

    pub(super) fn add_postdeps(
        &mut self,
        deps: &DepSpec,
        option: DepsOption,
        class: DepClass,
        scope: Scope<'_>,
    ) -> Result<()> {
        if !option.adds_post() || deps.is_empty() {
            return Ok(());
        }
        let role = format!("{} as post dependencies", class.role());
        let result = match self.add_in_role(deps, &role, scope) {
            Err(err) if err.is_circular() => {
                let saved = self.insert_position;
                self.insert_position = InsertPosition::End;
                let retry = Scope {
                    opts: scope.opts.discarding_circular(),
                    ..scope
                };
                let role = format!("{role} with cycle breaking");
                let result = self.add_in_role(deps, &role, retry);
                self.insert_position = saved;
                result
            }
            other => other,
        };
        match result {
            Err(err) if option == DepsOption::TryPost && err.is_recoverable() => {
                warn!(class = %class, error = %err, "ignoring dependencies");
                Ok(())
            }
            other => other,
        }
    }
}

fn installable_classes(scope: Scope<'_>) -> Vec<DepClass> {
    let mut classes = vec![DepClass::Build, DepClass::Run, DepClass::Post];
    if scope.opts.suggested == SuggestedOption::Install {
        classes.push(DepClass::Suggested);
    }
    classes
}

/// Mask reasons that `overrides` lets through. `ByAssociation` always is.
fn ignored_mask_reasons(overrides: MaskOverrides) -> MaskReasons {
    let mut ignored = MaskReasons::none().with(MaskReason::ByAssociation);
    if overrides.contains(MaskOverride::RepositoryMasks) {
        ignored.insert(MaskReason::RepositoryMask);
    }
    if overrides.contains(MaskOverride::ProfileMasks) {
        ignored.insert(MaskReason::ProfileMask);
    }
    if overrides.contains(MaskOverride::Licenses) {
        ignored.insert(MaskReason::License);
    }
    ignored
}

fn describe(pkg: &PackageId, meta: &PackageMetadata) -> String {
    match &meta.virtual_for {
        Some(target) => format!("{pkg} (for {target})"),
        None => pkg.to_string(),
    }
}
