//! Package query interface.
//!
//! [`Environment`] answers everything the resolver needs to know about the
//! outside world: which versions exist, which are installed, their
//! metadata, masking, USE state and install times.
//! [`InMemoryEnvironment`] is a simple implementation for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use portage_atom::Cpn;

use crate::dep_spec::PackageSpec;
use crate::package::{PackageId, PackageMetadata};
use crate::version_match::package_matches;

/// Which side of the system a query looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    InstalledOnly,
    InstallableOnly,
    Any,
}

/// Why a package is not visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskReason {
    /// Not keyworded (or only `~`-keyworded) for the accepted keywords.
    Keyword,
    UserMask,
    ProfileMask,
    RepositoryMask,
    License,
    Eapi,
    /// Masked because the package it stands for is masked.
    ByAssociation,
}

impl MaskReason {
    fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Set of [`MaskReason`]s; empty means visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct MaskReasons(u8);

impl MaskReasons {
    pub fn none() -> Self {
        Self(0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, r: MaskReason) -> bool {
        self.0 & r.bit() != 0
    }

    pub fn insert(&mut self, r: MaskReason) {
        self.0 |= r.bit();
    }

    pub fn remove(&mut self, r: MaskReason) {
        self.0 &= !r.bit();
    }

    pub fn with(mut self, r: MaskReason) -> Self {
        self.insert(r);
        self
    }

    /// Reasons in `self` that are not in `ignored`.
    pub fn without(self, ignored: MaskReasons) -> Self {
        Self(self.0 & !ignored.0)
    }
}

impl FromIterator<MaskReason> for MaskReasons {
    fn from_iter<I: IntoIterator<Item = MaskReason>>(iter: I) -> Self {
        let mut set = Self::none();
        for r in iter {
            set.insert(r);
        }
        set
    }
}

/// Keyword relaxations the resolver may request from [`Environment::mask_reasons`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeywordOverrides {
    /// Accept `~arch` keywords.
    pub tilde: bool,
    /// Accept packages with no keyword for the arch at all.
    pub unkeyworded: bool,
}

/// Read-only view of repositories, the installed database and configuration.
pub trait Environment {
    /// Every version of `cpn` on the requested side, lowest version first.
    fn candidates(&self, cpn: &Cpn, kind: QueryKind) -> Vec<PackageId>;

    fn metadata(&self, pkg: &PackageId) -> Option<Arc<PackageMetadata>>;

    fn mask_reasons(&self, pkg: &PackageId, overrides: KeywordOverrides) -> MaskReasons;

    /// USE state of `flag` for `pkg`, or the global configuration when `None`.
    fn query_use(&self, flag: &str, pkg: Option<&PackageId>) -> bool;

    fn query_use_mask(&self, _flag: &str, _pkg: Option<&PackageId>) -> bool {
        false
    }

    fn query_use_force(&self, _flag: &str, _pkg: Option<&PackageId>) -> bool {
        false
    }

    /// When an installed package was merged.
    fn installed_time(&self, pkg: &PackageId) -> Option<DateTime<Utc>>;

    /// Whether `destination` can receive `pkg`.
    fn is_suitable_destination(&self, destination: &str, pkg: &PackageId) -> bool;

    /// Packages matching `spec`, lowest version first.
    ///
    /// Conditional USE requirements are evaluated against `consumer`.
    fn query(
        &self,
        spec: &PackageSpec,
        kind: QueryKind,
        consumer: Option<&PackageId>,
    ) -> Vec<PackageId> {
        self.candidates(spec.cpn(), kind)
            .into_iter()
            .filter(|pkg| {
                self.metadata(pkg)
                    .is_some_and(|meta| package_matches(self, spec, pkg, &meta, consumer))
            })
            .collect()
    }
}

/// Global USE configuration.
///
/// A flag is on for a package when the package records it as enabled or it
/// is listed in `enabled`; `disabled` wins over both.
#[derive(Debug, Clone, Default)]
pub struct UseConfig {
    pub enabled: HashSet<String>,
    pub disabled: HashSet<String>,
}

impl From<HashSet<String>> for UseConfig {
    fn from(enabled: HashSet<String>) -> Self {
        Self {
            enabled,
            disabled: HashSet::new(),
        }
    }
}

/// Keyword state of an installable package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeywordStatus {
    #[default]
    Stable,
    Testing,
    Missing,
}

#[derive(Debug, Clone, Default)]
struct Visibility {
    keyword: KeywordStatus,
    masks: MaskReasons,
}

/// Environment backed by `HashMap`s, useful for tests and demos.
///
/// Installable and installed packages live side by side and are told apart
/// by their repository: installed ones use [`InMemoryEnvironment::INSTALLED_REPO`].
pub struct InMemoryEnvironment {
    packages: HashMap<Cpn, Vec<Arc<PackageMetadata>>>,
    visibility: HashMap<PackageId, Visibility>,
    installed_times: HashMap<PackageId, DateTime<Utc>>,
    use_config: UseConfig,
    use_masked: HashSet<String>,
    use_forced: HashSet<String>,
    destinations: HashSet<String>,
}

impl InMemoryEnvironment {
    pub const INSTALLED_REPO: &'static str = "installed";

    /// Create an empty environment whose only destination is `installed`.
    pub fn new() -> Self {
        Self {
            packages: HashMap::new(),
            visibility: HashMap::new(),
            installed_times: HashMap::new(),
            use_config: UseConfig::default(),
            use_masked: HashSet::new(),
            use_forced: HashSet::new(),
            destinations: HashSet::from([Self::INSTALLED_REPO.to_string()]),
        }
    }

    fn insert(&mut self, meta: PackageMetadata) -> PackageId {
        let id = meta.id();
        let versions = self.packages.entry(meta.cpv.cpn.clone()).or_default();
        versions.retain(|m| m.id() != id);
        versions.push(Arc::new(meta));
        versions.sort_by(|a, b| a.cpv.version.cmp(&b.cpv.version));
        id
    }

    /// Add a version that can be installed.
    pub fn add_installable(&mut self, meta: PackageMetadata) -> PackageId {
        self.insert(meta)
    }

    /// Add an installed version; its repository is forced to `installed`.
    pub fn add_installed(&mut self, mut meta: PackageMetadata) -> PackageId {
        meta.repo = Self::INSTALLED_REPO.to_string();
        self.insert(meta)
    }

    pub fn set_installed_time(&mut self, pkg: &PackageId, time: DateTime<Utc>) {
        self.installed_times.insert(pkg.clone(), time);
    }

    pub fn set_keyword(&mut self, pkg: &PackageId, keyword: KeywordStatus) {
        self.visibility.entry(pkg.clone()).or_default().keyword = keyword;
    }

    pub fn mask(&mut self, pkg: &PackageId, reason: MaskReason) {
        self.visibility
            .entry(pkg.clone())
            .or_default()
            .masks
            .insert(reason);
    }

    pub fn use_config_mut(&mut self) -> &mut UseConfig {
        &mut self.use_config
    }

    pub fn mask_use(&mut self, flag: impl Into<String>) {
        self.use_masked.insert(flag.into());
    }

    pub fn force_use(&mut self, flag: impl Into<String>) {
        self.use_forced.insert(flag.into());
    }

    pub fn add_destination(&mut self, name: impl Into<String>) {
        self.destinations.insert(name.into());
    }

    fn find(&self, pkg: &PackageId) -> Option<&Arc<PackageMetadata>> {
        self.packages
            .get(pkg.cpn())?
            .iter()
            .find(|m| m.cpv == pkg.cpv && m.repo == pkg.repo)
    }
}

impl Default for InMemoryEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for InMemoryEnvironment {
    fn candidates(&self, cpn: &Cpn, kind: QueryKind) -> Vec<PackageId> {
        let Some(versions) = self.packages.get(cpn) else {
            return Vec::new();
        };
        versions
            .iter()
            .filter(|m| {
                let installed = m.repo == Self::INSTALLED_REPO;
                match kind {
                    QueryKind::InstalledOnly => installed,
                    QueryKind::InstallableOnly => !installed,
                    QueryKind::Any => true,
                }
            })
            .map(|m| m.id())
            .collect()
    }

    fn metadata(&self, pkg: &PackageId) -> Option<Arc<PackageMetadata>> {
        self.find(pkg).cloned()
    }

    fn mask_reasons(&self, pkg: &PackageId, overrides: KeywordOverrides) -> MaskReasons {
        let Some(vis) = self.visibility.get(pkg) else {
            return MaskReasons::none();
        };
        let mut reasons = vis.masks;
        let keyword_ok = match vis.keyword {
            KeywordStatus::Stable => true,
            KeywordStatus::Testing => overrides.tilde,
            KeywordStatus::Missing => overrides.unkeyworded,
        };
        if !keyword_ok {
            reasons.insert(MaskReason::Keyword);
        }
        reasons
    }

    fn query_use(&self, flag: &str, pkg: Option<&PackageId>) -> bool {
        if self.use_config.disabled.contains(flag) {
            return false;
        }
        let recorded = pkg
            .and_then(|p| self.find(p))
            .is_some_and(|m| m.use_flags.contains(flag));
        recorded || self.use_config.enabled.contains(flag)
    }

    fn query_use_mask(&self, flag: &str, _pkg: Option<&PackageId>) -> bool {
        self.use_masked.contains(flag)
    }

    fn query_use_force(&self, flag: &str, _pkg: Option<&PackageId>) -> bool {
        self.use_forced.contains(flag)
    }

    fn installed_time(&self, pkg: &PackageId) -> Option<DateTime<Utc>> {
        self.installed_times.get(pkg).copied()
    }

    fn is_suitable_destination(&self, destination: &str, _pkg: &PackageId) -> bool {
        self.destinations.contains(destination)
    }
}
