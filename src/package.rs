//! Package identities and the metadata the engine reads from an environment.

use std::collections::HashSet;
use std::fmt;

use portage_atom::{Cpn, Cpv};

use crate::dep_spec::DepSpec;
use crate::error::{Error, Result};

/// Repository name given to synthesised provided-virtual entries.
pub const VIRTUALS_REPOSITORY: &str = "virtuals";

/// A concrete package version in a named repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageId {
    pub cpv: Cpv,
    pub repo: String,
}

impl PackageId {
    pub fn new(cpv: Cpv, repo: impl Into<String>) -> Self {
        Self {
            cpv,
            repo: repo.into(),
        }
    }

    pub fn cpn(&self) -> &Cpn {
        &self.cpv.cpn
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.cpv, self.repo)
    }
}

/// Metadata for one package version.
#[derive(Debug, Clone)]
pub struct PackageMetadata {
    /// The fully-qualified category/package/version.
    pub cpv: Cpv,
    /// Repository this version comes from (e.g. `"gentoo"`, `"installed"`).
    pub repo: String,
    pub slot: String,
    /// Sub-slot for ABI tracking.
    pub subslot: Option<String>,
    /// Declared IUSE flags (names only, without +/- defaults).
    pub iuse: Vec<String>,
    /// USE flags recorded as enabled for this version.
    pub use_flags: HashSet<String>,
    pub dependencies: PackageDeps,
    /// Old-style virtuals this package provides (`PROVIDE`).
    pub provides: DepSpec,
    /// Set when this version is a virtual standing in for another package.
    pub virtual_for: Option<PackageId>,
}

impl PackageMetadata {
    /// Metadata with slot `0`, no flags and no dependencies.
    pub fn new(cpv: Cpv, repo: impl Into<String>) -> Self {
        Self {
            cpv,
            repo: repo.into(),
            slot: "0".into(),
            subslot: None,
            iuse: Vec::new(),
            use_flags: HashSet::new(),
            dependencies: PackageDeps::default(),
            provides: DepSpec::empty(),
            virtual_for: None,
        }
    }

    /// Metadata for a provided virtual `name` satisfied by `provider`.
    pub(crate) fn provided(name: &Cpn, provider: &PackageMetadata) -> Result<Self> {
        let text = format!("{}-{}", name, provider.cpv.version);
        let cpv = Cpv::parse(&text)
            .map_err(|e| Error::Internal(format!("cannot build virtual '{text}': {e:?}")))?;
        Ok(Self {
            slot: provider.slot.clone(),
            virtual_for: Some(provider.id()),
            ..Self::new(cpv, VIRTUALS_REPOSITORY)
        })
    }

    pub fn id(&self) -> PackageId {
        PackageId::new(self.cpv.clone(), self.repo.clone())
    }

    pub fn is_virtual(&self) -> bool {
        self.virtual_for.is_some()
    }

    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = slot.into();
        self
    }

    pub fn with_iuse<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.iuse = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_use_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.use_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependencies(mut self, dependencies: PackageDeps) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_provides(mut self, provides: DepSpec) -> Self {
        self.provides = provides;
        self
    }

    pub fn with_virtual_for(mut self, target: PackageId) -> Self {
        self.virtual_for = Some(target);
        self
    }
}

/// Dependency trees separated by class.
///
/// - `build`, `DEPEND`: needed before the package can be built
/// - `run`, `RDEPEND`: needed when the package runs
/// - `post`, `PDEPEND`: may be merged after the package (allows cycles)
/// - `suggested`, `SDEPEND`: optional, shown or installed per policy
#[derive(Debug, Clone, Default)]
pub struct PackageDeps {
    pub build: DepSpec,
    pub run: DepSpec,
    pub post: DepSpec,
    pub suggested: DepSpec,
}

impl PackageDeps {
    pub fn get(&self, class: DepClass) -> &DepSpec {
        match class {
            DepClass::Build => &self.build,
            DepClass::Run => &self.run,
            DepClass::Post => &self.post,
            DepClass::Suggested => &self.suggested,
        }
    }

    /// Iterate over the non-empty dependency classes and their trees.
    pub fn iter_classes(&self) -> impl Iterator<Item = (DepClass, &DepSpec)> {
        DepClass::ALL
            .into_iter()
            .map(|class| (class, self.get(class)))
            .filter(|(_, spec)| !spec.is_empty())
    }
}

/// Dependency class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepClass {
    /// `DEPEND`, build-time.
    Build,
    /// `RDEPEND`, runtime.
    Run,
    /// `PDEPEND`, post-merge.
    Post,
    /// `SDEPEND`, suggested.
    Suggested,
}

impl DepClass {
    pub const ALL: [DepClass; 4] = [
        DepClass::Build,
        DepClass::Run,
        DepClass::Post,
        DepClass::Suggested,
    ];

    /// Human readable role used in error context frames.
    pub(crate) fn role(self) -> &'static str {
        match self {
            DepClass::Build => "build dependencies",
            DepClass::Run => "runtime dependencies",
            DepClass::Post => "post dependencies",
            DepClass::Suggested => "suggested dependencies",
        }
    }
}

impl fmt::Display for DepClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepClass::Build => write!(f, "DEPEND"),
            DepClass::Run => write!(f, "RDEPEND"),
            DepClass::Post => write!(f, "PDEPEND"),
            DepClass::Suggested => write!(f, "SDEPEND"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provided_metadata_points_at_provider() {
        let provider = PackageMetadata::new(Cpv::parse("cat/four-1").unwrap(), "repo")
            .with_slot("2");
        let virt = PackageMetadata::provided(&Cpn::new("virtual", "four"), &provider).unwrap();
        assert_eq!(virt.id().to_string(), "virtual/four-1::virtuals");
        assert_eq!(virt.slot, "2");
        assert_eq!(virt.virtual_for, Some(provider.id()));
        assert!(virt.is_virtual());
    }

    #[test]
    fn iter_classes_skips_empty_trees() {
        let deps = PackageDeps {
            run: DepSpec::parse("cat/two").unwrap(),
            ..PackageDeps::default()
        };
        let classes: Vec<_> = deps.iter_classes().map(|(c, _)| c).collect();
        assert_eq!(classes, vec![DepClass::Run]);
        assert_eq!(DepClass::Post.to_string(), "PDEPEND");
    }
}
