//! Resolution policy.
//!
//! [`Options`] is a plain `Copy` value. The engine keeps one as its
//! configured policy and passes a copy down each resolution call; OR-group
//! trials and post-dependency retries derive locally modified copies instead
//! of mutating shared state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::package::DepClass;

/// When to rebuild a package that is already installed at the chosen version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReinstallOption {
    #[default]
    Never,
    Always,
    /// Rebuild when a flag both versions declare changed state.
    IfUseChanged,
}

/// When to rebuild live (SCM) packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReinstallScmOption {
    #[default]
    Never,
    Always,
    Daily,
    Weekly,
}

/// Whether targets name a single package or a set.
///
/// With [`TargetType::Package`] the requested package itself is never
/// satisfied by its installed version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetType {
    #[default]
    Package,
    Set,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpgradeOption {
    #[default]
    Always,
    /// Keep an installed version that satisfies the atom. With
    /// [`TargetType::Package`] this never applies to a top-level target,
    /// which is always rebuilt; use [`TargetType::Set`] to keep those too.
    AsNeeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DowngradeOption {
    #[default]
    AsNeeded,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NewSlotsOption {
    #[default]
    Always,
    AsNeeded,
}

/// When an installed package may stand in for an atom with no visible candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallBackOption {
    #[default]
    AsNeededExceptTargets,
    AsNeeded,
    Never,
}

/// Where dependencies of one class are added relative to their consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepsOption {
    #[default]
    Discard,
    /// Before the consumer; failures abort.
    Pre,
    /// Before the consumer if possible, otherwise after it.
    PreOrPost,
    /// After the consumer; failures abort.
    Post,
    /// After the consumer; failures are logged and ignored.
    TryPost,
}

impl DepsOption {
    pub(crate) fn adds_pre(self) -> bool {
        matches!(self, DepsOption::Pre | DepsOption::PreOrPost)
    }

    pub(crate) fn adds_post(self) -> bool {
        matches!(
            self,
            DepsOption::PreOrPost | DepsOption::Post | DepsOption::TryPost
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuggestedOption {
    #[default]
    Show,
    Discard,
    Install,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircularOption {
    #[default]
    Error,
    Discard,
    DiscardSilently,
}

/// How conditional groups are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UseOption {
    #[default]
    Standard,
    /// Take every branch that is not masked or forced away.
    TakeAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlocksOption {
    /// Record a `Block` entry and carry on.
    #[default]
    Accumulate,
    Error,
    Discard,
    DiscardCompletely,
}

/// A mask category the caller allows the engine to force past.
///
/// Declaration order is escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaskOverride {
    RepositoryMasks,
    ProfileMasks,
    Licenses,
    TildeKeywords,
    Unkeyworded,
}

impl MaskOverride {
    /// All overrides in escalation order.
    pub const ALL: [MaskOverride; 5] = [
        MaskOverride::RepositoryMasks,
        MaskOverride::ProfileMasks,
        MaskOverride::Licenses,
        MaskOverride::TildeKeywords,
        MaskOverride::Unkeyworded,
    ];

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl fmt::Display for MaskOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskOverride::RepositoryMasks => write!(f, "repository-masks"),
            MaskOverride::ProfileMasks => write!(f, "profile-masks"),
            MaskOverride::Licenses => write!(f, "licenses"),
            MaskOverride::TildeKeywords => write!(f, "tilde-keywords"),
            MaskOverride::Unkeyworded => write!(f, "unkeyworded"),
        }
    }
}

/// Set of [`MaskOverride`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<MaskOverride>", into = "Vec<MaskOverride>")]
pub struct MaskOverrides(u8);

impl MaskOverrides {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, o: MaskOverride) -> bool {
        self.0 & o.bit() != 0
    }

    pub fn insert(&mut self, o: MaskOverride) {
        self.0 |= o.bit();
    }

    pub fn with(mut self, o: MaskOverride) -> Self {
        self.insert(o);
        self
    }

    /// Members in escalation order.
    pub fn iter(self) -> impl Iterator<Item = MaskOverride> {
        MaskOverride::ALL.into_iter().filter(move |o| self.contains(*o))
    }
}

impl FromIterator<MaskOverride> for MaskOverrides {
    fn from_iter<I: IntoIterator<Item = MaskOverride>>(iter: I) -> Self {
        let mut set = Self::empty();
        for o in iter {
            set.insert(o);
        }
        set
    }
}

impl From<Vec<MaskOverride>> for MaskOverrides {
    fn from(v: Vec<MaskOverride>) -> Self {
        v.into_iter().collect()
    }
}

impl From<MaskOverrides> for Vec<MaskOverride> {
    fn from(set: MaskOverrides) -> Self {
        set.iter().collect()
    }
}

/// Policy configuration for a [`DepList`](crate::DepList).
///
/// Every field has a default, so a TOML file only needs to name what it
/// changes:
///
/// ```
/// use portage_atom_deplist::{Options, UpgradeOption};
///
/// let opts = Options::from_toml_str("upgrade = \"as-needed\"").unwrap();
/// assert_eq!(opts.upgrade, UpgradeOption::AsNeeded);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Options {
    pub reinstall: ReinstallOption,
    pub reinstall_scm: ReinstallScmOption,
    pub target_type: TargetType,
    pub upgrade: UpgradeOption,
    pub downgrade: DowngradeOption,
    pub new_slots: NewSlotsOption,
    pub fall_back: FallBackOption,

    pub installed_deps_pre: DepsOption,
    pub installed_deps_runtime: DepsOption,
    pub installed_deps_post: DepsOption,

    pub uninstalled_deps_pre: DepsOption,
    pub uninstalled_deps_runtime: DepsOption,
    pub uninstalled_deps_post: DepsOption,
    pub uninstalled_deps_suggested: DepsOption,

    pub suggested: SuggestedOption,
    pub circular: CircularOption,
    #[serde(rename = "use")]
    pub use_option: UseOption,
    pub blocks: BlocksOption,
    /// Tag every entry with the package that pulled it in.
    pub dependency_tags: bool,
    pub override_masks: MaskOverrides,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            reinstall: ReinstallOption::Never,
            reinstall_scm: ReinstallScmOption::Never,
            target_type: TargetType::Package,
            upgrade: UpgradeOption::Always,
            downgrade: DowngradeOption::AsNeeded,
            new_slots: NewSlotsOption::Always,
            fall_back: FallBackOption::AsNeededExceptTargets,
            installed_deps_pre: DepsOption::Discard,
            installed_deps_runtime: DepsOption::TryPost,
            installed_deps_post: DepsOption::TryPost,
            uninstalled_deps_pre: DepsOption::Pre,
            uninstalled_deps_runtime: DepsOption::PreOrPost,
            uninstalled_deps_post: DepsOption::Post,
            uninstalled_deps_suggested: DepsOption::TryPost,
            suggested: SuggestedOption::Show,
            circular: CircularOption::Error,
            use_option: UseOption::Standard,
            blocks: BlocksOption::Accumulate,
            dependency_tags: false,
            override_masks: MaskOverrides::empty(),
        }
    }
}

impl Options {
    /// Parse options from a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// The option governing `class` for an installed or uninstalled consumer.
    pub fn deps_option(&self, class: DepClass, installed: bool) -> DepsOption {
        match (class, installed) {
            (DepClass::Build, false) => self.uninstalled_deps_pre,
            (DepClass::Run, false) => self.uninstalled_deps_runtime,
            (DepClass::Post, false) => self.uninstalled_deps_post,
            (DepClass::Suggested, false) => self.uninstalled_deps_suggested,
            (DepClass::Build, true) => self.installed_deps_pre,
            (DepClass::Run, true) => self.installed_deps_runtime,
            (DepClass::Post, true) => self.installed_deps_post,
            // Suggestions of installed packages are never pulled in.
            (DepClass::Suggested, true) => DepsOption::Discard,
        }
    }

    /// Copy used for OR-group trials: blockers become fatal and mask
    /// overrides are withdrawn.
    pub(crate) fn for_any_of_trial(self) -> Self {
        Self {
            blocks: match self.blocks {
                BlocksOption::DiscardCompletely => BlocksOption::DiscardCompletely,
                _ => BlocksOption::Error,
            },
            override_masks: MaskOverrides::empty(),
            ..self
        }
    }

    /// Copy used when retrying post dependencies after a cycle.
    pub(crate) fn discarding_circular(self) -> Self {
        Self {
            circular: match self.circular {
                CircularOption::DiscardSilently => CircularOption::DiscardSilently,
                _ => CircularOption::Discard,
            },
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_deplist() {
        let o = Options::default();
        assert_eq!(o.uninstalled_deps_runtime, DepsOption::PreOrPost);
        assert_eq!(o.installed_deps_pre, DepsOption::Discard);
        assert_eq!(o.blocks, BlocksOption::Accumulate);
        assert!(o.override_masks.is_empty());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let o = Options::from_toml_str(
            r#"
            reinstall = "if-use-changed"
            circular = "discard-silently"
            use = "take-all"
            override-masks = ["licenses", "repository-masks"]
            "#,
        )
        .unwrap();
        assert_eq!(o.reinstall, ReinstallOption::IfUseChanged);
        assert_eq!(o.circular, CircularOption::DiscardSilently);
        assert_eq!(o.use_option, UseOption::TakeAll);
        assert_eq!(o.downgrade, DowngradeOption::AsNeeded);
        assert_eq!(
            o.override_masks.iter().collect::<Vec<_>>(),
            vec![MaskOverride::RepositoryMasks, MaskOverride::Licenses]
        );
    }

    #[test]
    fn unknown_value_is_rejected() {
        assert!(Options::from_toml_str("blocks = \"sometimes\"").is_err());
    }

    #[test]
    fn toml_output_reloads() {
        let mut o = Options::default();
        o.override_masks.insert(MaskOverride::TildeKeywords);
        o.dependency_tags = true;
        let text = o.to_toml_string().unwrap();
        assert_eq!(Options::from_toml_str(&text).unwrap(), o);
    }

    #[test]
    fn any_of_trial_keeps_discard_completely() {
        let mut o = Options::default();
        o.override_masks.insert(MaskOverride::Licenses);
        let t = o.for_any_of_trial();
        assert_eq!(t.blocks, BlocksOption::Error);
        assert!(t.override_masks.is_empty());

        o.blocks = BlocksOption::DiscardCompletely;
        assert_eq!(o.for_any_of_trial().blocks, BlocksOption::DiscardCompletely);
    }

    #[test]
    fn installed_suggestions_are_discarded() {
        let o = Options {
            uninstalled_deps_suggested: DepsOption::Pre,
            ..Options::default()
        };
        assert_eq!(o.deps_option(DepClass::Suggested, true), DepsOption::Discard);
        assert_eq!(o.deps_option(DepClass::Suggested, false), DepsOption::Pre);
    }
}
