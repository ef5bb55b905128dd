//! Ordered dependency resolution for Gentoo-style package managers.
//!
//! This crate turns [`portage_atom`] dependency trees into a *merge list*:
//! the exact sequence in which packages have to be built and installed,
//! honouring slots, blockers, pre/post dependency ordering and a policy
//! matrix of upgrade, downgrade and reinstall rules.
//!
//! The moving parts:
//!
//! - [`Environment`] answers questions about available and installed
//!   packages; [`InMemoryEnvironment`] is a ready-made implementation.
//! - [`DepSpec`] is the dependency tree the resolver walks.
//! - [`Options`] is the resolution policy, loadable from TOML.
//! - [`DepList`] owns the [`MergeList`] and resolves targets into it, one
//!   rollback-safe transaction per [`DepList::add`].

mod dep_list;
mod dep_spec;
mod environment;
mod error;
mod merge_list;
mod options;
mod package;
mod range_rewriter;
mod version_match;

pub use dep_list::DepList;
pub use dep_spec::{DepSpec, DepTag, PackageSpec};
pub use environment::{
    Environment, InMemoryEnvironment, KeywordOverrides, KeywordStatus, MaskReason, MaskReasons,
    QueryKind, UseConfig,
};
pub use error::{ConfigError, DepListError, Error, ParseError, Result};
pub use merge_list::{
    EntryId, EntryKind, EntryState, InsertPosition, MergeList, ResolutionEntry, TagEntry,
    Transaction,
};
pub use options::{
    BlocksOption, CircularOption, DepsOption, DowngradeOption, FallBackOption, MaskOverride,
    MaskOverrides, NewSlotsOption, Options, ReinstallOption, ReinstallScmOption, SuggestedOption,
    TargetType, UpgradeOption, UseOption,
};
pub use package::{DepClass, PackageDeps, PackageId, PackageMetadata, VIRTUALS_REPOSITORY};
pub use portage_atom::DepEntry;
pub use range_rewriter::rewrite_ranges;
pub use version_match::{is_scm_name, is_scm_version, package_matches, version_matches};
