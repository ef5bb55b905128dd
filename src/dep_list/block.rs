//! Blocker checks.

use tracing::warn;

use super::{DepList, Scope};
use crate::dep_spec::PackageSpec;
use crate::environment::QueryKind;
use crate::error::{DepListError, Error, Result, ResultExt};
use crate::merge_list::{EntryId, EntryKind};
use crate::options::BlocksOption;
use crate::package::{PackageId, PackageMetadata};
use crate::version_match::package_matches;

impl DepList<'_> {
    pub(super) fn add_block(&mut self, blocked: &PackageSpec, scope: Scope<'_>) -> Result<()> {
        if scope.opts.blocks == BlocksOption::DiscardCompletely {
            return Ok(());
        }
        self.check_block(blocked, scope)
            .context(|| format!("When checking BlockDepSpec '!{blocked}'"))
    }

    fn check_block(&mut self, blocked: &PackageSpec, scope: Scope<'_>) -> Result<()> {
        let consumer = self.current_package();
        let just_package = blocked.package_only();

        let installed = self
            .env
            .query(&just_package, QueryKind::InstalledOnly, None);
        let will_be_installed = self.scheduled_except_current(&just_package);
        if installed.is_empty() && will_be_installed.is_empty() {
            return Ok(());
        }

        for pkg in installed {
            let meta = self.metadata(&pkg)?;
            if !package_matches(self.env, blocked, &pkg, &meta, consumer.as_ref()) {
                continue;
            }
            let replaced = will_be_installed.iter().any(|&id| {
                let entry = self.merge_list.entry(id);
                entry.slot() == meta.slot
                    && entry
                        .virtual_for()
                        .is_none_or(|target| target.cpn() == pkg.cpn())
            });
            if replaced || blocks_consumer(blocked, consumer.as_ref(), &pkg, &meta) {
                continue;
            }

            match scope.opts.blocks {
                BlocksOption::Error => return Err(block_error(blocked)),
                BlocksOption::Discard => warn!(block = %blocked, "discarding block"),
                BlocksOption::DiscardCompletely => {}
                BlocksOption::Accumulate => self.add_error_package(&pkg, EntryKind::Block)?,
            }
        }

        for id in will_be_installed {
            let entry = self.merge_list.entry(id);
            if !package_matches(
                self.env,
                blocked,
                entry.package(),
                entry.metadata(),
                consumer.as_ref(),
            ) || blocks_consumer(blocked, consumer.as_ref(), entry.package(), entry.metadata())
            {
                continue;
            }

            match scope.opts.blocks {
                BlocksOption::Discard => warn!(block = %blocked, "discarding block"),
                BlocksOption::DiscardCompletely => {}
                BlocksOption::Error | BlocksOption::Accumulate => {
                    return Err(block_error(blocked));
                }
            }
        }
        Ok(())
    }

    /// Scheduled entries for the blocked name, leaving out the package
    /// whose dependencies are being added and the package it belongs to.
    fn scheduled_except_current(&self, just_package: &PackageSpec) -> Vec<EntryId> {
        let current = self.current;
        let associated = current.and_then(|id| self.merge_list.entry(id).associated());
        self.merge_list
            .equal_range(just_package.cpn())
            .filter(|&id| Some(id) != current && Some(id) != associated)
            .filter(|&id| self.entry_matches(id, just_package, None))
            .collect()
    }
}

/// An unqualified blocker never blocks the package that declares it, nor
/// a virtual standing for that package.
fn blocks_consumer(
    blocked: &PackageSpec,
    consumer: Option<&PackageId>,
    pkg: &PackageId,
    meta: &PackageMetadata,
) -> bool {
    let Some(consumer) = consumer else {
        return false;
    };
    blocked.is_unqualified()
        && (pkg.cpn() == consumer.cpn()
            || meta
                .virtual_for
                .as_ref()
                .is_some_and(|target| target.cpn() == consumer.cpn()))
}

fn block_error(blocked: &PackageSpec) -> Error {
    DepListError::Block {
        spec: blocked.to_string(),
    }
    .into()
}
