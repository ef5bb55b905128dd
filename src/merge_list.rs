//! Arena-backed merge list.
//!
//! [`MergeList`] stores every [`ResolutionEntry`] in a `Vec` indexed by
//! [`EntryId`]. Build order is kept in a separate vector of ids, so inserting
//! before or after any entry never moves the entries themselves, and a
//! name index maps each category/package to the entries keyed under it.
//!
//! Entries are created in generation order, so rolling a [`Transaction`]
//! back is a truncation of the arena tail plus a sweep of the order vector,
//! the name index and newer tags.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use portage_atom::Cpn;
use tracing::debug;

use crate::dep_spec::DepTag;
use crate::package::{PackageId, PackageMetadata};

/// Stable handle to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(usize);

impl EntryId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What an entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// To be built and installed.
    Package,
    Subpackage,
    /// Kept as is.
    AlreadyInstalled,
    /// A virtual that resolves to another package.
    Virtual,
    /// An old-style virtual provided by the associated entry.
    Provided,
    /// Informational only.
    Suggested,
    /// An unresolved blocker against an installed package.
    Block,
    /// A package made visible by a mask override.
    Masked,
}

impl EntryKind {
    /// Whether an atom may resolve to this entry.
    pub fn satisfies_atoms(self) -> bool {
        !matches!(
            self,
            EntryKind::Block | EntryKind::Masked | EntryKind::Suggested
        )
    }

    pub fn is_error(self) -> bool {
        matches!(self, EntryKind::Block | EntryKind::Masked)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryKind::Package => "package",
            EntryKind::Subpackage => "subpackage",
            EntryKind::AlreadyInstalled => "already installed",
            EntryKind::Virtual => "virtual",
            EntryKind::Provided => "provided",
            EntryKind::Suggested => "suggested",
            EntryKind::Block => "block",
            EntryKind::Masked => "masked",
        };
        f.write_str(s)
    }
}

/// How far dependency processing of an entry has got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryState {
    NoDepsProcessed,
    PreDepsProcessed,
    AllDepsProcessed,
}

/// A tag plus the generation that attached it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEntry {
    pub tag: DepTag,
    pub generation: u64,
}

/// One row of the merge list.
#[derive(Debug, Clone)]
pub struct ResolutionEntry {
    pub(crate) package: PackageId,
    pub(crate) metadata: Arc<PackageMetadata>,
    pub(crate) kind: EntryKind,
    pub(crate) state: EntryState,
    pub(crate) generation: u64,
    pub(crate) tags: Vec<TagEntry>,
    pub(crate) destinations: Vec<String>,
    pub(crate) associated: Option<EntryId>,
}

impl ResolutionEntry {
    pub(crate) fn new(
        metadata: Arc<PackageMetadata>,
        kind: EntryKind,
        state: EntryState,
    ) -> Self {
        Self {
            package: metadata.id(),
            metadata,
            kind,
            state,
            generation: 0,
            tags: Vec::new(),
            destinations: Vec::new(),
            associated: None,
        }
    }

    pub fn package(&self) -> &PackageId {
        &self.package
    }

    pub fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tags(&self) -> impl Iterator<Item = &DepTag> {
        self.tags.iter().map(|t| &t.tag)
    }

    pub fn tag_entries(&self) -> &[TagEntry] {
        &self.tags
    }

    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    /// The provider of a provided virtual, or the consumer of an error entry.
    pub fn associated(&self) -> Option<EntryId> {
        self.associated
    }

    pub fn slot(&self) -> &str {
        &self.metadata.slot
    }

    /// The package a virtual entry stands for.
    pub fn virtual_for(&self) -> Option<&PackageId> {
        self.metadata.virtual_for.as_ref()
    }
}

impl fmt::Display for ResolutionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}:{}::{} ({})",
            self.package.cpn(),
            self.package.cpv.version,
            self.metadata.slot,
            self.package.repo,
            self.kind
        )
    }
}

/// Where a new entry goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Front,
    Before(EntryId),
    End,
}

/// Token for an open transaction.
///
/// Either [`commit`](Transaction::commit) it or hand it to
/// [`MergeList::rollback`].
#[must_use = "a transaction must be committed or rolled back"]
#[derive(Debug)]
pub struct Transaction {
    initial_generation: u64,
}

impl Transaction {
    pub fn initial_generation(&self) -> u64 {
        self.initial_generation
    }

    pub fn commit(self) {}
}

/// Ordered resolution plan with a name index.
#[derive(Debug, Default)]
pub struct MergeList {
    entries: Vec<ResolutionEntry>,
    order: Vec<EntryId>,
    index: HashMap<Cpn, Vec<EntryId>>,
    generation: u64,
}

impl MergeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation stamped on entries and tags created now.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn begin_transaction(&mut self) -> Transaction {
        let tx = Transaction {
            initial_generation: self.generation,
        };
        self.generation += 1;
        tx
    }

    /// Undo everything created or tagged after `tx` began.
    pub fn rollback(&mut self, tx: Transaction) {
        let initial = tx.initial_generation;
        let cut = self
            .entries
            .iter()
            .position(|e| e.generation > initial)
            .unwrap_or(self.entries.len());
        debug_assert!(self.entries[cut..].iter().all(|e| e.generation > initial));

        let dropped = self.entries.len() - cut;
        self.entries.truncate(cut);
        self.order.retain(|id| id.0 < cut);
        self.index.retain(|_, ids| {
            ids.retain(|id| id.0 < cut);
            !ids.is_empty()
        });
        for entry in &mut self.entries {
            entry.tags.retain(|t| t.generation <= initial);
        }
        debug!(
            generation = initial,
            dropped, "rolled back merge list transaction"
        );
    }

    /// Insert `entry`, stamping it with the current generation and indexing
    /// it under its own name.
    pub(crate) fn insert(&mut self, position: InsertPosition, mut entry: ResolutionEntry) -> EntryId {
        let id = EntryId(self.entries.len());
        entry.generation = self.generation;
        let name = entry.package.cpn().clone();
        self.entries.push(entry);

        let at = match position {
            InsertPosition::Front => 0,
            InsertPosition::End => self.order.len(),
            InsertPosition::Before(next) => self
                .order
                .iter()
                .position(|&e| e == next)
                .unwrap_or(self.order.len()),
        };
        self.order.insert(at, id);
        self.index.entry(name).or_default().push(id);
        id
    }

    /// Position directly after `id`.
    pub fn after(&self, id: EntryId) -> InsertPosition {
        match self.order.iter().position(|&e| e == id) {
            Some(i) if i + 1 < self.order.len() => InsertPosition::Before(self.order[i + 1]),
            _ => InsertPosition::End,
        }
    }

    /// Attach `tag` unless the entry already carries it.
    pub(crate) fn add_tag(&mut self, id: EntryId, tag: DepTag) {
        let generation = self.generation;
        let entry = &mut self.entries[id.0];
        if !entry.tags.iter().any(|t| t.tag == tag) {
            entry.tags.push(TagEntry { tag, generation });
        }
    }

    pub(crate) fn set_state(&mut self, id: EntryId, state: EntryState) {
        self.entries[id.0].state = state;
    }

    pub fn get(&self, id: EntryId) -> Option<&ResolutionEntry> {
        self.entries.get(id.0)
    }

    pub(crate) fn entry(&self, id: EntryId) -> &ResolutionEntry {
        &self.entries[id.0]
    }

    /// Entries keyed under `cpn`, in creation order.
    pub fn equal_range(&self, cpn: &Cpn) -> impl Iterator<Item = EntryId> + '_ {
        self.index.get(cpn).into_iter().flatten().copied()
    }

    /// Entries in build order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolutionEntry> {
        self.order.iter().map(|id| &self.entries[id.0])
    }

    pub fn ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
