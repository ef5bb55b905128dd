//! Collapse `|| ( )` groups of version alternatives into a single atom.
//!
//! `|| ( =cat/foo-1* =cat/foo-2* )` is really "some `cat/foo` in one of
//! these ranges". Resolving it as one atom lets the engine pick the best
//! visible version across all ranges instead of trying each branch in turn.

use crate::dep_spec::{DepSpec, PackageSpec};

/// Merge `children` into one atom with OR-ed version constraints.
///
/// Returns `None` unless every child is a plain atom on the same
/// category/package that carries a version and no slot, USE or repository
/// restriction.
pub fn rewrite_ranges<'a, I>(children: I) -> Option<PackageSpec>
where
    I: IntoIterator<Item = &'a DepSpec>,
{
    let mut first: Option<&PackageSpec> = None;
    let mut versions = Vec::new();

    for child in children {
        let DepSpec::Atom(atom) = child else {
            return None;
        };
        let dep = atom.dep();
        if atom.versions().is_empty()
            || dep.slot_dep.is_some()
            || dep.repo.is_some()
            || atom.has_use_requirements()
            || atom.tag().is_some()
        {
            return None;
        }
        match first {
            Some(f) if f.cpn() != atom.cpn() => return None,
            Some(_) => {}
            None => first = Some(atom),
        }
        versions.extend(atom.versions().iter().cloned());
    }

    first.map(|f| PackageSpec::with_version_alternatives(f.dep().clone(), versions))
}
