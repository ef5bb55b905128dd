//! Dependency specification trees.
//!
//! A [`DepSpec`] is the immutable boolean expression the resolver walks:
//! plain atoms, `( )` groups, `|| ( )` groups, `flag? ( )` conditionals and
//! `!atom` blockers. Trees are usually built from `portage_atom`'s
//! [`DepEntry`] output via [`DepSpec::from_entries`], or parsed directly
//! with [`DepSpec::parse`].

use std::fmt;

use portage_atom::{Cpn, Dep, DepEntry, SlotDep, SlotOperator, UseDepKind, Version};

use crate::error::ParseError;
use crate::package::PackageId;
use crate::version_match::bare_version;

/// Why an entry is in the merge list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepTag {
    /// Requested as part of a named set, e.g. `world` from `/var/lib/portage/world`.
    Set { name: String, source: String },
    /// Pulled in by another package.
    Dependency { package: PackageId },
}

impl fmt::Display for DepTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepTag::Set { name, .. } => write!(f, "@{name}"),
            DepTag::Dependency { package } => write!(f, "{package}"),
        }
    }
}

/// A package atom as seen by the resolver.
///
/// Wraps a [`Dep`] (blocker marker stripped; blocks are expressed by
/// [`DepSpec::Block`]) and adds two things an atom string cannot carry: a
/// [`DepTag`] for the entry it resolves to, and a list of OR-ed version
/// alternatives produced by [`rewrite_ranges`](crate::range_rewriter::rewrite_ranges).
#[derive(Debug, Clone)]
pub struct PackageSpec {
    dep: Dep,
    any_version: Vec<Version>,
    tag: Option<DepTag>,
}

impl PackageSpec {
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let dep = Dep::parse(s).map_err(|e| ParseError::Atom {
            token: s.to_string(),
            message: format!("{e:?}"),
        })?;
        Ok(Self::from_dep(dep))
    }

    pub fn from_dep(mut dep: Dep) -> Self {
        dep.blocker = None;
        Self {
            dep,
            any_version: Vec::new(),
            tag: None,
        }
    }

    /// An atom matching every version of `cpn` that satisfies one of `versions`.
    pub(crate) fn with_version_alternatives(mut dep: Dep, versions: Vec<Version>) -> Self {
        dep.blocker = None;
        dep.version = None;
        Self {
            dep,
            any_version: versions,
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: DepTag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    pub fn cpn(&self) -> &Cpn {
        &self.dep.cpn
    }

    pub fn tag(&self) -> Option<&DepTag> {
        self.tag.as_ref()
    }

    /// Version constraints; more than one means any of them may match.
    pub fn versions(&self) -> &[Version] {
        match &self.dep.version {
            Some(v) => std::slice::from_ref(v),
            None => &self.any_version,
        }
    }

    /// The bare `category/package` atom.
    pub fn package_only(&self) -> Self {
        let mut dep = self.dep.clone();
        dep.version = None;
        dep.slot_dep = None;
        dep.repo = None;
        dep.use_deps = None;
        Self::from_dep(dep)
    }

    pub fn has_use_requirements(&self) -> bool {
        self.dep.use_deps.as_ref().is_some_and(|u| !u.is_empty())
    }

    pub fn without_use_requirements(&self) -> Self {
        let mut spec = self.clone();
        spec.dep.use_deps = None;
        spec
    }

    /// No version, slot, repository or USE restriction.
    pub fn is_unqualified(&self) -> bool {
        self.versions().is_empty()
            && self.dep.slot_dep.is_none()
            && self.dep.repo.is_none()
            && !self.has_use_requirements()
    }

    /// Named slot and sub-slot restriction, if any. `:*` and `:=` restrict nothing.
    pub fn slot_requirement(&self) -> (Option<&str>, Option<&str>) {
        match &self.dep.slot_dep {
            Some(SlotDep::Slot { slot: Some(s), .. }) => {
                (Some(s.slot.as_str()), s.subslot.as_deref())
            }
            _ => (None, None),
        }
    }
}

fn write_version(f: &mut fmt::Formatter<'_>, cpn: Option<&Cpn>, v: &Version) -> fmt::Result {
    let op = v.op.unwrap_or(portage_atom::Operator::Equal);
    write!(f, "{op}")?;
    if let Some(cpn) = cpn {
        write!(f, "{cpn}-")?;
    }
    let mut bare = bare_version(v);
    bare.glob = false;
    write!(f, "{bare}")?;
    if v.glob {
        write!(f, "*")?;
    }
    Ok(())
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.dep.version {
            Some(v) => write_version(f, Some(&self.dep.cpn), v)?,
            None => write!(f, "{}", self.dep.cpn)?,
        }
        match &self.dep.slot_dep {
            Some(SlotDep::Slot { slot: Some(s), op }) => {
                write!(f, ":{}", s.slot)?;
                if let Some(sub) = &s.subslot {
                    write!(f, "/{sub}")?;
                }
                if matches!(op, Some(SlotOperator::Equal)) {
                    write!(f, "=")?;
                }
            }
            Some(SlotDep::Slot {
                slot: None,
                op: Some(SlotOperator::Equal),
            })
            | Some(SlotDep::Operator(SlotOperator::Equal)) => write!(f, ":=")?,
            Some(SlotDep::Operator(SlotOperator::Star)) => write!(f, ":*")?,
            _ => {}
        }
        if !self.any_version.is_empty() {
            write!(f, "[")?;
            for (i, v) in self.any_version.iter().enumerate() {
                if i > 0 {
                    write!(f, "|")?;
                }
                write_version(f, None, v)?;
            }
            write!(f, "]")?;
        }
        if let Some(use_deps) = &self.dep.use_deps {
            if !use_deps.is_empty() {
                write!(f, "[")?;
                for (i, ud) in use_deps.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    match ud.kind {
                        UseDepKind::Enabled => write!(f, "{}", ud.flag)?,
                        UseDepKind::Disabled => write!(f, "-{}", ud.flag)?,
                        UseDepKind::Conditional => write!(f, "{}?", ud.flag)?,
                        UseDepKind::ConditionalInverse => write!(f, "!{}?", ud.flag)?,
                        UseDepKind::Equal => write!(f, "{}=", ud.flag)?,
                        UseDepKind::EqualInverse => write!(f, "!{}=", ud.flag)?,
                    }
                }
                write!(f, "]")?;
            }
        }
        if let Some(repo) = &self.dep.repo {
            write!(f, "::{repo}")?;
        }
        Ok(())
    }
}

/// A node of a dependency specification tree.
#[derive(Debug, Clone)]
pub enum DepSpec {
    Atom(PackageSpec),
    /// Every child is required.
    AllOf(Vec<DepSpec>),
    /// The first child that resolves is used.
    AnyOf(Vec<DepSpec>),
    /// `flag? ( )`, or `!flag? ( )` when `inverse`.
    Conditional {
        flag: String,
        inverse: bool,
        children: Vec<DepSpec>,
    },
    /// The wrapped atom must not end up installed.
    Block(PackageSpec),
}

impl Default for DepSpec {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<PackageSpec> for DepSpec {
    fn from(spec: PackageSpec) -> Self {
        DepSpec::Atom(spec)
    }
}

impl DepSpec {
    /// The empty AND-group; always satisfied.
    pub fn empty() -> Self {
        DepSpec::AllOf(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, DepSpec::AllOf(children) if children.is_empty())
    }

    /// Parse a whitespace separated dependency string such as
    /// `cat/a || ( cat/b >=cat/c-2 ) ssl? ( !cat/d )`.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let mut tokens = s.split_whitespace();
        Ok(DepSpec::AllOf(parse_group(&mut tokens, false)?))
    }

    /// Convert a `portage_atom` dependency tree.
    ///
    /// `^^ ( )` becomes an OR-group. `?? ( )` becomes an OR-group whose
    /// first alternative is empty, so choosing nothing always resolves.
    pub fn from_entries(entries: &[DepEntry]) -> Self {
        DepSpec::AllOf(entries.iter().map(Self::from_entry).collect())
    }

    fn from_entry(entry: &DepEntry) -> Self {
        match entry {
            DepEntry::Atom(dep) if dep.blocker.is_some() => {
                DepSpec::Block(PackageSpec::from_dep(dep.clone()))
            }
            DepEntry::Atom(dep) => DepSpec::Atom(PackageSpec::from_dep(dep.clone())),
            DepEntry::UseConditional {
                flag,
                negate,
                children,
            } => DepSpec::Conditional {
                flag: flag.clone(),
                inverse: *negate,
                children: children.iter().map(Self::from_entry).collect(),
            },
            DepEntry::AnyOf(alternatives) | DepEntry::ExactlyOneOf(alternatives) => {
                DepSpec::AnyOf(alternatives.iter().map(Self::from_entry).collect())
            }
            DepEntry::AtMostOneOf(alternatives) => DepSpec::AnyOf(
                std::iter::once(DepSpec::empty())
                    .chain(alternatives.iter().map(Self::from_entry))
                    .collect(),
            ),
        }
    }

    /// Whether any atom in the tree satisfies `pred`. Blocked atoms are skipped.
    pub fn any_atom(&self, pred: &mut dyn FnMut(&PackageSpec) -> bool) -> bool {
        match self {
            DepSpec::Atom(spec) => pred(spec),
            DepSpec::Block(_) => false,
            DepSpec::AllOf(children)
            | DepSpec::AnyOf(children)
            | DepSpec::Conditional { children, .. } => {
                children.iter().any(|child| child.any_atom(pred))
            }
        }
    }
}

fn parse_group<'a, I>(tokens: &mut I, nested: bool) -> Result<Vec<DepSpec>, ParseError>
where
    I: Iterator<Item = &'a str>,
{
    let mut out = Vec::new();
    while let Some(token) = tokens.next() {
        match token {
            ")" if nested => return Ok(out),
            ")" => return Err(ParseError::Unbalanced),
            "(" => out.push(DepSpec::AllOf(parse_group(tokens, true)?)),
            "||" | "^^" => {
                expect_open(tokens, token)?;
                out.push(DepSpec::AnyOf(parse_group(tokens, true)?));
            }
            "??" => {
                expect_open(tokens, token)?;
                let mut children = vec![DepSpec::empty()];
                children.extend(parse_group(tokens, true)?);
                out.push(DepSpec::AnyOf(children));
            }
            _ if token.ends_with('?') => {
                expect_open(tokens, token)?;
                let flag = &token[..token.len() - 1];
                let (inverse, flag) = match flag.strip_prefix('!') {
                    Some(rest) => (true, rest),
                    None => (false, flag),
                };
                out.push(DepSpec::Conditional {
                    flag: flag.to_string(),
                    inverse,
                    children: parse_group(tokens, true)?,
                });
            }
            _ => {
                let dep = Dep::parse(token).map_err(|e| ParseError::Atom {
                    token: token.to_string(),
                    message: format!("{e:?}"),
                })?;
                if dep.blocker.is_some() {
                    out.push(DepSpec::Block(PackageSpec::from_dep(dep)));
                } else {
                    out.push(DepSpec::Atom(PackageSpec::from_dep(dep)));
                }
            }
        }
    }
    if nested {
        Err(ParseError::Unbalanced)
    } else {
        Ok(out)
    }
}

fn expect_open<'a, I>(tokens: &mut I, after: &str) -> Result<(), ParseError>
where
    I: Iterator<Item = &'a str>,
{
    match tokens.next() {
        Some("(") => Ok(()),
        _ => Err(ParseError::ExpectedGroup(after.to_string())),
    }
}

impl fmt::Display for DepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn children(f: &mut fmt::Formatter<'_>, c: &[DepSpec]) -> fmt::Result {
            write!(f, "(")?;
            for child in c {
                write!(f, " {child}")?;
            }
            write!(f, " )")
        }
        match self {
            DepSpec::Atom(spec) => write!(f, "{spec}"),
            DepSpec::Block(spec) => write!(f, "!{spec}"),
            DepSpec::AllOf(c) => children(f, c),
            DepSpec::AnyOf(c) => {
                write!(f, "|| ")?;
                children(f, c)
            }
            DepSpec::Conditional {
                flag,
                inverse,
                children: c,
            } => {
                write!(f, "{}{flag}? ", if *inverse { "!" } else { "" })?;
                children(f, c)
            }
        }
    }
}
