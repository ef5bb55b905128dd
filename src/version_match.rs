//! Atom matching.
//!
//! [`version_matches`] implements the PMS version operators
//! ([PMS 8.3.2](https://projects.gentoo.org/pms/latest/pms.html#x1-830008.3.2)).
//! [`package_matches`] builds on it to test a whole [`PackageSpec`] (version
//! alternatives, slot, sub-slot, repository and USE requirements) against a
//! concrete package.

use std::cmp::Ordering;

use portage_atom::{Operator, UseDepKind, Version};

use crate::dep_spec::PackageSpec;
use crate::environment::Environment;
use crate::package::{PackageId, PackageMetadata};

/// Test whether `candidate` satisfies the version constraint `op constraint`.
///
/// | Operator | Meaning |
/// |----------|---------|
/// | `<`  | candidate is strictly less than constraint |
/// | `<=` | candidate is less than or equal to constraint |
/// | `=`  | candidate is exactly equal to constraint (including revision) |
/// | `>=` | candidate is greater than or equal to constraint |
/// | `>`  | candidate is strictly greater than constraint |
/// | `~`  | candidate has the same base version, ignoring revision |
///
/// When `constraint.glob` is `true` (the `=cat/pkg-1.2*` form), `=` performs
/// prefix matching through the [`Version`] ordering.
pub fn version_matches(candidate: &Version, op: &Operator, constraint: &Version) -> bool {
    match op {
        Operator::Less => candidate < constraint,
        Operator::LessOrEqual => candidate <= constraint,
        // Version::cmp handles `=*` prefix matching via glob_cmp.
        Operator::Equal => candidate.cmp(constraint) == Ordering::Equal,
        Operator::GreaterOrEqual => candidate >= constraint,
        Operator::Greater => candidate > constraint,
        Operator::Approximate => candidate.base() == constraint.base(),
    }
}

/// Strip the operator from a version.
pub(crate) fn bare_version(v: &Version) -> Version {
    Version {
        op: None,
        numbers: v.numbers.clone(),
        letter: v.letter,
        suffixes: v.suffixes.clone(),
        revision: v.revision.clone(),
        glob: v.glob,
    }
}

/// Whether `candidate` satisfies any of the spec's version constraints.
/// Unversioned specs match everything.
pub fn spec_version_matches(spec: &PackageSpec, candidate: &Version) -> bool {
    let versions = spec.versions();
    versions.is_empty()
        || versions.iter().any(|v| {
            let op = v.op.unwrap_or(Operator::Equal);
            version_matches(candidate, &op, &bare_version(v))
        })
}

/// Resolve USE requirements into `(flag, must_be_enabled)` pairs.
///
/// Conditional forms (`flag?`, `!flag?`, `flag=`, `!flag=`) are evaluated
/// against `consumer`, the package whose dependency is being resolved.
/// Constraints that are inactive for the consumer are omitted.
fn use_requirements<E: Environment + ?Sized>(
    env: &E,
    spec: &PackageSpec,
    consumer: Option<&PackageId>,
) -> Vec<(String, bool)> {
    let Some(use_deps) = &spec.dep().use_deps else {
        return Vec::new();
    };
    let mut constraints = Vec::new();
    for ud in use_deps {
        let parent_on = || env.query_use(&ud.flag, consumer);
        match ud.kind {
            UseDepKind::Enabled => constraints.push((ud.flag.clone(), true)),
            UseDepKind::Disabled => constraints.push((ud.flag.clone(), false)),
            UseDepKind::Conditional => {
                if parent_on() {
                    constraints.push((ud.flag.clone(), true));
                }
            }
            UseDepKind::ConditionalInverse => {
                if !parent_on() {
                    constraints.push((ud.flag.clone(), false));
                }
            }
            UseDepKind::Equal => constraints.push((ud.flag.clone(), parent_on())),
            UseDepKind::EqualInverse => constraints.push((ud.flag.clone(), !parent_on())),
        }
    }
    constraints
}

/// Check whether a spec matches a concrete package.
///
/// Tests category/package, version alternatives, slot, sub-slot,
/// repository and USE requirements. USE state of the candidate comes from
/// [`Environment::query_use`].
pub fn package_matches<E: Environment + ?Sized>(
    env: &E,
    spec: &PackageSpec,
    pkg: &PackageId,
    meta: &PackageMetadata,
    consumer: Option<&PackageId>,
) -> bool {
    if spec.cpn() != pkg.cpn() {
        return false;
    }
    if !spec_version_matches(spec, &pkg.cpv.version) {
        return false;
    }

    let (slot, subslot) = spec.slot_requirement();
    if slot.is_some_and(|s| s != meta.slot) {
        return false;
    }
    if let Some(required) = subslot {
        if meta.subslot.as_deref() != Some(required) {
            return false;
        }
    }

    if let Some(required_repo) = &spec.dep().repo {
        if *required_repo != pkg.repo {
            return false;
        }
    }

    use_requirements(env, spec, consumer)
        .iter()
        .all(|(flag, enabled)| env.query_use(flag, Some(pkg)) == *enabled)
}

/// Whether the version is a live one (`9999`, `99999999`, ...).
pub fn is_scm_version(v: &Version) -> bool {
    let text = bare_version(v).to_string();
    let lead: &str = text.split(['.', '_', '-']).next().unwrap_or_default();
    lead.len() >= 4 && lead.chars().all(|c| c == '9')
}

/// Whether the package name marks a live package (`foo-svn`, `foo-live`, ...).
pub fn is_scm_name(package: &str) -> bool {
    ["-darcs", "-live", "-cvs", "-svn"]
        .iter()
        .any(|suffix| package.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::InMemoryEnvironment;
    use portage_atom::Cpv;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn vg(s: &str) -> Version {
        let mut ver = v(s);
        ver.glob = true;
        ver
    }

    #[test]
    fn operators() {
        use Operator::*;
        let cases = [
            ("1.2.3", Less, "1.2.4", true),
            ("1.2.3", Less, "1.2.3", false),
            ("1.2.3", LessOrEqual, "1.2.3", true),
            ("1.2.4", LessOrEqual, "1.2.3", false),
            ("1.2.3-r1", Equal, "1.2.3", false),
            ("1.2.3-r1", Equal, "1.2.3-r1", true),
            ("1.2.2", GreaterOrEqual, "1.2.3", false),
            ("1.2.3_p1", Greater, "1.2.3", true),
            ("1.2.3_rc1", Less, "1.2.3", true),
            ("1.2.3-r1", Approximate, "1.2.3", true),
            ("1.2.4", Approximate, "1.2.3", false),
        ];
        for (cand, op, cons, expected) in cases {
            assert_eq!(
                version_matches(&v(cand), &op, &v(cons)),
                expected,
                "{cand} {op} {cons}"
            );
        }
    }

    #[test]
    fn glob_prefix() {
        assert!(version_matches(&v("1.75.0"), &Operator::Equal, &vg("1.75")));
        assert!(!version_matches(&v("1.7"), &Operator::Equal, &vg("1.75")));
        assert!(version_matches(&v("1.2.3a"), &Operator::Equal, &vg("1.2.3")));
    }

    #[test]
    fn alternatives_match_any() {
        let spec = PackageSpec::with_version_alternatives(
            portage_atom::Dep::parse("cat/foo").unwrap(),
            vec![
                Version { op: Some(Operator::Less), ..v("1") },
                Version { op: Some(Operator::GreaterOrEqual), ..v("3") },
            ],
        );
        assert!(spec_version_matches(&spec, &v("0.5")));
        assert!(!spec_version_matches(&spec, &v("2")));
        assert!(spec_version_matches(&spec, &v("3.1")));
    }

    fn env_with(meta: PackageMetadata) -> (InMemoryEnvironment, PackageId) {
        let mut env = InMemoryEnvironment::new();
        let id = meta.id();
        env.add_installable(meta);
        (env, id)
    }

    #[test]
    fn slot_repo_and_use() {
        let meta = PackageMetadata::new(Cpv::parse("cat/foo-2").unwrap(), "repo")
            .with_slot("2")
            .with_use_flags(["ssl"]);
        let (env, id) = env_with(meta.clone());
        let check = |s: &str| package_matches(&env, &PackageSpec::parse(s).unwrap(), &id, &meta, None);

        assert!(check("cat/foo:2"));
        assert!(!check("cat/foo:1"));
        assert!(check("cat/foo::repo"));
        assert!(!check("cat/foo::other"));
        assert!(check(">=cat/foo-2[ssl]"));
        assert!(!check("cat/foo[-ssl]"));
        assert!(!check("cat/bar"));
    }

    #[test]
    fn conditional_use_follows_consumer() {
        let mut env = InMemoryEnvironment::new();
        let consumer = PackageMetadata::new(Cpv::parse("cat/app-1").unwrap(), "repo")
            .with_use_flags(["gtk"]);
        let target = PackageMetadata::new(Cpv::parse("cat/lib-1").unwrap(), "repo");
        env.add_installable(consumer.clone());
        env.add_installable(target.clone());

        let spec = PackageSpec::parse("cat/lib[gtk?]").unwrap();
        let consumer_id = consumer.id();
        assert!(!package_matches(&env, &spec, &target.id(), &target, Some(&consumer_id)));
        assert!(package_matches(&env, &spec, &target.id(), &target, None));
    }

    #[test]
    fn scm_detection() {
        assert!(is_scm_version(&v("9999")));
        assert!(is_scm_version(&v("99999999")));
        assert!(!is_scm_version(&v("999")));
        assert!(!is_scm_version(&v("1.9999")));
        assert!(is_scm_name("foo-svn"));
        assert!(is_scm_name("foo-live"));
        assert!(!is_scm_name("svnkit"));
    }
}
