use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use portage_atom::Cpv;
use portage_atom_deplist::{
    DepList, DepSpec, InMemoryEnvironment, MaskReason, Options, PackageDeps, PackageMetadata,
};

/// `cat/p0` depends on `cat/p1`, which depends on `cat/p2`, and so on.
/// Every package also has a post dependency back on `cat/p0` and an OR-group
/// whose first alternative does not exist.
fn chain(len: usize) -> InMemoryEnvironment {
    let mut env = InMemoryEnvironment::new();
    for i in 0..len {
        let build = if i + 1 < len {
            format!("cat/p{} || ( cat/missing cat/leaf )", i + 1)
        } else {
            "cat/leaf".to_string()
        };
        for v in 1..=3 {
            let meta = PackageMetadata::new(Cpv::parse(&format!("cat/p{i}-{v}")).unwrap(), "gentoo")
                .with_dependencies(PackageDeps {
                    build: DepSpec::parse(&build).unwrap(),
                    post: DepSpec::parse("cat/p0").unwrap(),
                    ..PackageDeps::default()
                });
            env.add_installable(meta);
        }
    }
    env.add_installable(PackageMetadata::new(
        Cpv::parse("cat/leaf-1").unwrap(),
        "gentoo",
    ));
    env.add_installed(PackageMetadata::new(
        Cpv::parse("cat/leaf-1").unwrap(),
        "gentoo",
    ));
    env
}

/// `cat/root` pulls in `width` OR-groups. Each group's first alternative is
/// masked and its second has an installed version.
fn wide(width: usize) -> InMemoryEnvironment {
    let mut env = InMemoryEnvironment::new();
    let groups: Vec<String> = (0..width)
        .map(|i| format!("|| ( cat/masked{i} cat/kept{i} cat/fresh{i} )"))
        .collect();
    env.add_installable(
        PackageMetadata::new(Cpv::parse("cat/root-1").unwrap(), "gentoo").with_dependencies(
            PackageDeps {
                build: DepSpec::parse(&groups.join(" ")).unwrap(),
                ..PackageDeps::default()
            },
        ),
    );
    for i in 0..width {
        let masked = env.add_installable(PackageMetadata::new(
            Cpv::parse(&format!("cat/masked{i}-1")).unwrap(),
            "gentoo",
        ));
        env.mask(&masked, MaskReason::RepositoryMask);
        for name in [format!("cat/kept{i}"), format!("cat/fresh{i}")] {
            env.add_installable(PackageMetadata::new(
                Cpv::parse(&format!("{name}-2")).unwrap(),
                "gentoo",
            ));
        }
        env.add_installed(PackageMetadata::new(
            Cpv::parse(&format!("cat/kept{i}-1")).unwrap(),
            "gentoo",
        ));
    }
    env
}

fn bench_resolve_wide(c: &mut Criterion) {
    let destinations = vec![InMemoryEnvironment::INSTALLED_REPO.to_string()];
    let target = DepSpec::parse("cat/root").unwrap();

    let mut group = c.benchmark_group("resolve_wide");
    for width in [10, 100] {
        let env = wide(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &env, |b, env| {
            b.iter(|| {
                let mut list = DepList::new(env, Options::default());
                list.add(black_box(&target), &destinations).unwrap();
                black_box(list.len())
            })
        });
    }
    group.finish();
}

fn bench_resolve_chain(c: &mut Criterion) {
    let destinations = vec![InMemoryEnvironment::INSTALLED_REPO.to_string()];
    let target = DepSpec::parse("cat/p0").unwrap();

    let mut group = c.benchmark_group("resolve_chain");
    for len in [10, 50, 200] {
        let env = chain(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &env, |b, env| {
            b.iter(|| {
                let mut list = DepList::new(env, Options::default());
                list.add(black_box(&target), &destinations).unwrap();
                black_box(list.len())
            })
        });
    }
    group.finish();
}

fn bench_parse_dep_string(c: &mut Criterion) {
    let deps = ">=sys-libs/zlib-1.2.13 || ( dev-libs/openssl dev-libs/libressl ) \
                ssl? ( dev-python/certifi !dev-libs/foo ) \
                || ( =dev-lang/python-3.11* =dev-lang/python-3.12* ) dev-lang/python:*";

    c.bench_function("parse_dep_string", |b| {
        b.iter(|| black_box(DepSpec::parse(black_box(deps)).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_resolve_chain,
    bench_resolve_wide,
    bench_parse_dep_string
);
criterion_main!(benches);
