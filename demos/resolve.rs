//! Example: build an ordered merge list for a slice of the Gentoo tree.
//!
//! The tree has transitive deps, a `|| ()` choice between openssl and
//! libressl (which block each other), multi-slot Python, versioned
//! constraints and USE-conditional dependencies. A few packages are already
//! installed so that the upgrade policy matters.
//!
//! The resolver runs twice: once with `ssl` enabled and the default policy,
//! once without `ssl` and an "as needed" policy loaded from TOML.
//!
//! Set `RUST_LOG=portage_atom_deplist=debug` to watch decisions being made.

use chrono::{Duration, Utc};
use portage_atom::{Cpv, Dep};
use portage_atom_deplist::{
    DepEntry, DepList, DepSpec, InMemoryEnvironment, Options, PackageDeps, PackageMetadata,
};
use tracing_subscriber::EnvFilter;

fn atom(s: &str) -> DepEntry {
    DepEntry::Atom(Dep::parse(s).unwrap())
}

/// Shorthand for a package whose build and runtime deps are the same.
fn pkg(cpv: &str, slot: &str, deps: Vec<DepEntry>) -> PackageMetadata {
    let deps = DepSpec::from_entries(&deps);
    PackageMetadata::new(Cpv::parse(cpv).unwrap(), "gentoo")
        .with_slot(slot)
        .with_dependencies(PackageDeps {
            build: deps.clone(),
            run: deps,
            ..PackageDeps::default()
        })
}

fn pkg_subslot(cpv: &str, slot: &str, subslot: &str, deps: Vec<DepEntry>) -> PackageMetadata {
    let mut meta = pkg(cpv, slot, deps);
    meta.subslot = Some(subslot.into());
    meta
}

fn build_env(use_flags: &[&str]) -> InMemoryEnvironment {
    let mut env = InMemoryEnvironment::new();

    env.add_installable(pkg("sys-libs/zlib-1.2.13", "0", vec![]));
    env.add_installable(pkg("sys-libs/zlib-1.3.1", "0", vec![]));
    env.add_installable(pkg("app-arch/bzip2-1.0.8-r4", "0", vec![]));
    env.add_installable(pkg("dev-libs/expat-2.6.2", "0", vec![]));

    for (version, subslot) in [("3.1.7", "3.1"), ("3.2.1", "3.2")] {
        env.add_installable(pkg_subslot(
            &format!("dev-libs/openssl-{version}"),
            "0",
            subslot,
            vec![atom(">=sys-libs/zlib-1.2.13"), atom("!dev-libs/libressl")],
        ));
    }
    env.add_installable(pkg(
        "dev-libs/libressl-3.9.2",
        "0",
        vec![atom("sys-libs/zlib"), atom("!!dev-libs/openssl")],
    ));

    env.add_installable(pkg(
        "media-libs/libpng-1.6.43",
        "0",
        vec![atom(">=sys-libs/zlib-1.2.13")],
    ));

    let python_deps = vec![
        atom(">=sys-libs/zlib-1.2.13"),
        atom("app-arch/bzip2"),
        DepEntry::UseConditional {
            flag: "xml".into(),
            negate: false,
            children: vec![atom("dev-libs/expat")],
        },
    ];
    env.add_installable(pkg("dev-lang/python-3.11.9", "3.11", python_deps.clone()));
    env.add_installable(pkg("dev-lang/python-3.12.4", "3.12", python_deps));

    env.add_installable(pkg(
        "dev-python/certifi-2024.2.2",
        "0",
        vec![atom("dev-lang/python:*")],
    ));

    env.add_installable(pkg(
        "net-misc/curl-8.7.1",
        "0",
        vec![
            atom(">=sys-libs/zlib-1.2.13"),
            DepEntry::AnyOf(vec![atom("dev-libs/openssl"), atom("dev-libs/libressl")]),
            DepEntry::UseConditional {
                flag: "ssl".into(),
                negate: false,
                children: vec![atom("dev-python/certifi")],
            },
        ],
    ));
    env.add_installable(pkg(
        "app-portage/gentoolkit-0.6.3",
        "0",
        vec![atom("dev-lang/python:3.12"), atom("dev-python/certifi")],
    ));
    env.add_installable(pkg(
        "www-client/firefox-125.0.3",
        "0",
        vec![
            atom("dev-lang/python:3.11"),
            atom("dev-lang/python:3.12"),
            atom("media-libs/libpng"),
            atom(">=dev-libs/openssl-3.2.0:0="),
        ],
    ));

    // What is on the system today.
    let merged = Utc::now() - Duration::days(30);
    for cpv in ["sys-libs/zlib-1.2.13", "dev-libs/openssl-3.1.7"] {
        let id = env.add_installed(pkg(cpv, "0", vec![]));
        env.set_installed_time(&id, merged);
    }

    env.use_config_mut()
        .enabled
        .extend(use_flags.iter().map(|f| f.to_string()));
    env
}

fn resolve_and_print(env: &InMemoryEnvironment, options: Options, targets: &[&str]) {
    let destinations = vec![InMemoryEnvironment::INSTALLED_REPO.to_string()];
    let mut list = DepList::new(env, options);

    for target in targets {
        let spec = DepSpec::parse(target).unwrap();
        if let Err(err) = list.add(&spec, &destinations) {
            eprintln!("  Adding {target} failed: {err}");
            for frame in err.context() {
                eprintln!("    {frame}");
            }
        }
    }

    println!("  Merge list ({} entries):", list.len());
    for entry in &list {
        let by: Vec<_> = entry.tags().map(|t| t.to_string()).collect();
        if by.is_empty() {
            println!("    {entry}");
        } else {
            println!("    {:<55} <- {}", entry.to_string(), by.join(", "));
        }
    }
    if list.has_errors() {
        println!("  The list contains blocks or masked packages.");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let targets = [
        "net-misc/curl",
        "app-portage/gentoolkit",
        "www-client/firefox",
    ];

    println!("Installed: sys-libs/zlib-1.2.13, dev-libs/openssl-3.1.7");
    println!("Targets:   {}", targets.join(" "));

    println!(
        "\n{}\nUSE=\"ssl xml\"  (upgrade always)\n{}",
        "=".repeat(60),
        "=".repeat(60),
    );
    let env = build_env(&["ssl", "xml"]);
    let options = Options {
        dependency_tags: true,
        ..Options::default()
    };
    resolve_and_print(&env, options, &targets);

    println!(
        "\n{}\nUSE=\"xml\"  (upgrade as needed)\n{}",
        "=".repeat(60),
        "=".repeat(60),
    );
    let env = build_env(&["xml"]);
    let options = Options::from_toml_str(
        r#"
        target-type = "set"
        upgrade = "as-needed"
        dependency-tags = true
        "#,
    )
    .unwrap();
    resolve_and_print(&env, options, &targets);
}
