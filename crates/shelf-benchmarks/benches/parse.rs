//! Metadata, constraint, configuration and lockfile parsing benchmarks
//!
//! Benchmarks the text formats shelf reads on every run: cookbook
//! `metadata.rb`/`metadata.json`, constraint strings, `config.toml` and the
//! lockfile, plus root fingerprinting.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shelf_benchmarks::criterion_config;
use shelf_config::toml::parse_config_toml;
use shelf_core::types::{ConstraintSet, CookbookMetadata, Dependency, LocationSpec, Version};
use shelf_lockfile::{fingerprint, LockEntry, Lockfile};
use std::str::FromStr;

/// Benchmark cookbook metadata parsing
fn bench_metadata_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("metadata_parsing");
    group.measurement_time(std::time::Duration::from_secs(5));

    for dep_count in [10usize, 50, 200].iter() {
        group.throughput(Throughput::Elements(*dep_count as u64));

        let ruby = create_metadata_rb(*dep_count);
        group.bench_with_input(BenchmarkId::new("metadata_rb", dep_count), &ruby, |b, content| {
            b.iter(|| black_box(CookbookMetadata::from_ruby_str(content, None).unwrap()));
        });

        let json = CookbookMetadata::from_ruby_str(&ruby, None)
            .unwrap()
            .to_json_pretty()
            .unwrap();
        group.bench_with_input(BenchmarkId::new("metadata_json", dep_count), &json, |b, content| {
            b.iter(|| black_box(CookbookMetadata::from_json_str(content).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark version and constraint parsing
fn bench_constraint_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("constraint_parsing");

    group.bench_function("version", |b| {
        let versions = create_version_strings(1000);
        let mut index = 0;

        b.iter(|| {
            let version = &versions[index % versions.len()];
            index += 1;
            black_box(Version::from_str(version))
        });
    });

    group.bench_function("constraint_set", |b| {
        let constraints = create_constraint_strings(1000);
        let mut index = 0;

        b.iter(|| {
            let text = &constraints[index % constraints.len()];
            index += 1;
            black_box(ConstraintSet::parse(text))
        });
    });

    group.finish();
}

/// Benchmark configuration file parsing
fn bench_config_parsing(c: &mut Criterion) {
    let content = r#"
[site]
url = "https://supermarket.example.com/api/v1"

[chef_server]
url = "https://chef.example.com/organizations/ops"
client_name = "ci"

[network]
timeout_secs = 30
max_retries = 3

[resolver]
max_concurrent_fetches = 8
prefetch = true
"#;

    c.bench_function("config_toml", |b| {
        b.iter(|| black_box(parse_config_toml(content).unwrap()));
    });
}

/// Benchmark lockfile serialization and root fingerprinting
fn bench_lockfile(c: &mut Criterion) {
    let mut group = c.benchmark_group("lockfile");

    for entry_count in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*entry_count as u64));

        let roots = create_roots(*entry_count);
        let lockfile = create_lockfile(&roots);
        let text = lockfile.write().unwrap();

        group.bench_with_input(BenchmarkId::new("write", entry_count), &lockfile, |b, lockfile| {
            b.iter(|| black_box(lockfile.write().unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("read", entry_count), &text, |b, text| {
            b.iter(|| black_box(Lockfile::read(text).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("fingerprint", entry_count), &roots, |b, roots| {
            b.iter(|| black_box(fingerprint(roots)));
        });
    }

    group.finish();
}

// Helper functions for benchmark setup

fn create_metadata_rb(dep_count: usize) -> String {
    let mut content = String::from(
        "name 'benchmark'\nmaintainer 'Ops'\nlicense 'Apache-2.0'\ndescription 'Benchmark cookbook'\nversion '1.2.3'\n\n",
    );
    let operators = [">=", "~>", "=", "<"];
    for i in 0..dep_count {
        content.push_str(&format!(
            "depends 'dependency-{}', '{} {}.{}'\n",
            i,
            operators[i % operators.len()],
            i % 5 + 1,
            i % 10
        ));
    }
    content
}

fn create_version_strings(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| match i % 3 {
            0 => format!("{}.{}.{}", i / 100, (i / 10) % 10, i % 10),
            1 => format!("{}.{}", i / 100, (i / 10) % 10),
            _ => format!("{}.{}.{}-rc.{}", i / 100, (i / 10) % 10, i % 10, i % 4),
        })
        .collect()
}

fn create_constraint_strings(count: usize) -> Vec<String> {
    let patterns = ["~> {}.{}", ">= {}.{}, < {}.0", "= {}.{}.0", "{}.{}"];
    (0..count)
        .map(|i| {
            let major = i % 9 + 1;
            let minor = i % 10;
            match patterns[i % patterns.len()] {
                "~> {}.{}" => format!("~> {}.{}", major, minor),
                ">= {}.{}, < {}.0" => format!(">= {}.{}, < {}.0", major, minor, major + 1),
                "= {}.{}.0" => format!("= {}.{}.0", major, minor),
                _ => format!("{}.{}", major, minor),
            }
        })
        .collect()
}

fn create_roots(count: usize) -> Vec<Dependency> {
    (0..count)
        .map(|i| {
            let dependency = Dependency::parse(format!("cookbook-{}", i), &format!("~> {}.0", i % 7 + 1)).unwrap();
            if i % 5 == 0 {
                dependency.with_location(LocationSpec::path(format!("/srv/cookbooks/cookbook-{}", i)))
            } else {
                dependency
            }
        })
        .collect()
}

fn create_lockfile(roots: &[Dependency]) -> Lockfile {
    let site = LocationSpec::site("https://supermarket.example.com/api/v1");
    let entries = roots
        .iter()
        .enumerate()
        .map(|(i, root)| {
            let source = root.location.clone().unwrap_or_else(|| site.clone());
            LockEntry::new(root.name.clone(), Version::new((i % 7 + 1) as u64, 2, 0), &source)
        })
        .collect();
    Lockfile::new(roots, entries)
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_metadata_parsing, bench_constraint_parsing, bench_config_parsing, bench_lockfile
}
criterion_main!(benches);
