use criterion::{Criterion, criterion_group, criterion_main};
use strictenv::{EnvLoader, TargetEnv};
use tempfile::TempDir;

fn bench_load(c: &mut Criterion) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let env_path = dir.path().join(".env");
    std::fs::write(&env_path, make_env_content(2_000)).expect("failed to write bench file");

    c.bench_function("load_in_memory", |b| {
        b.iter(|| {
            let mut loader = EnvLoader::new()
                .path(&env_path)
                .target(TargetEnv::memory());
            loader.load().expect("load should succeed")
        });
    });
}

fn make_env_content(entries: usize) -> String {
    let mut content = String::with_capacity(entries * 24);
    content.push_str("BASE=value\n");
    for idx in 0..entries {
        content.push_str("KEY_");
        content.push_str(&idx.to_string());
        content.push_str("=${BASE}-");
        content.push_str(&idx.to_string());
        content.push('\n');
    }
    content
}

criterion_group!(benches, bench_load);
criterion_main!(benches);
