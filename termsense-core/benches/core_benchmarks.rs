use criterion::{Criterion, black_box, criterion_group, criterion_main};
use termsense_core::completion::{CommandsProvider, FlagsProvider, HistoryProvider, Matcher};
use termsense_core::history::{HistorySettings, HistoryStore, SearchQuery};
use termsense_core::tokenizer;
use termsense_core::{CompletionEngine, CompletionSettings};
use std::sync::Arc;

const SAMPLE_COMMANDS: &[&str] = &[
    "git status",
    "git log --oneline --graph",
    "docker ps -a",
    "kubectl get pods -n kube-system",
    "ls -la /var/log",
    "tail -f /var/log/syslog",
    "grep -rn TODO src",
    "cargo build --release",
    "ssh deploy@10.0.0.12",
    "systemctl restart nginx",
];

fn populated_history(n: usize) -> HistoryStore {
    let mut history = HistoryStore::new(HistorySettings {
        max_entries: n,
        ignore_duplicates: false,
        ..Default::default()
    });
    for i in 0..n {
        let cmd = format!("{} #{i}", SAMPLE_COMMANDS[i % SAMPLE_COMMANDS.len()]);
        history.add_command(&cmd, Some("bench"));
    }
    history
}

fn bench_history(c: &mut Criterion) {
    c.bench_function("history_add_command", |b| {
        let mut history = HistoryStore::new(HistorySettings {
            ignore_duplicates: false,
            ..Default::default()
        });
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            history.add_command(black_box(&format!("echo {i}")), Some("bench"));
        })
    });

    let history = populated_history(1000);

    c.bench_function("history_search_indexed", |b| {
        let query = SearchQuery::new("kubectl get").in_session("bench").limit(20);
        b.iter(|| history.search_history(black_box(&query)))
    });

    c.bench_function("history_search_full_scan", |b| {
        let query = SearchQuery::new("ube-sys").in_session("bench").limit(20);
        b.iter(|| history.search_history(black_box(&query)))
    });

    c.bench_function("history_recent_commands", |b| {
        b.iter(|| history.recent_commands(black_box(Some("bench")), 200))
    });
}

fn bench_matcher(c: &mut Criterion) {
    let fuzzy = Matcher::new(true, false);
    let prefix = Matcher::new(false, false);

    c.bench_function("matcher_fuzzy", |b| {
        b.iter(|| fuzzy.matches(black_box("kubectl get pods -n kube-system"), black_box("kgp")))
    });

    c.bench_function("matcher_prefix", |b| {
        b.iter(|| prefix.matches(black_box("kubectl get pods"), black_box("kube")))
    });
}

fn bench_completion(c: &mut Criterion) {
    let history = populated_history(500).into_shared();

    let uncached = CompletionEngine::new(CompletionSettings {
        cache_timeout_ms: 0,
        ..Default::default()
    });
    uncached.register_provider(Arc::new(CommandsProvider::new()));
    uncached.register_provider(Arc::new(FlagsProvider::new()));
    uncached.register_provider(Arc::new(HistoryProvider::new(history)));

    c.bench_function("completion_uncached", |b| {
        b.iter(|| tokio_test::block_on(uncached.get_completions(black_box("git s"), 5)))
    });

    let cached = CompletionEngine::default();
    cached.register_provider(Arc::new(CommandsProvider::new()));
    tokio_test::block_on(cached.get_completions("gi", 2));

    c.bench_function("completion_cached", |b| {
        b.iter(|| tokio_test::block_on(cached.get_completions(black_box("gi"), 2)))
    });
}

fn bench_tokenizer(c: &mut Criterion) {
    c.bench_function("tokenizer_split_quoted", |b| {
        b.iter(|| tokenizer::split(black_box(r#"git commit -m "fix the 'quoted' bug" --amend"#)))
    });
}

criterion_group!(
    benches,
    bench_history,
    bench_matcher,
    bench_completion,
    bench_tokenizer,
);
criterion_main!(benches);
