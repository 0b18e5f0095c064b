//! Batch retry, backoff ladder and pacing behavior of the orchestrator,
//! driven by a scripted upstream and a recording sleeper.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use volscan_core::data::{daily_volumes, RequestMatcher, ScriptedClient, UpstreamError};
use volscan_core::retrieval::{RateLimitClassifier, RateLimited, RetrievalConfig};
use volscan_core::{Symbol, SymbolOutcome};
use volscan_runner::{
    BatchOrchestrator, BatchProgress, OrchestratorConfig, RecordingSleeper, RunCompletion, RunReport, SilentProgress,
};

fn syms(names: &[&str]) -> Vec<Symbol> {
    names.iter().map(|n| Symbol::parse(n).unwrap()).collect()
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}

fn secs(list: &[u64]) -> Vec<Duration> {
    list.iter().map(|s| Duration::from_secs(*s)).collect()
}

fn rate_limit() -> UpstreamError {
    UpstreamError::Other("Too Many Requests. Rate limited. Try after a while.".into())
}

fn config(chunk_size: usize, pause_secs: u64) -> OrchestratorConfig {
    OrchestratorConfig {
        chunk_size,
        inter_batch_pause: Duration::from_secs(pause_secs),
        backoff_ladder: secs(&[300, 600, 1200]),
        parallel_within_batch: false,
    }
}

/// Every symbol gets a distinct, valid two-day history.
fn healthy_client(symbols: &[Symbol]) -> ScriptedClient {
    symbols.iter().enumerate().fold(ScriptedClient::new(), |client, (i, s)| {
        let base = 100 + i as u64 * 10;
        client.with_history(s, RequestMatcher::Any, daily_volumes(start(), &[base, base * 3]))
    })
}

fn run_with(
    client: &ScriptedClient,
    sleeper: &RecordingSleeper,
    progress: &dyn BatchProgress,
    cfg: OrchestratorConfig,
    symbols: &[Symbol],
) -> RunReport {
    BatchOrchestrator::new(client, RetrievalConfig::default(), RateLimitClassifier::default(), cfg)
        .with_sleeper(sleeper)
        .with_progress(progress)
        .with_as_of(Utc.with_ymd_and_hms(2024, 6, 12, 21, 0, 0).unwrap())
        .run(symbols)
}

fn tickers(report: &RunReport) -> Vec<&str> {
    report.snapshots.iter().map(|s| s.symbol.as_str()).collect()
}

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl RecordingProgress {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl BatchProgress for RecordingProgress {
    fn on_batch_start(&self, batch: usize, _: usize, attempt: u32, _: usize) {
        self.push(format!("start {batch}#{attempt}"));
    }
    fn on_symbol(&self, _: &SymbolOutcome) {}
    fn on_rate_limited(&self, batch: usize, _: &RateLimited, wait: Option<Duration>) {
        match wait {
            Some(w) => self.push(format!("limited {batch} wait {}", w.as_secs())),
            None => self.push(format!("limited {batch} exhausted")),
        }
    }
    fn on_batch_complete(&self, batch: usize, _: usize, snapshots: usize, _: usize) {
        self.push(format!("done {batch} ({snapshots})"));
    }
    fn on_run_complete(&self, _: &RunReport) {
        self.push("finished".into());
    }
}

// ── Batch retry semantics ────────────────────────────────────────────

#[test]
fn persistent_rate_limit_exhausts_ladder_and_keeps_prior_batches() {
    // batch #1 = AAA, BBB; batch #2 = CCC, DDD; batch #3 = EEE
    let symbols = syms(&["AAA", "BBB", "CCC", "DDD", "EEE"]);
    // CCC would succeed, but DDD is throttled forever; CCC's snapshot from a
    // failed attempt must never appear.
    let healthy: Vec<Symbol> = symbols.iter().filter(|s| s.as_str() != "DDD").cloned().collect();
    let client = healthy_client(&healthy).with_error(&symbols[3], RequestMatcher::Any, rate_limit());

    let sleeper = RecordingSleeper::new();
    let progress = RecordingProgress::default();
    let report = run_with(&client, &sleeper, &progress, config(2, 0), &symbols);

    assert_eq!(tickers(&report), vec!["AAA", "BBB"]);
    assert!(report.skipped.is_empty());
    assert_eq!(report.completion, RunCompletion::LadderExhausted { batch: 1 });
    assert!(report.is_partial());
    assert_eq!(report.batches_completed, 1);
    assert_eq!(report.backoff_waits, secs(&[300, 600, 1200]));
    assert_eq!(sleeper.recorded(), secs(&[300, 600, 1200]));

    // batch #2 attempted four times, batch #3 never
    assert_eq!(client.call_count(&symbols[2]), 4);
    assert_eq!(client.call_count(&symbols[4]), 0);
    assert_eq!(
        progress.events(),
        vec![
            "start 0#1",
            "done 0 (2)",
            "start 1#1",
            "limited 1 wait 300",
            "start 1#2",
            "limited 1 wait 600",
            "start 1#3",
            "limited 1 wait 1200",
            "start 1#4",
            "limited 1 exhausted",
            "finished",
        ]
    );
}

#[test]
fn success_resets_the_ladder() {
    let symbols = syms(&["AAA", "BBB", "CCC"]);
    let throttled_once = |s: &Symbol, client: ScriptedClient| {
        client.with_sequence(
            s,
            RequestMatcher::Any,
            vec![Err(rate_limit()), Ok(daily_volumes(start(), &[10, 20]))],
        )
    };
    let client = ScriptedClient::new()
        .with_history(&symbols[0], RequestMatcher::Any, daily_volumes(start(), &[10, 20]));
    let client = throttled_once(&symbols[1], client);
    let client = throttled_once(&symbols[2], client);

    let sleeper = RecordingSleeper::new();
    let report = run_with(&client, &sleeper, &SilentProgress, config(1, 0), &symbols);

    assert_eq!(report.completion, RunCompletion::Completed);
    assert_eq!(tickers(&report), vec!["AAA", "BBB", "CCC"]);
    // a fresh episode starts again at the first step
    assert_eq!(report.backoff_waits, secs(&[300, 300]));
}

#[test]
fn consecutive_failures_escalate_without_reset() {
    let symbols = syms(&["AAA"]);
    let client = ScriptedClient::new().with_sequence(
        &symbols[0],
        RequestMatcher::Any,
        vec![Err(rate_limit()), Err(rate_limit()), Ok(daily_volumes(start(), &[10, 40]))],
    );
    let sleeper = RecordingSleeper::new();
    let report = run_with(&client, &sleeper, &SilentProgress, config(5, 0), &symbols);

    assert_eq!(report.completion, RunCompletion::Completed);
    assert_eq!(report.backoff_waits, secs(&[300, 600]));
    assert_eq!(tickers(&report), vec!["AAA"]);
}

// ── Pacing ───────────────────────────────────────────────────────────

#[test]
fn pauses_between_batches_but_not_after_the_last() {
    let symbols = syms(&["AAA", "BBB", "CCC"]);
    let client = healthy_client(&symbols);
    let sleeper = RecordingSleeper::new();
    let report = run_with(&client, &sleeper, &SilentProgress, config(1, 1), &symbols);

    assert_eq!(report.batches_completed, 3);
    assert_eq!(sleeper.recorded(), secs(&[1, 1]));
}

#[test]
fn backoff_and_pause_interleave_in_order() {
    let symbols = syms(&["AAA", "BBB", "CCC"]);
    let client = ScriptedClient::new()
        .with_history(&symbols[0], RequestMatcher::Any, daily_volumes(start(), &[1, 2]))
        .with_sequence(
            &symbols[1],
            RequestMatcher::Any,
            vec![Err(rate_limit()), Ok(daily_volumes(start(), &[3, 4]))],
        )
        .with_history(&symbols[2], RequestMatcher::Any, daily_volumes(start(), &[5, 6]));
    let sleeper = RecordingSleeper::new();
    run_with(&client, &sleeper, &SilentProgress, config(1, 1), &symbols);

    assert_eq!(sleeper.recorded(), secs(&[1, 300, 1]));
}

// ── Determinism ──────────────────────────────────────────────────────

#[test]
fn identical_upstream_gives_identical_results() {
    let symbols = syms(&["AAA", "BBB", "CCC", "DDD"]);
    let client = healthy_client(&symbols);
    let sleeper = RecordingSleeper::new();

    let first = run_with(&client, &sleeper, &SilentProgress, config(3, 0), &symbols);
    let second = run_with(&client, &sleeper, &SilentProgress, config(3, 0), &symbols);
    assert_eq!(first.snapshots, second.snapshots);
    assert_eq!(first.snapshots.len(), 4);
}

#[test]
fn parallel_batches_keep_input_order() {
    let names: Vec<String> = (0..24).map(|i| format!("S{i:02}")).collect();
    let symbols: Vec<Symbol> = names.iter().map(|n| Symbol::parse(n).unwrap()).collect();
    let client = healthy_client(&symbols);
    let sleeper = RecordingSleeper::new();
    let cfg = OrchestratorConfig {
        parallel_within_batch: true,
        ..config(10, 0)
    };

    let parallel = run_with(&client, &sleeper, &SilentProgress, cfg, &symbols);
    let sequential = run_with(&client, &sleeper, &SilentProgress, config(10, 0), &symbols);

    assert_eq!(parallel.snapshots, sequential.snapshots);
    let order: Vec<&str> = tickers(&parallel);
    assert_eq!(order, names.iter().map(String::as_str).collect::<Vec<_>>());
}

#[test]
fn parallel_rate_limit_discards_whole_batch() {
    let symbols = syms(&["AAA", "BBB", "CCC", "DDD"]);
    let client = ScriptedClient::new()
        .with_error(&symbols[3], RequestMatcher::Any, rate_limit())
        .with_history(&symbols[0], RequestMatcher::Any, daily_volumes(start(), &[1, 2]))
        .with_history(&symbols[1], RequestMatcher::Any, daily_volumes(start(), &[1, 2]))
        .with_history(&symbols[2], RequestMatcher::Any, daily_volumes(start(), &[1, 2]));
    let sleeper = RecordingSleeper::new();
    let cfg = OrchestratorConfig {
        parallel_within_batch: true,
        backoff_ladder: secs(&[5]),
        ..config(4, 0)
    };

    let report = run_with(&client, &sleeper, &SilentProgress, cfg, &symbols);
    assert!(report.snapshots.is_empty());
    assert_eq!(report.completion, RunCompletion::LadderExhausted { batch: 0 });
    assert_eq!(report.backoff_waits, secs(&[5]));
}
