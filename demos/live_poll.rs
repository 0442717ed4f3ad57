use std::env;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use pagepoll::{PacingPolicy, PollerConfig, ResultItem, ResultSink, Runner, SinkFuture};

const DEFAULT_RESULTS_URL: &str = "http://localhost:8080/results";
const DEFAULT_QUERY: &str = "cats";
const DEFAULT_START_OFFSET: u64 = 0;
const DEFAULT_INITIAL_DELAY_MS: f64 = 1_000.0;
const DEFAULT_MAX_DELAY_MS: f64 = 10_000.0;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_DIRECTIVE: &str = "warn";

#[tokio::main]
async fn main() -> Result<()> {
    init_example_tracing();

    let args = ExampleArgs::from_env()?;
    let bar = build_progress_bar();
    bar.println(format!(
        "Polling {} for '{}' from offset {}",
        args.results_url, args.query, args.start_offset
    ));

    let config = args.to_poller_config()?;
    let stats = Arc::new(Mutex::new(RunStats::new(args.start_offset)));
    let sink = SpinnerSink::new(bar.clone(), stats.clone());
    let mut runner = Runner::new(config, sink);

    let run_result = runner.run_until_ctrl_c().await;
    match run_result {
        Ok(()) => {
            bar.finish_with_message("stopped by Ctrl-C");
            if let Ok(stats) = stats.lock() {
                print_summary(&bar, &stats);
            }
        }
        Err(err) => {
            bar.finish_with_message("poll session aborted");
            if let Ok(stats) = stats.lock() {
                print_summary(&bar, &stats);
            }
            return Err(err);
        }
    }

    Ok(())
}

fn init_example_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    pagepoll::init_tracing();
}

fn build_progress_bar() -> ProgressBar {
    let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout_with_hz(12));
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {pos} items ({per_sec}) {msg}",
    )
    .expect("valid progress bar template");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn print_summary(bar: &ProgressBar, stats: &RunStats) {
    let seconds = stats.elapsed().as_secs_f64();
    let rate = if seconds > 0.0 {
        stats.rendered as f64 / seconds
    } else {
        0.0
    };

    bar.println(format!(
        "Rendered {} items (offsets {} -> {}) in {:.2}s [{:.2} items/s]",
        stats.rendered, stats.start_offset, stats.last_position, seconds, rate
    ));
}

struct ExampleArgs {
    results_url: String,
    query: String,
    start_offset: u64,
    initial_delay_ms: f64,
    max_delay_ms: f64,
    request_timeout_secs: u64,
    fault_budget: Option<u32>,
}

impl ExampleArgs {
    fn from_env() -> Result<Self> {
        let results_url = read_env_or_default("PAGEPOLL_RESULTS_URL", DEFAULT_RESULTS_URL);
        let query = read_env_or_default("PAGEPOLL_QUERY", DEFAULT_QUERY);
        let start_offset =
            parse_env_with_default::<u64>("PAGEPOLL_START_OFFSET", DEFAULT_START_OFFSET)?;
        let initial_delay_ms =
            parse_env_with_default::<f64>("PAGEPOLL_INITIAL_DELAY_MS", DEFAULT_INITIAL_DELAY_MS)?;
        let max_delay_ms =
            parse_env_with_default::<f64>("PAGEPOLL_MAX_DELAY_MS", DEFAULT_MAX_DELAY_MS)?;
        let request_timeout_secs = parse_env_with_default::<u64>(
            "PAGEPOLL_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        let fault_budget = parse_optional_env::<u32>("PAGEPOLL_FAULT_BUDGET")?;

        ensure!(
            initial_delay_ms > 0.0,
            "PAGEPOLL_INITIAL_DELAY_MS must be greater than 0"
        );
        ensure!(
            max_delay_ms >= initial_delay_ms,
            "PAGEPOLL_MAX_DELAY_MS must be at least PAGEPOLL_INITIAL_DELAY_MS"
        );
        ensure!(
            request_timeout_secs > 0,
            "PAGEPOLL_REQUEST_TIMEOUT_SECS must be greater than 0"
        );

        Ok(Self {
            results_url,
            query,
            start_offset,
            initial_delay_ms,
            max_delay_ms,
            request_timeout_secs,
            fault_budget,
        })
    }

    fn to_poller_config(&self) -> Result<PollerConfig> {
        let pacing = PacingPolicy::default()
            .with_initial_delay_ms(self.initial_delay_ms)
            .with_max_delay_ms(self.max_delay_ms);

        let mut builder = PollerConfig::builder()
            .results_url(self.results_url.clone())
            .query(self.query.clone())
            .start_offset(self.start_offset)
            .request_timeout(Duration::from_secs(self.request_timeout_secs))
            .pacing(pacing);

        if let Some(budget) = self.fault_budget {
            builder = builder.max_consecutive_faults(budget);
        }

        builder.build()
    }
}

fn read_env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}

fn parse_optional_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}

struct SpinnerSink {
    bar: ProgressBar,
    stats: Arc<Mutex<RunStats>>,
}

impl SpinnerSink {
    fn new(bar: ProgressBar, stats: Arc<Mutex<RunStats>>) -> Self {
        Self { bar, stats }
    }
}

impl ResultSink for SpinnerSink {
    fn render<'a>(&'a mut self, item: ResultItem, position: u64) -> SinkFuture<'a> {
        let rendered = {
            let mut stats = self
                .stats
                .lock()
                .expect("stats mutex poisoned in live poll sink");
            stats.record(position);
            stats.rendered
        };

        self.bar.println(format!("[{position}] {}", item.url()));
        self.bar.set_position(rendered);
        self.bar.set_message(format!("offset {}", position + 1));
        Box::pin(async { Ok(()) })
    }

    fn shutdown<'a>(&'a mut self) -> SinkFuture<'a> {
        self.bar.set_message("flushing");
        Box::pin(async { Ok(()) })
    }
}

struct RunStats {
    start_offset: u64,
    rendered: u64,
    last_position: u64,
    started_at: Instant,
}

impl RunStats {
    fn new(start_offset: u64) -> Self {
        Self {
            start_offset,
            rendered: 0,
            last_position: start_offset.saturating_sub(1),
            started_at: Instant::now(),
        }
    }

    fn record(&mut self, position: u64) {
        self.rendered = self.rendered.saturating_add(1);
        self.last_position = position;
    }

    fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
