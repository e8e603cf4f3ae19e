//! Progress reporting for long-running query stages.
//!
//! The pipeline emits one event per stage; reporters render them for a
//! human on stderr, as JSON lines for machine consumers, or not at all.

use serde::Serialize;

/// Pipeline stage notifications, in emission order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum QueryProgressEvent {
    Expanding,
    Searching { query: String },
    Grouping { hits: usize },
    Fetching { threads: usize },
    Reranking { pool: usize },
    RerankSkipped,
    BuildingContext { emails: usize },
    Generating,
    Done { citations: usize },
}

pub trait QueryProgressReporter: Send + Sync {
    fn report(&self, event: &QueryProgressEvent);
}

/// Human-readable stage lines on stderr.
pub struct StderrProgress;

impl QueryProgressReporter for StderrProgress {
    fn report(&self, event: &QueryProgressEvent) {
        use QueryProgressEvent::*;
        match event {
            Expanding => eprintln!("expanding query..."),
            Searching { query } => eprintln!("searching: {}", query),
            Grouping { hits } => eprintln!("grouping {} hits into threads", hits),
            Fetching { threads } => eprintln!("fetching {} threads", threads),
            Reranking { pool } => eprintln!("reranking {} candidates", pool),
            RerankSkipped => eprintln!("rerank skipped (pool too small or disabled)"),
            BuildingContext { emails } => eprintln!("building context from {} emails", emails),
            Generating => eprintln!("generating answer..."),
            Done { citations } => eprintln!("done ({} citations)", citations),
        }
    }
}

/// One JSON object per line on stderr, for driving programs.
pub struct JsonProgress;

impl QueryProgressReporter for JsonProgress {
    fn report(&self, event: &QueryProgressEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            eprintln!("{}", line);
        }
    }
}

/// Silent reporter.
pub struct NoProgress;

impl QueryProgressReporter for NoProgress {
    fn report(&self, _event: &QueryProgressEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, silent otherwise.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(self) -> Box<dyn QueryProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
