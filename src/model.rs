use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Resolved engine executable. Discovery happens in `locate`; the
    /// orchestrator and runner only ever see a final path.
    pub engine_path: PathBuf,
    /// Resolved engine log file, if one was found or supplied.
    pub log_path: Option<PathBuf>,
    /// Hard deadline for a single engine run. `None` disables the limit.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

/// Discriminant for [`Filter`], declared in canonical pipeline order.
///
/// The engine applies filters in command-line order, so the pipeline's meaning
/// must not depend on the order the user happened to toggle them. Sorting by
/// this enum's derived `Ord` is the single source of that ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FilterKind {
    Grayscale,
    Heart,
    Rose,
    Blur,
    Edge,
    Rainbow,
    SingleColour,
}

impl FilterKind {
    pub const ALL: [FilterKind; 7] = [
        FilterKind::Grayscale,
        FilterKind::Heart,
        FilterKind::Rose,
        FilterKind::Blur,
        FilterKind::Edge,
        FilterKind::Rainbow,
        FilterKind::SingleColour,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FilterKind::Grayscale => "Grayscale",
            FilterKind::Heart => "Heart mask",
            FilterKind::Rose => "Rose mask",
            FilterKind::Blur => "Gaussian blur",
            FilterKind::Edge => "Edge detect",
            FilterKind::Rainbow => "Rainbow",
            FilterKind::SingleColour => "Single colour",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RainbowMode {
    Row,
    Column,
}

impl RainbowMode {
    /// Token the engine expects after `--rainbow`.
    pub fn engine_token(self) -> &'static str {
        match self {
            RainbowMode::Row => "r",
            RainbowMode::Column => "c",
        }
    }
}

/// One transform in the pipeline, immutable once constructed. Parameter
/// validation (kernel parity, finiteness) is the front end's job; by the time
/// a `Filter` exists its values are taken as good.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Grayscale,
    Heart,
    Rose,
    Blur { kernel: u32, sigma: f64 },
    Edge { low: f64, high: f64 },
    Rainbow { mode: RainbowMode },
    SingleColour { red: u8, green: u8, blue: u8 },
}

impl Filter {
    pub fn kind(&self) -> FilterKind {
        match self {
            Filter::Grayscale => FilterKind::Grayscale,
            Filter::Heart => FilterKind::Heart,
            Filter::Rose => FilterKind::Rose,
            Filter::Blur { .. } => FilterKind::Blur,
            Filter::Edge { .. } => FilterKind::Edge,
            Filter::Rainbow { .. } => FilterKind::Rainbow,
            Filter::SingleColour { .. } => FilterKind::SingleColour,
        }
    }

    /// Flag token plus parameter tokens, exactly as the engine parses them.
    /// Pure: the same filter always renders the same tokens.
    pub fn cli_args(&self) -> Vec<String> {
        match self {
            Filter::Grayscale => vec!["--gray".into()],
            Filter::Heart => vec!["--heart".into()],
            Filter::Rose => vec!["--rose".into()],
            Filter::Blur { kernel, sigma } => {
                vec!["--blur".into(), kernel.to_string(), format_decimal(*sigma)]
            }
            Filter::Edge { low, high } => {
                vec!["--edge".into(), format_decimal(*low), format_decimal(*high)]
            }
            Filter::Rainbow { mode } => {
                vec!["--rainbow".into(), mode.engine_token().into()]
            }
            Filter::SingleColour { red, green, blue } => vec![
                "--singlecolour".into(),
                red.to_string(),
                green.to_string(),
                blue.to_string(),
            ],
        }
    }

    /// Parse blur parameters with the same rules every front end applies.
    pub fn parse_blur(kernel_text: &str, sigma_text: &str) -> Result<Filter, ParamError> {
        let kernel: u32 = kernel_text
            .trim()
            .parse()
            .map_err(|_| ParamError("Blur kernel must be a positive odd integer".into()))?;
        if kernel == 0 || kernel % 2 == 0 {
            return Err(ParamError(
                "Blur kernel must be a positive odd integer".into(),
            ));
        }
        let sigma: f64 = sigma_text
            .trim()
            .parse()
            .map_err(|_| ParamError("Blur sigma must be a numeric value".into()))?;
        Ok(Filter::Blur { kernel, sigma })
    }

    pub fn parse_edge(low_text: &str, high_text: &str) -> Result<Filter, ParamError> {
        let numeric = |text: &str| {
            text.trim()
                .parse::<f64>()
                .map_err(|_| ParamError("Edge thresholds must be numeric values".into()))
        };
        Ok(Filter::Edge {
            low: numeric(low_text)?,
            high: numeric(high_text)?,
        })
    }

    pub fn parse_rainbow(token: &str) -> Result<Filter, ParamError> {
        match token.trim() {
            "r" => Ok(Filter::Rainbow {
                mode: RainbowMode::Row,
            }),
            "c" => Ok(Filter::Rainbow {
                mode: RainbowMode::Column,
            }),
            _ => Err(ParamError("Rainbow mode must be r (row) or c (column)".into())),
        }
    }

    pub fn parse_single_colour(
        red_text: &str,
        green_text: &str,
        blue_text: &str,
    ) -> Result<Filter, ParamError> {
        let channel = |text: &str| {
            text.trim()
                .parse::<u8>()
                .map_err(|_| ParamError("Colour channels must be integers in 0-255".into()))
        };
        Ok(Filter::SingleColour {
            red: channel(red_text)?,
            green: channel(green_text)?,
            blue: channel(blue_text)?,
        })
    }

    /// Short human-readable form for status lines and reports.
    pub fn describe(&self) -> String {
        match self {
            Filter::Grayscale => "grayscale".into(),
            Filter::Heart => "heart".into(),
            Filter::Rose => "rose".into(),
            Filter::Blur { kernel, sigma } => {
                format!("blur(kernel={kernel}, sigma={})", format_decimal(*sigma))
            }
            Filter::Edge { low, high } => format!(
                "edge(low={}, high={})",
                format_decimal(*low),
                format_decimal(*high)
            ),
            Filter::Rainbow { mode } => format!("rainbow({})", mode.engine_token()),
            Filter::SingleColour { red, green, blue } => {
                format!("singlecolour({red},{green},{blue})")
            }
        }
    }
}

/// A filter parameter that failed validation, carrying the exact message
/// shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ParamError(pub String);

/// Render a decimal parameter for the engine command line. Whole values keep a
/// trailing `.0` so a sigma of 2 still reads `2.0` on the wire, matching what
/// every front end of the engine has always sent. Locale-independent by
/// construction.
pub fn format_decimal(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// One run's worth of work: where to read, where to write, and the filters in
/// canonical pipeline order. Built fresh per run, dropped when the run ends;
/// owns no long-lived resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub filters: Vec<Filter>,
}

impl FilterJob {
    /// Canonicalize a selection: stable-sort into pipeline order, then keep
    /// the first filter of each kind. The one-toggle-per-filter front end can
    /// only produce one of each, so the dedup is a structural guarantee
    /// rather than a user-visible rule.
    pub fn new(input: PathBuf, output: PathBuf, selected: Vec<Filter>) -> Self {
        debug_assert_ne!(input, output, "engine output must be a fresh file");
        let mut filters = selected;
        filters.sort_by_key(Filter::kind);
        filters.dedup_by_key(|f| f.kind());
        Self {
            input,
            output,
            filters,
        }
    }
}

/// Where the run lifecycle currently is. The front end disables the run
/// trigger whenever this is not `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobPhase {
    Idle,
    Preparing,
    Running,
}

/// Summary of one completed engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(default)]
    pub timestamp_utc: String,
    pub run_id: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub filters: Vec<Filter>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Lines of engine output forwarded during the run.
    pub engine_lines: u64,
}

impl RunReport {
    pub fn new(run_id: String, job: FilterJob, duration: Duration, engine_lines: u64) -> Self {
        Self {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
            run_id,
            input: job.input,
            output: job.output,
            filters: job.filters,
            duration,
            engine_lines,
        }
    }
}

/// Events emitted by the controller and consumed by presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    PhaseChanged {
        phase: JobPhase,
    },
    JobStarted {
        run_id: String,
        command: Vec<String>,
    },
    /// One line of the engine's combined output stream, in order, as produced.
    EngineLine {
        run_id: String,
        line: String,
    },
    JobSucceeded {
        // Box to keep JobEvent small; RunReport carries the whole filter list.
        report: Box<RunReport>,
    },
    JobFailed {
        run_id: Option<String>,
        error: String,
    },
    /// Authoritative display state after any artifact transition
    /// (load, run, undo, shutdown).
    ArtifactState {
        source: Option<PathBuf>,
        current: Option<PathBuf>,
        undo_available: bool,
    },
    /// Filtered engine-log lines; the whole file every read, no cursor.
    LogLines(Vec<String>),
    Info(InfoEvent),
}

/// Structured info events for diagnostic-only conditions. These never fail a
/// run; they surface in the log pane or on stderr.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    Saved { path: PathBuf },
    UndoUnavailable,
    CleanupFailed { path: PathBuf, error: String },
    LogUnavailable,
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Saved { path } => format!("Saved: {}", path.display()),
            InfoEvent::UndoUnavailable => "Nothing to undo".to_string(),
            InfoEvent::CleanupFailed { path, error } => {
                format!("Could not remove {}: {error}", path.display())
            }
            InfoEvent::LogUnavailable => "Engine log file not found".to_string(),
        }
    }
}

/// How the engine subprocess itself went wrong, classified so the controller
/// can decide rollback and the front end can word the alert.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to start engine '{path}': {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("engine exited with code {code}")]
    Failed { code: i32 },
    #[error("engine terminated by a signal")]
    Signalled,
    #[error("engine run exceeded {limit:?}")]
    TimedOut { limit: Duration },
    #[error("engine i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a run request was rejected or a run failed. Only these ever cross the
/// controller boundary; nothing below surfaces as a raw panic or io::Error.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("no source image loaded")]
    NoSource,
    #[error("no filter selected")]
    NoFilters,
    #[error("a job is already running")]
    Busy,
    #[error("failed to prepare run artifacts: {0}")]
    Prepare(#[source] std::io::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
