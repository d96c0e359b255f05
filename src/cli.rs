use crate::engine::command::build_command;
use crate::engine::EngineRunner;
use crate::model::{Filter, FilterJob, JobEvent, RunReport, RunnerConfig};
use anyhow::{Context, Result};
use clap::Parser;
use rand::RngCore;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for the stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "filterpipe",
    version,
    about = "Pipeline front end for the image filter engine, with optional TUI"
)]
pub struct Cli {
    /// Source image to load on startup
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Destination image for headless runs (written directly, no undo)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Engine binary; found by walking up from the working directory when omitted
    #[arg(long)]
    pub engine: Option<PathBuf>,

    /// Engine log file; discovered like --engine when omitted
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Hard deadline for one engine run; 0 disables the limit
    #[arg(long, default_value = "120s")]
    pub engine_timeout: humantime::Duration,

    /// Print the run report as JSON and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print a text run report and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Default destination for the interactive save action
    #[arg(long)]
    pub save_to: Option<PathBuf>,

    /// Convert to grayscale
    #[arg(long)]
    pub gray: bool,

    /// Apply the heart mask
    #[arg(long)]
    pub heart: bool,

    /// Apply the rose mask
    #[arg(long)]
    pub rose: bool,

    /// Gaussian blur: kernel must be a positive odd integer
    #[arg(long, num_args = 2, value_names = ["KERNEL", "SIGMA"])]
    pub blur: Option<Vec<String>>,

    /// Edge detection between a low and a high threshold
    #[arg(long, num_args = 2, value_names = ["LOW", "HIGH"])]
    pub edge: Option<Vec<String>>,

    /// Rainbow gradient, by row (r) or column (c)
    #[arg(long, value_name = "r|c")]
    pub rainbow: Option<String>,

    /// Tint with a single colour, channels 0-255
    #[arg(long, num_args = 3, value_names = ["RED", "GREEN", "BLUE"])]
    pub singlecolour: Option<Vec<String>>,
}

pub async fn run(args: Cli) -> Result<()> {
    if args.json || args.text {
        return run_headless(args).await;
    }

    #[cfg(feature = "tui")]
    {
        crate::tui::run(args).await
    }
    #[cfg(not(feature = "tui"))]
    {
        // Fallback when built without TUI support.
        run_headless(args).await
    }
}

/// Generate a random id for one engine run.
pub(crate) fn gen_run_id() -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    u64::from_le_bytes(b).to_string()
}

/// Resolve engine, log, and timeout settings from CLI arguments, falling back
/// to the upward search for anything not given explicitly.
pub fn build_config(args: &Cli) -> Result<RunnerConfig> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let engine_path = match &args.engine {
        Some(path) => path.clone(),
        None => crate::locate::find_engine(&cwd).with_context(|| {
            format!(
                "could not find the engine at cpp/main in or above {}; pass --engine",
                cwd.display()
            )
        })?,
    };
    let log_path = args
        .log_file
        .clone()
        .or_else(|| crate::locate::find_log(&cwd));
    Ok(RunnerConfig {
        engine_path,
        log_path,
        timeout: effective_timeout(args.engine_timeout.into()),
    })
}

fn effective_timeout(raw: Duration) -> Option<Duration> {
    if raw.is_zero() {
        None
    } else {
        Some(raw)
    }
}

/// Build the filter selection from CLI flags, applying the same parameter
/// rules the interactive form enforces.
pub fn selection_from_args(args: &Cli) -> Result<Vec<Filter>> {
    let mut filters = Vec::new();
    if args.gray {
        filters.push(Filter::Grayscale);
    }
    if args.heart {
        filters.push(Filter::Heart);
    }
    if args.rose {
        filters.push(Filter::Rose);
    }
    if let Some(raw) = &args.blur {
        filters.push(Filter::parse_blur(&raw[0], &raw[1])?);
    }
    if let Some(raw) = &args.edge {
        filters.push(Filter::parse_edge(&raw[0], &raw[1])?);
    }
    if let Some(token) = &args.rainbow {
        filters.push(Filter::parse_rainbow(token)?);
    }
    if let Some(raw) = &args.singlecolour {
        filters.push(Filter::parse_single_colour(&raw[0], &raw[1], &raw[2])?);
    }
    Ok(filters)
}

/// One-shot mode: run a single job straight to `--output` and print a report.
/// No temp rotation and no undo; the caller named the destination.
async fn run_headless(args: Cli) -> Result<()> {
    let cfg = build_config(&args)?;
    let input = args
        .input
        .clone()
        .context("--input is required in headless mode")?;
    let output = args
        .output
        .clone()
        .context("--output is required in headless mode")?;
    let selection = selection_from_args(&args)?;
    if selection.is_empty() {
        anyhow::bail!("select at least one filter flag (see --help)");
    }
    if !input.is_file() {
        anyhow::bail!("input image not found: {}", input.display());
    }
    if input == output {
        anyhow::bail!("--output must differ from --input");
    }

    let (out_tx, out_handle) = spawn_output_writer();

    let job = FilterJob::new(input, output, selection);
    let argv = build_command(&cfg.engine_path, &job);
    let run_id = gen_run_id();

    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<JobEvent>();
    let started = std::time::Instant::now();
    let timeout = cfg.timeout;
    let task_argv = argv.clone();
    let task_run_id = run_id.clone();
    let engine_task = tokio::spawn(async move {
        EngineRunner::new(timeout)
            .run(&task_argv, &task_run_id, &evt_tx)
            .await
    });

    // Stream engine output to stderr while the run is in flight. The loop
    // ends when the engine task drops its sender.
    while let Some(event) = evt_rx.recv().await {
        if let JobEvent::EngineLine { line, .. } = event {
            let _ = out_tx.send(OutputLine::Stderr(line));
        }
    }

    let stats = engine_task
        .await
        .context("engine task failed")?
        .with_context(|| format!("engine run {run_id} failed"))?;

    let report = RunReport::new(run_id, job, started.elapsed(), stats.lines_forwarded);

    if args.json {
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&report)?));
    } else {
        for line in crate::text_report::build_text_report(&report).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
        // Text mode also surfaces the engine log when one is resolvable.
        if let Some(path) = &cfg.log_path {
            if let Ok(lines) = crate::engine::log_tail::read_log(path) {
                for line in lines {
                    let _ = out_tx.send(OutputLine::Stderr(line));
                }
            }
        }
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RainbowMode;

    fn parse(argv: &[&str]) -> Cli {
        Cli::parse_from(argv)
    }

    #[test]
    fn filter_flags_map_to_selection() {
        let args = parse(&[
            "filterpipe",
            "--gray",
            "--blur",
            "5",
            "2.0",
            "--rainbow",
            "c",
        ]);
        assert_eq!(
            selection_from_args(&args).unwrap(),
            vec![
                Filter::Grayscale,
                Filter::Blur {
                    kernel: 5,
                    sigma: 2.0
                },
                Filter::Rainbow {
                    mode: RainbowMode::Column
                },
            ]
        );
    }

    #[test]
    fn no_flags_is_an_empty_selection() {
        let args = parse(&["filterpipe"]);
        assert!(selection_from_args(&args).unwrap().is_empty());
    }

    #[test]
    fn even_blur_kernel_is_rejected() {
        let args = parse(&["filterpipe", "--blur", "4", "2.0"]);
        let err = selection_from_args(&args).unwrap_err();
        assert!(err.to_string().contains("positive odd integer"));
    }

    #[test]
    fn rainbow_token_is_validated() {
        let args = parse(&["filterpipe", "--rainbow", "diagonal"]);
        assert!(selection_from_args(&args).is_err());
    }

    #[test]
    fn colour_channels_are_validated() {
        let args = parse(&["filterpipe", "--singlecolour", "300", "0", "0"]);
        assert!(selection_from_args(&args).is_err());
    }

    #[test]
    fn default_timeout_is_two_minutes_and_zero_disables() {
        let args = parse(&["filterpipe"]);
        assert_eq!(
            effective_timeout(args.engine_timeout.into()),
            Some(Duration::from_secs(120))
        );

        let args = parse(&["filterpipe", "--engine-timeout", "0s"]);
        assert_eq!(effective_timeout(args.engine_timeout.into()), None);
    }
}
