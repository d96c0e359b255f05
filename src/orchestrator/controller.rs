//! Job lifecycle controller.
//!
//! Owns the single-active-job state machine and the artifact store, and emits
//! events for presentation layers. Every mutation of run state happens on
//! this task: front ends only ever send [`UiCommand`]s and read
//! [`JobEvent`]s, so the artifact store never sees concurrent access.

use crate::artifacts::ArtifactStore;
use crate::cli::gen_run_id;
use crate::engine::command::build_command;
use crate::engine::{log_tail, EngineRunner, EngineStats};
use crate::model::{
    EngineError, Filter, FilterJob, InfoEvent, JobError, JobEvent, JobPhase, RunReport,
    RunnerConfig,
};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Commands emitted by presentation layers to drive the job lifecycle.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    /// Replace the source image. Any committed output is stale and dropped;
    /// the undo snapshot survives until the next run replaces it.
    LoadSource(PathBuf),
    /// Start a run with the given selection, in any order.
    Run(Vec<Filter>),
    Undo,
    /// Copy the latest output to the given path, or to a generated name in
    /// the current directory.
    Save(Option<PathBuf>),
    RefreshLog,
    Quit,
}

/// Handle for the in-flight run task.
struct RunCtx {
    run_id: String,
    job: FilterJob,
    started: Instant,
    handle: Option<tokio::task::JoinHandle<Result<EngineStats, EngineError>>>,
}

/// Enter `Preparing`, stage the artifacts, and hand the command to the engine
/// task. Returns without blocking on the run.
fn start_run(
    cfg: &RunnerConfig,
    store: &mut ArtifactStore,
    source: &Path,
    selection: Vec<Filter>,
    event_tx: &UnboundedSender<JobEvent>,
) -> Result<RunCtx, JobError> {
    let _ = event_tx.send(JobEvent::PhaseChanged {
        phase: JobPhase::Preparing,
    });

    // Chained runs read the latest output; the first run reads the source.
    let input = store.current().unwrap_or(source).to_path_buf();
    store.snapshot_previous(&input).map_err(JobError::Prepare)?;
    let target = store.create_output_target().map_err(JobError::Prepare)?;

    let job = FilterJob::new(input, target, selection);
    let argv = build_command(&cfg.engine_path, &job);
    let run_id = gen_run_id();

    let _ = event_tx.send(JobEvent::JobStarted {
        run_id: run_id.clone(),
        command: argv.clone(),
    });
    let _ = event_tx.send(JobEvent::PhaseChanged {
        phase: JobPhase::Running,
    });

    let timeout = cfg.timeout;
    let events = event_tx.clone();
    let task_run_id = run_id.clone();
    let handle =
        tokio::spawn(
            async move { EngineRunner::new(timeout).run(&argv, &task_run_id, &events).await },
        );

    Ok(RunCtx {
        run_id,
        job,
        started: Instant::now(),
        handle: Some(handle),
    })
}

/// Orchestrate runs, undo, save, and log refreshes based on UI commands, and
/// emit events back to presentation layers. Returns when a quit command (or a
/// closed command channel) has been honored and all temp files are disposed.
pub(crate) async fn run_controller(
    cfg: RunnerConfig,
    initial_source: Option<PathBuf>,
    event_tx: UnboundedSender<JobEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut store = ArtifactStore::new(event_tx.clone());
    let mut source = initial_source;
    let mut run_ctx: Option<RunCtx> = None;
    let mut last_report: Option<RunReport> = None;
    let mut quit_pending = false;

    send_artifact_state(&event_tx, &source, &store);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::LoadSource(path)) => {
                        if run_ctx.is_some() {
                            send_rejection(&event_tx, JobError::Busy);
                        } else if !path.is_file() {
                            let _ = event_tx.send(JobEvent::Info(InfoEvent::Message(format!(
                                "Cannot load {}: not a readable file",
                                path.display()
                            ))));
                        } else {
                            store.clear_current();
                            source = Some(path);
                            send_artifact_state(&event_tx, &source, &store);
                        }
                    }
                    Some(UiCommand::Run(selection)) => {
                        // The Idle gate: exactly one run at a time, and a run
                        // needs both a source and a selection. The missing
                        // source is reported ahead of the empty selection.
                        if run_ctx.is_some() {
                            send_rejection(&event_tx, JobError::Busy);
                        } else if source.is_none() {
                            send_rejection(&event_tx, JobError::NoSource);
                        } else if selection.is_empty() {
                            send_rejection(&event_tx, JobError::NoFilters);
                        } else if let Some(src) = &source {
                            match start_run(&cfg, &mut store, src, selection, &event_tx) {
                                Ok(ctx) => run_ctx = Some(ctx),
                                Err(err) => {
                                    send_rejection(&event_tx, err);
                                    let _ = event_tx.send(JobEvent::PhaseChanged {
                                        phase: JobPhase::Idle,
                                    });
                                }
                            }
                        }
                    }
                    Some(UiCommand::Undo) => {
                        if run_ctx.is_some() {
                            send_rejection(&event_tx, JobError::Busy);
                        } else {
                            match store.undo() {
                                Ok(Some(_)) => send_artifact_state(&event_tx, &source, &store),
                                Ok(None) => {
                                    let _ = event_tx
                                        .send(JobEvent::Info(InfoEvent::UndoUnavailable));
                                }
                                Err(err) => {
                                    let _ = event_tx.send(JobEvent::Info(InfoEvent::Message(
                                        format!("Undo failed: {err}"),
                                    )));
                                }
                            }
                        }
                    }
                    Some(UiCommand::Save(dest)) => {
                        if run_ctx.is_some() {
                            send_rejection(&event_tx, JobError::Busy);
                        } else {
                            save_current(&store, dest, last_report.as_ref(), &event_tx);
                        }
                    }
                    Some(UiCommand::RefreshLog) => match &cfg.log_path {
                        Some(path) => tail_log(path, &event_tx),
                        None => {
                            let _ = event_tx.send(JobEvent::Info(InfoEvent::LogUnavailable));
                        }
                    },
                    Some(UiCommand::Quit) | None => {
                        // Quit waits for the in-flight run so commit/rollback
                        // and temp-file disposal still happen.
                        quit_pending = true;
                        if run_ctx.is_some() {
                            let _ = event_tx.send(JobEvent::Info(InfoEvent::Message(
                                "Waiting for the running job to finish...".into(),
                            )));
                        } else {
                            break;
                        }
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it
            // can be dropped when another branch is chosen and completion is
            // never observed.
            maybe_done = async {
                if let Some(ctx) = &mut run_ctx {
                    if let Some(h) = ctx.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    let Some(ctx) = run_ctx.take() else { continue };
                    match join_res {
                        Ok(Ok(stats)) => {
                            store.commit(ctx.job.output.clone());
                            let report = RunReport::new(
                                ctx.run_id,
                                ctx.job,
                                ctx.started.elapsed(),
                                stats.lines_forwarded,
                            );
                            let _ = event_tx.send(JobEvent::JobSucceeded {
                                report: Box::new(report.clone()),
                            });
                            send_artifact_state(&event_tx, &source, &store);
                            last_report = Some(report);
                            if let Some(path) = &cfg.log_path {
                                tail_log(path, &event_tx);
                            }
                        }
                        Ok(Err(engine_err)) => {
                            store.rollback_after_failure(&ctx.job.output);
                            let _ = event_tx.send(JobEvent::JobFailed {
                                run_id: Some(ctx.run_id),
                                error: engine_err.to_string(),
                            });
                            // Rollback changed the store (the snapshot taken in
                            // Preparing is still armed); tell the front end.
                            send_artifact_state(&event_tx, &source, &store);
                        }
                        Err(join_err) => {
                            store.rollback_after_failure(&ctx.job.output);
                            let _ = event_tx.send(JobEvent::JobFailed {
                                run_id: Some(ctx.run_id),
                                error: format!("engine task failed: {join_err}"),
                            });
                            send_artifact_state(&event_tx, &source, &store);
                        }
                    }
                    let _ = event_tx.send(JobEvent::PhaseChanged {
                        phase: JobPhase::Idle,
                    });
                    if quit_pending {
                        break;
                    }
                }
            }
        }
    }

    store.dispose_all();
    send_artifact_state(&event_tx, &source, &store);
    Ok(())
}

fn send_rejection(event_tx: &UnboundedSender<JobEvent>, err: JobError) {
    let _ = event_tx.send(JobEvent::JobFailed {
        run_id: None,
        error: err.to_string(),
    });
}

fn send_artifact_state(
    event_tx: &UnboundedSender<JobEvent>,
    source: &Option<PathBuf>,
    store: &ArtifactStore,
) {
    let _ = event_tx.send(JobEvent::ArtifactState {
        source: source.clone(),
        current: store.current().map(Path::to_path_buf),
        undo_available: store.undo_available(),
    });
}

fn save_current(
    store: &ArtifactStore,
    dest: Option<PathBuf>,
    last_report: Option<&RunReport>,
    event_tx: &UnboundedSender<JobEvent>,
) {
    let Some(current) = store.current() else {
        let _ = event_tx.send(JobEvent::Info(InfoEvent::Message(
            "No output to save yet".into(),
        )));
        return;
    };
    let path = match dest {
        Some(path) => path,
        None => PathBuf::from(default_save_name(last_report)),
    };
    match std::fs::copy(current, &path) {
        Ok(_) => {
            let _ = event_tx.send(JobEvent::Info(InfoEvent::Saved { path }));
        }
        Err(err) => {
            let _ = event_tx.send(JobEvent::Info(InfoEvent::Message(format!(
                "Save failed: {err}"
            ))));
        }
    }
}

/// Generate a default save filename based on the last run's timestamp and id.
fn default_save_name(last_report: Option<&RunReport>) -> String {
    let (stamp, id) = match last_report {
        Some(r) => (r.timestamp_utc.clone(), r.run_id.clone()),
        // A restored artifact can be saved without any completed run behind it.
        None => (now_rfc3339(), "restored".to_string()),
    };
    format!(
        "filterpipe-{}-{}.png",
        stamp.replace(':', "-").replace('T', "_"),
        &id[..8.min(id.len())]
    )
}

fn tail_log(path: &Path, event_tx: &UnboundedSender<JobEvent>) {
    match log_tail::read_log(path) {
        Ok(lines) => {
            let _ = event_tx.send(JobEvent::LogLines(lines));
        }
        Err(_) => {
            let _ = event_tx.send(JobEvent::Info(InfoEvent::LogUnavailable));
        }
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
