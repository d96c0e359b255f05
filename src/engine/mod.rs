//! Engine subprocess execution.
//!
//! One run is one spawn of the external engine binary. Standard input is
//! wired to the null device so the engine can never block on a read, both
//! output pipes are drained line by line onto the event channel, and the exit
//! status is classified into [`EngineError`] variants. An optional deadline
//! bounds a hung engine; there is no other cancellation path.

pub mod command;
pub mod log_tail;

use crate::model::{EngineError, JobEvent};
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// What a completed run looked like from the outside.
#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    /// Lines forwarded from the engine's stdout and stderr combined.
    pub lines_forwarded: u64,
}

pub struct EngineRunner {
    timeout: Option<Duration>,
}

impl EngineRunner {
    /// `timeout` of `None` lets the engine run unbounded.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Run one already-built command to completion.
    ///
    /// `argv` is the full canonical vector from [`command::build_command`]:
    /// program first, then its arguments. Output lines reach `events` tagged
    /// with `run_id`; the channel is the combined stream observers see, and
    /// lines from the two pipes interleave in arrival order.
    pub async fn run(
        &self,
        argv: &[String],
        run_id: &str,
        events: &UnboundedSender<JobEvent>,
    ) -> Result<EngineStats, EngineError> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            EngineError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty engine command",
            ))
        })?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                path: PathBuf::from(program),
                source,
            })?;

        // Drain both pipes concurrently so a full pipe buffer can never stall
        // the engine mid-write.
        let out_task = child
            .stdout
            .take()
            .map(|s| spawn_line_forwarder(s, run_id.to_string(), events.clone()));
        let err_task = child
            .stderr
            .take()
            .map(|s| spawn_line_forwarder(s, run_id.to_string(), events.clone()));

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited?,
                Err(_) => {
                    let _ = child.kill().await;
                    join_forwarders(out_task, err_task).await;
                    return Err(EngineError::TimedOut { limit });
                }
            },
            None => child.wait().await?,
        };

        // Join the drains only after exit so no trailing output is lost.
        let lines_forwarded = join_forwarders(out_task, err_task).await;

        if status.success() {
            Ok(EngineStats { lines_forwarded })
        } else {
            match status.code() {
                Some(code) => Err(EngineError::Failed { code }),
                None => Err(EngineError::Signalled),
            }
        }
    }
}

fn spawn_line_forwarder<R>(
    stream: R,
    run_id: String,
    events: UnboundedSender<JobEvent>,
) -> JoinHandle<u64>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        let mut forwarded = 0u64;
        while let Ok(Some(line)) = lines.next_line().await {
            forwarded += 1;
            // A closed channel means the front end is gone; keep draining so
            // the child still exits cleanly.
            let _ = events.send(JobEvent::EngineLine {
                run_id: run_id.clone(),
                line,
            });
        }
        forwarded
    })
}

async fn join_forwarders(out: Option<JoinHandle<u64>>, err: Option<JoinHandle<u64>>) -> u64 {
    let mut total = 0;
    if let Some(handle) = out {
        total += handle.await.unwrap_or(0);
    }
    if let Some(handle) = err {
        total += handle.await.unwrap_or(0);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn sh(script: &str) -> Vec<String> {
        vec!["/bin/sh".into(), "-c".into(), script.into()]
    }

    #[tokio::test]
    async fn zero_exit_forwards_both_streams() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = EngineRunner::new(None);
        let stats = runner
            .run(&sh("echo out-line; echo err-line 1>&2"), "run-1", &tx)
            .await
            .unwrap();
        assert_eq!(stats.lines_forwarded, 2);

        drop(tx);
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            if let JobEvent::EngineLine { run_id, line } = event {
                assert_eq!(run_id, "run-1");
                seen.push(line);
            }
        }
        assert!(seen.contains(&"out-line".to_string()));
        assert!(seen.contains(&"err-line".to_string()));
    }

    #[tokio::test]
    async fn nonzero_exit_keeps_the_code() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let runner = EngineRunner::new(None);
        match runner.run(&sh("exit 2"), "run-2", &tx).await {
            Err(EngineError::Failed { code }) => assert_eq!(code, 2),
            other => panic!("expected Failed with code 2, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let runner = EngineRunner::new(None);
        let argv = vec!["/no/such/engine/binary".to_string()];
        assert!(matches!(
            runner.run(&argv, "run-3", &tx).await,
            Err(EngineError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn hung_engine_hits_the_deadline() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let runner = EngineRunner::new(Some(Duration::from_millis(200)));
        match runner.run(&sh("sleep 5"), "run-4", &tx).await {
            Err(EngineError::TimedOut { limit }) => {
                assert_eq!(limit, Duration::from_millis(200));
            }
            other => panic!("expected TimedOut, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn output_before_failure_is_still_forwarded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = EngineRunner::new(None);
        let result = runner
            .run(&sh("echo progress; exit 3"), "run-5", &tx)
            .await;
        assert!(matches!(result, Err(EngineError::Failed { code: 3 })));

        drop(tx);
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            if let JobEvent::EngineLine { line, .. } = event {
                seen.push(line);
            }
        }
        assert_eq!(seen, vec!["progress"]);
    }
}
