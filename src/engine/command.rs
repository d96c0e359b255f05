//! Canonical engine command-line construction.
//!
//! The engine's grammar is `<engine> <input> <output> [--flag <args...>]...`
//! and the produced tokens must match it byte for byte. Everything here is
//! pure: no I/O, no failure modes. Malformed paths or out-of-range
//! parameters were rejected before a job ever existed.

use crate::model::FilterJob;
use std::path::Path;

/// Flatten a job into the engine's argument vector:
/// `[engine, input, output, <filter args...>]`, filter args concatenated in
/// canonical pipeline order (the job guarantees the ordering).
pub fn build_command(engine: &Path, job: &FilterJob) -> Vec<String> {
    let mut command = Vec::with_capacity(3 + job.filters.len() * 4);
    command.push(engine.display().to_string());
    command.push(job.input.display().to_string());
    command.push(job.output.display().to_string());
    for filter in &job.filters {
        command.extend(filter.cli_args());
    }
    command
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Filter, FilterJob, RainbowMode};
    use std::path::PathBuf;

    #[test]
    fn blur_run_renders_reference_command() {
        let job = FilterJob::new(
            PathBuf::from("/imgs/source.png"),
            PathBuf::from("/tmp/t1.png"),
            vec![Filter::Blur {
                kernel: 5,
                sigma: 2.0,
            }],
        );
        assert_eq!(
            build_command(Path::new("/opt/engine/main"), &job),
            vec![
                "/opt/engine/main",
                "/imgs/source.png",
                "/tmp/t1.png",
                "--blur",
                "5",
                "2.0"
            ]
        );
    }

    #[test]
    fn edge_run_renders_reference_command() {
        let job = FilterJob::new(
            PathBuf::from("/tmp/t1.png"),
            PathBuf::from("/tmp/t2.png"),
            vec![Filter::Edge {
                low: 10.0,
                high: 50.0,
            }],
        );
        assert_eq!(
            build_command(Path::new("/opt/engine/main"), &job),
            vec![
                "/opt/engine/main",
                "/tmp/t1.png",
                "/tmp/t2.png",
                "--edge",
                "10.0",
                "50.0"
            ]
        );
    }

    #[test]
    fn selection_order_does_not_leak_into_the_command() {
        let filters = vec![
            Filter::SingleColour {
                red: 10,
                green: 20,
                blue: 30,
            },
            Filter::Grayscale,
            Filter::Rainbow {
                mode: RainbowMode::Row,
            },
        ];
        let mut reversed = filters.clone();
        reversed.reverse();

        let a = FilterJob::new(PathBuf::from("/a.png"), PathBuf::from("/b.png"), filters);
        let b = FilterJob::new(PathBuf::from("/a.png"), PathBuf::from("/b.png"), reversed);
        assert_eq!(
            build_command(Path::new("engine"), &a),
            build_command(Path::new("engine"), &b)
        );
        assert_eq!(
            build_command(Path::new("engine"), &a)[3..],
            [
                "--gray".to_string(),
                "--rainbow".to_string(),
                "r".to_string(),
                "--singlecolour".to_string(),
                "10".to_string(),
                "20".to_string(),
                "30".to_string()
            ]
        );
    }

    #[test]
    fn no_filters_renders_paths_only() {
        let job = FilterJob::new(PathBuf::from("/a.png"), PathBuf::from("/b.png"), vec![]);
        assert_eq!(
            build_command(Path::new("engine"), &job),
            vec!["engine", "/a.png", "/b.png"]
        );
    }
}
