//! Text report builder for headless output.
//!
//! Formats human-readable lines for one completed run in text mode.

use crate::model::RunReport;

/// Pre-formatted lines for text output.
pub(crate) struct TextReport {
    pub lines: Vec<String>,
}

/// Build the report printed to stdout after a headless run succeeds.
pub(crate) fn build_text_report(report: &RunReport) -> TextReport {
    let pipeline = report
        .filters
        .iter()
        .map(|f| f.describe())
        .collect::<Vec<_>>()
        .join(" | ");
    let lines = vec![
        format!("Run:      {} at {}", report.run_id, report.timestamp_utc),
        format!("Input:    {}", report.input.display()),
        format!("Output:   {}", report.output.display()),
        format!("Pipeline: {pipeline}"),
        format!(
            "Duration: {} ({} engine output lines)",
            humantime::format_duration(report.duration),
            report.engine_lines
        ),
    ];
    TextReport { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Filter;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn report_lines_carry_pipeline_and_paths() {
        let report = RunReport {
            timestamp_utc: "2025-01-01T00:00:00Z".into(),
            run_id: "42".into(),
            input: PathBuf::from("/imgs/in.png"),
            output: PathBuf::from("/imgs/out.png"),
            filters: vec![
                Filter::Grayscale,
                Filter::Blur {
                    kernel: 5,
                    sigma: 2.0,
                },
            ],
            duration: Duration::from_millis(1250),
            engine_lines: 3,
        };

        let lines = build_text_report(&report).lines;
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "Run:      42 at 2025-01-01T00:00:00Z");
        assert_eq!(lines[1], "Input:    /imgs/in.png");
        assert_eq!(lines[2], "Output:   /imgs/out.png");
        assert_eq!(lines[3], "Pipeline: grayscale | blur(kernel=5, sigma=2.0)");
        assert!(lines[4].contains("3 engine output lines"), "got: {}", lines[4]);
    }
}
