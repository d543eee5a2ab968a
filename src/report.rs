//! Tabular and JSON reports over a registry [`Snapshot`]

use std::io::{self, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::{self, AggregateStat, Snapshot};

/// One report line, durations in fractional milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub label: String,
    pub count: u64,
    pub sum_ms: f64,
    pub max_ms: f64,
    pub min_ms: f64,
    pub avg_ms: f64,
}

impl ReportRow {
    fn new(label: &str, stat: &AggregateStat) -> Self {
        // An empty stat still carries the Duration::MAX sentinel in `min`
        let min = if stat.count == 0 { Duration::ZERO } else { stat.min };
        Self {
            label: label.to_string(),
            count: stat.count,
            sum_ms: millis(stat.sum),
            max_ms: millis(stat.max),
            min_ms: millis(min),
            avg_ms: millis(stat.average),
        }
    }
}

/// Convert to milliseconds without truncating sub-millisecond precision
pub fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

impl Snapshot {
    /// Rows sorted by cumulative time, largest first, ties by label
    pub fn rows(&self) -> Vec<ReportRow> {
        let mut stats: Vec<_> = self.iter().collect();
        stats.sort_by(|a, b| b.1.sum.cmp(&a.1.sum).then_with(|| a.0.cmp(b.0)));
        stats
            .into_iter()
            .map(|(label, stat)| ReportRow::new(label, stat))
            .collect()
    }
}

/// Render `snapshot` as a text table
pub fn render<W: Write>(snapshot: &Snapshot, out: &mut W) -> io::Result<()> {
    let rows = snapshot.rows();
    if rows.is_empty() {
        writeln!(out, "No timing data collected.")?;
        return Ok(());
    }

    let width = rows
        .iter()
        .map(|row| row.label.chars().count())
        .max()
        .unwrap_or(0)
        .max("Label".len());
    let rule = "─".repeat(width + 1 + 10 + 4 * 15);

    writeln!(
        out,
        "{:<width$} {:>10} {:>14} {:>14} {:>14} {:>14}",
        "Label",
        "Count",
        "Sum (ms)",
        "Max (ms)",
        "Min (ms)",
        "Avg (ms)",
        width = width
    )?;
    writeln!(out, "{}", rule)?;
    for row in &rows {
        writeln!(
            out,
            "{:<width$} {:>10} {:>14.3} {:>14.3} {:>14.3} {:>14.3}",
            row.label,
            row.count,
            row.sum_ms,
            row.max_ms,
            row.min_ms,
            row.avg_ms,
            width = width
        )?;
    }
    writeln!(out, "{}", rule)?;
    Ok(())
}

/// Render `snapshot` as a pretty-printed JSON array of rows
pub fn render_json<W: Write>(snapshot: &Snapshot, out: &mut W) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, &snapshot.rows())?;
    writeln!(out)
}

/// Write the global registry's report to `out`
pub fn write_report<W: Write>(out: &mut W) -> io::Result<()> {
    render(&registry::snapshot(), out)
}

/// Print the global registry's report to stdout
pub fn print_report() {
    let stdout = io::stdout();
    let mut lock = stdout.lock();
    // A closed stdout must not take the host program down
    let _ = write_report(&mut lock);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn sample_registry() -> Registry {
        let registry = Registry::new();
        registry.record("pkg/small", Duration::from_millis(10));
        registry.record("pkg/big", Duration::from_millis(300));
        registry.record("pkg/mid", Duration::from_millis(100));
        registry.record("pkg/mid", Duration::from_millis(100));
        registry
    }

    #[test]
    fn test_rows_sorted_by_sum_desc() {
        let rows = sample_registry().snapshot().rows();
        let labels: Vec<_> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["pkg/big", "pkg/mid", "pkg/small"]);
    }

    #[test]
    fn test_rows_ties_broken_by_label() {
        let registry = Registry::new();
        registry.record("pkg/b", Duration::from_millis(5));
        registry.record("pkg/a", Duration::from_millis(5));
        registry.record("pkg/c", Duration::from_millis(5));

        let labels: Vec<_> = registry
            .snapshot()
            .rows()
            .into_iter()
            .map(|r| r.label)
            .collect();
        assert_eq!(labels, vec!["pkg/a", "pkg/b", "pkg/c"]);
    }

    #[test]
    fn test_row_values_in_millis() {
        let rows = sample_registry().snapshot().rows();
        let mid = rows.iter().find(|r| r.label == "pkg/mid").unwrap();
        assert_eq!(mid.count, 2);
        assert_eq!(mid.sum_ms, 200.0);
        assert_eq!(mid.max_ms, 100.0);
        assert_eq!(mid.min_ms, 100.0);
        assert_eq!(mid.avg_ms, 100.0);
    }

    #[test]
    fn test_millis_keeps_fraction() {
        assert_eq!(millis(Duration::from_micros(1500)), 1.5);
        assert_eq!(millis(Duration::from_nanos(250)), 0.00025);
    }

    #[test]
    fn test_render_table() {
        let mut out = Vec::new();
        render(&sample_registry().snapshot(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Label"));
        assert!(text.contains("Sum (ms)"));
        assert!(text.contains("300.000"));
        let big = text.find("pkg/big").unwrap();
        let small = text.find("pkg/small").unwrap();
        assert!(big < small);
    }

    #[test]
    fn test_render_lines_share_width() {
        let registry = sample_registry();
        registry.record("pkg/größe", Duration::from_millis(1));

        let mut out = Vec::new();
        render(&registry.snapshot(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let widths: Vec<usize> = text.lines().map(|line| line.chars().count()).collect();
        assert_eq!(widths.len(), 7);
        assert!(widths.iter().all(|w| *w == widths[0]), "{:?}", widths);
    }

    #[test]
    fn test_render_empty() {
        let mut out = Vec::new();
        render(&Snapshot::default(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No timing data collected.\n");
    }

    #[test]
    fn test_render_json() {
        let mut out = Vec::new();
        render_json(&sample_registry().snapshot(), &mut out).unwrap();
        let rows: Vec<ReportRow> = serde_json::from_slice(&out).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].label, "pkg/big");
        assert_eq!(rows[0].sum_ms, 300.0);
    }
}
