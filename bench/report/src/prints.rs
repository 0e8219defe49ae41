use crate::report::BenchmarkReport;
use colored::{ColoredString, Colorize};
use human_repr::{HumanCount, HumanThroughput};
use std::collections::BTreeMap;
use tracing::info;

const COLUMN_WIDTH: usize = 24;
const RTT_CELL_WIDTH: usize = 22;
const LOSS_FOOTNOTE: &str = "* lost = (messages sent on a topic x subscribers on that topic) - messages received on that topic, every subscriber is expected to receive every message";

impl BenchmarkReport {
    pub fn print_summary(&self, verbose: bool) {
        let params_print = format!(
            "Benchmark: {} transport, server: {}, {} runs of {} s, {} groups, {}, {} topics, max inflight: {}\n",
            self.params.transport,
            self.params.server_address,
            self.params.run_count,
            self.params.timeout_secs,
            self.params.groups,
            self.params.format_actors_info(),
            self.params.topics,
            self.params.max_inflight,
        )
        .blue();
        info!("{}", params_print);

        println!();
        for line in self.table_lines(verbose) {
            println!("{}", line.styled());
        }
        if self.totals.failed_workers > 0 || self.totals.interrupted_workers > 0 {
            println!(
                "{}",
                format!(
                    "{} worker(s) failed and were excluded, {} worker(s) lost their connection mid-run",
                    self.totals.failed_workers, self.totals.interrupted_workers
                )
                .yellow()
            );
        }

        info!(
            "Sent {} messages, received {}, lost {}, average throughput {}",
            self.totals.sent_messages.human_count_bare(),
            self.totals.received_messages.human_count_bare(),
            self.totals.lost_messages.human_count_bare(),
            self.totals
                .average_throughput_messages_per_second
                .human_throughput(" msg"),
        );
    }

    pub fn print_json(&self) -> Result<(), serde_json::Error> {
        println!("{}", self.to_json()?);
        Ok(())
    }

    /// Verbose adds one row per run above the totals.
    fn table_lines(&self, verbose: bool) -> Vec<TableLine> {
        let qos_levels = self.qos_levels();
        let mut lines = vec![
            TableLine::Header(self.table_header(&qos_levels)),
            TableLine::Blank,
        ];
        if verbose {
            lines.extend(self.run_rows(&qos_levels).into_iter().map(TableLine::Run));
            lines.push(TableLine::Blank);
            lines.push(TableLine::Separator(self.separator(&qos_levels)));
        }
        lines.push(TableLine::Totals(self.totals_row(&qos_levels)));
        lines.push(TableLine::Blank);
        lines.push(TableLine::Footnote(LOSS_FOOTNOTE));
        lines
    }

    fn table_header(&self, qos_levels: &[u8]) -> String {
        format!(
            "{:<w$}{:<w$}{:<w$}{:<rtt$}{:<w$}{:<w$}",
            "sentMsg",
            "rcvMsg",
            "lostMsg*",
            "averageRTT (ms)",
            "averageElapsedTime (s)",
            "speedRate (msg/s)",
            w = COLUMN_WIDTH,
            rtt = rtt_column_width(qos_levels),
        )
    }

    fn run_rows(&self, qos_levels: &[u8]) -> Vec<String> {
        self.runs
            .iter()
            .map(|run| {
                format_row(
                    run.sent_messages,
                    run.received_messages,
                    run.lost_messages,
                    &run.average_rtt_ms,
                    qos_levels,
                    run.average_elapsed_secs,
                    run.throughput_messages_per_second,
                )
            })
            .collect()
    }

    fn totals_row(&self, qos_levels: &[u8]) -> String {
        format_row(
            self.totals.sent_messages,
            self.totals.received_messages,
            self.totals.lost_messages,
            &self.totals.average_rtt_ms,
            qos_levels,
            self.totals.average_elapsed_secs,
            self.totals.average_throughput_messages_per_second,
        )
    }

    fn separator(&self, qos_levels: &[u8]) -> String {
        "+".repeat(COLUMN_WIDTH * 5 + rtt_column_width(qos_levels))
    }
}

enum TableLine {
    Header(String),
    Run(String),
    Separator(String),
    Totals(String),
    Footnote(&'static str),
    Blank,
}

impl TableLine {
    fn text(&self) -> &str {
        match self {
            TableLine::Header(line)
            | TableLine::Run(line)
            | TableLine::Separator(line)
            | TableLine::Totals(line) => line,
            TableLine::Footnote(line) => line,
            TableLine::Blank => "",
        }
    }

    fn styled(&self) -> ColoredString {
        match self {
            TableLine::Header(line) => line.as_str().bold(),
            TableLine::Totals(line) => line.as_str().green(),
            TableLine::Footnote(line) => line.dimmed(),
            other => other.text().normal(),
        }
    }
}

fn rtt_column_width(qos_levels: &[u8]) -> usize {
    (RTT_CELL_WIDTH * qos_levels.len()).max(COLUMN_WIDTH)
}

fn format_row(
    sent: u64,
    received: u64,
    lost: u64,
    rtt: &BTreeMap<u8, f64>,
    qos_levels: &[u8],
    elapsed_secs: f64,
    rate: f64,
) -> String {
    let rtt_cells: String = qos_levels
        .iter()
        .map(|qos| {
            let cell = match rtt.get(qos) {
                Some(value) => format!("QoS {qos}: {value:.3}"),
                None => format!("QoS {qos}: -"),
            };
            format!("{cell:<width$}", width = RTT_CELL_WIDTH)
        })
        .collect();
    format!(
        "{:<w$}{:<w$}{:<w$}{:<rtt$}{:<w$.6}{:<w$.6}",
        sent,
        received,
        lost,
        rtt_cells,
        elapsed_secs,
        rate,
        w = COLUMN_WIDTH,
        rtt = rtt_column_width(qos_levels),
    )
}

#[cfg(test)]
mod tests {
    use super::{TableLine, LOSS_FOOTNOTE};
    use crate::params::BenchmarkParams;
    use crate::report::BenchmarkReport;
    use crate::summary::{RunSummary, TotalSummary};
    use std::collections::BTreeMap;

    fn report() -> BenchmarkReport {
        let run = |run: u32, rtt: f64| RunSummary {
            run,
            sent_messages: 100,
            received_messages: 90,
            lost_messages: 10,
            average_rtt_ms: BTreeMap::from([(1, rtt)]),
            average_elapsed_secs: 1.0,
            throughput_messages_per_second: 90.0,
            failed_workers: 0,
            interrupted_workers: 0,
        };
        BenchmarkReport {
            timestamp: "2026-01-01T00:00:00+00:00".to_owned(),
            params: BenchmarkParams::default(),
            runs: vec![run(1, 15.0), run(2, 25.0)],
            totals: TotalSummary {
                runs: 2,
                sent_messages: 200,
                received_messages: 180,
                lost_messages: 20,
                average_rtt_ms: BTreeMap::from([(0, 0.0), (1, 20.0)]),
                average_elapsed_secs: 1.0,
                average_throughput_messages_per_second: 90.0,
                failed_workers: 0,
                interrupted_workers: 0,
            },
        }
    }

    fn render(report: &BenchmarkReport, verbose: bool) -> String {
        report
            .table_lines(verbose)
            .iter()
            .map(TableLine::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn table_starts_with_the_header_and_ends_with_the_loss_footnote() {
        let lines = report().table_lines(true);
        assert!(matches!(&lines[0], TableLine::Header(header) if header.starts_with("sentMsg")));
        assert!(matches!(lines.last(), Some(TableLine::Footnote(note)) if *note == LOSS_FOOTNOTE));
        let runs = lines
            .iter()
            .filter(|line| matches!(line, TableLine::Run(_)))
            .count();
        assert_eq!(runs, 2);
        assert_eq!(
            lines
                .iter()
                .filter(|line| matches!(line, TableLine::Totals(_)))
                .count(),
            1
        );
    }

    #[test]
    fn totals_row_is_always_rendered() {
        let table = render(&report(), false);
        assert!(table.contains("sentMsg"));
        assert!(table.contains("QoS 1: 20.000"));
        assert!(!table.contains("QoS 1: 15.000"));
        assert!(!table.contains('+'));
    }

    #[test]
    fn verbose_table_has_a_row_per_run_and_a_separator() {
        let table = render(&report(), true);
        assert!(table.contains("QoS 1: 15.000"));
        assert!(table.contains("QoS 1: 25.000"));
        assert!(table.contains("QoS 0: -"));
        assert!(table.contains("++++"));
    }

    #[test]
    fn report_serializes_to_json() {
        let json = report().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["totals"]["lost_messages"], 20);
        assert_eq!(value["runs"].as_array().unwrap().len(), 2);
    }
}
