use crate::transport::topic_matches;
use chrono::Utc;
use mqtt_bench_report::params::BenchmarkParams;
use mqtt_bench_report::report::BenchmarkReport;
use mqtt_bench_report::run_result::RunResult;
use mqtt_bench_report::summary::{RunSummary, TotalSummary};
use std::collections::BTreeMap;

pub struct BenchmarkReportBuilder;

impl BenchmarkReportBuilder {
    pub fn build(params: BenchmarkParams, runs: &[RunResult]) -> BenchmarkReport {
        let timestamp = Utc::now().to_rfc3339();
        let runs: Vec<RunSummary> = runs.iter().map(summarize_run).collect();
        let totals = summarize_totals(&runs);

        BenchmarkReport {
            timestamp,
            params,
            runs,
            totals,
        }
    }
}

fn summarize_run(run: &RunResult) -> RunSummary {
    let sent_messages = run.workers.iter().map(|w| w.sent_count).sum();
    let received_messages = run.workers.iter().map(|w| w.received_count).sum();
    let average_elapsed_secs = mean(run.workers.iter().map(|w| w.elapsed_secs()));
    let throughput_messages_per_second = if average_elapsed_secs > 0.0 {
        received_messages as f64 / average_elapsed_secs
    } else {
        0.0
    };

    RunSummary {
        run: run.run,
        sent_messages,
        received_messages,
        lost_messages: lost_messages(run),
        average_rtt_ms: average_rtt_per_qos(run),
        average_elapsed_secs,
        throughput_messages_per_second,
        failed_workers: run.failures.len(),
        interrupted_workers: run.interrupted_workers(),
    }
}

/// Every subscriber is expected to receive every message published to a topic
/// its filter matches, so the expected count of a subscription topic is the
/// publishers' total times the number of subscribers on it. A topic with more
/// deliveries than expected counts as no loss.
fn lost_messages(run: &RunResult) -> u64 {
    let mut subscribers_by_topic: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for subscriber in run.subscribers() {
        let (count, received) = subscribers_by_topic
            .entry(subscriber.topic.as_str())
            .or_default();
        *count += 1;
        *received += subscriber.received_count;
    }

    subscribers_by_topic
        .into_iter()
        .map(|(filter, (subscribers, received))| {
            let published: u64 = run
                .publishers()
                .filter(|publisher| topic_matches(filter, &publisher.topic))
                .map(|publisher| publisher.sent_count)
                .sum();
            (published * subscribers).saturating_sub(received)
        })
        .sum()
}

/// Mean of the per-publisher RTT means, grouped by QoS level.
fn average_rtt_per_qos(run: &RunResult) -> BTreeMap<u8, f64> {
    let mut by_qos: BTreeMap<u8, Vec<f64>> = BTreeMap::new();
    for publisher in run.publishers() {
        by_qos
            .entry(publisher.qos)
            .or_default()
            .push(publisher.average_rtt_ms());
    }
    by_qos
        .into_iter()
        .map(|(qos, means)| (qos, mean(means.into_iter())))
        .collect()
}

fn summarize_totals(runs: &[RunSummary]) -> TotalSummary {
    if runs.is_empty() {
        return TotalSummary::default();
    }
    let run_count = runs.len() as f64;

    let mut rtt_sums: BTreeMap<u8, f64> = BTreeMap::new();
    for run in runs {
        for (qos, rtt) in &run.average_rtt_ms {
            *rtt_sums.entry(*qos).or_default() += rtt;
        }
    }

    TotalSummary {
        runs: runs.len() as u32,
        sent_messages: runs.iter().map(|r| r.sent_messages).sum(),
        received_messages: runs.iter().map(|r| r.received_messages).sum(),
        lost_messages: runs.iter().map(|r| r.lost_messages).sum(),
        average_rtt_ms: rtt_sums
            .into_iter()
            .map(|(qos, sum)| (qos, sum / run_count))
            .collect(),
        average_elapsed_secs: runs.iter().map(|r| r.average_elapsed_secs).sum::<f64>() / run_count,
        average_throughput_messages_per_second: runs
            .iter()
            .map(|r| r.throughput_messages_per_second)
            .sum::<f64>()
            / run_count,
        failed_workers: runs.iter().map(|r| r.failed_workers).sum(),
        interrupted_workers: runs.iter().map(|r| r.interrupted_workers).sum(),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
