use criterion::{Criterion, black_box, criterion_group, criterion_main};
use pc_runner::controller::poller::PollState;
use pc_runner::gateway::RunState;
use pc_runner::trend_data::{
    DataType, Measurement, PctType, TransactionDataRow, TrendReportData, extract_measurements,
};
use std::time::Duration;

fn sample_report(rows: usize) -> TrendReportData {
    let pct_types = ["TRT", "TPS", "TRS"];
    TrendReportData {
        transactions: (0..rows)
            .map(|i| TransactionDataRow {
                pct_type: pct_types[i % pct_types.len()].to_string(),
                pct_name: format!("transaction_{}", i),
                average: Some(i as f64 * 0.5),
                percentile_90: Some(i as f64),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

fn benchmark_extraction(c: &mut Criterion) {
    let report = sample_report(3000);

    c.bench_function("extract_transaction_p90", |b| {
        b.iter(|| {
            let result = extract_measurements(
                black_box(&report),
                42,
                DataType::Transaction,
                PctType::Trt,
                Measurement::Percentile90,
            );
            assert!(result.is_ok());
        })
    });
}

fn benchmark_poll_observation(c: &mut Criterion) {
    let sequence = [
        RunState::Initializing,
        RunState::Running,
        RunState::BeforeCollatingResults,
        RunState::CollatingResults,
        RunState::BeforeCreatingAnalysisData,
        RunState::CreatingAnalysisData,
        RunState::Finished,
    ];

    c.bench_function("poll_state_sequence", |b| {
        b.iter(|| {
            let mut poll = PollState::new(RunState::Finished);
            for state in black_box(&sequence) {
                poll.observe(*state, Duration::from_millis(5000));
            }
            poll.last_observed()
        })
    });
}

criterion_group!(benches, benchmark_extraction, benchmark_poll_observation);
criterion_main!(benches);
