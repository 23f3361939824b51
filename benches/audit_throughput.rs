use criterion::{black_box, criterion_group, criterion_main, Criterion};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;

use bookaudit::domain::{AuditSettings, Dataset, Value};
use bookaudit::outlier::OutlierDetector;
use bookaudit::pipeline::{AuditPipeline, PipelineLimits};
use bookaudit::reconcile::Reconciler;
use bookaudit::rules::{RuleEngine, RuleSet};
use bookaudit::settings::parse_settings;
use bookaudit::suggest::DisabledSuggester;

const ROWS: usize = 10_000;

const SETTINGS: &str = r#"
primary_keys: [PolicyNumber]
validator:
  date_columns: [CoverStartDate, CoverEndDate]
  not_null_columns: [MonthlyPremium]
  date_order:
    - start: CoverStartDate
      end: CoverEndDate
  gender_values: [M, F]
  min_premium: 10
  custom_rules:
    age_limit:
      func: "Age > 99"
      columns: [Age]
      severity: warning
    short_cover:
      func: "days_between(CoverStartDate, CoverEndDate) < 30"
      columns: [CoverStartDate, CoverEndDate]
      severity: warning
"#;

fn create_book(offset: usize) -> Dataset {
    let colours = ["Red", "Blue", "Black", "Silver", "White"];
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

    let rows = (offset..offset + ROWS)
        .map(|i| {
            let cover_start = start + chrono::Days::new((i % 365) as u64);
            vec![
                Value::from(format!("P{i:06}")),
                Value::from(Decimal::new((i % 900 + 20) as i64 * 100 + 50, 2)),
                Value::from((18 + i % 90) as i64),
                Value::from(if i % 2 == 0 { "M" } else { "F" }),
                Value::from(if i % 997 == 0 { "Mauve" } else { colours[i % 5] }),
                Value::from(cover_start),
                Value::from(cover_start + chrono::Days::new(365)),
            ]
        })
        .collect();

    Dataset::new(
        [
            "PolicyNumber",
            "MonthlyPremium",
            "Age",
            "Gender",
            "VehicleColour",
            "CoverStartDate",
            "CoverEndDate",
        ],
        rows,
    )
    .unwrap()
}

fn settings() -> AuditSettings {
    parse_settings(SETTINGS).unwrap()
}

fn bench_rule_engine(c: &mut Criterion) {
    let book = create_book(0);
    let settings = settings();
    let ruleset = RuleSet::from_settings(&settings).unwrap();
    let engine = RuleEngine::default();

    c.bench_function("rule_engine_validate_10k", |b| {
        b.iter(|| engine.validate(black_box(&book), black_box(&ruleset)))
    });
}

fn bench_outlier_detector(c: &mut Criterion) {
    let book = create_book(0);
    let settings = settings();
    let detector = OutlierDetector::new(&settings.outlier, &settings.primary_keys);

    c.bench_function("outlier_detect_10k", |b| {
        b.iter(|| detector.detect(black_box(&book)))
    });
}

fn bench_reconciler(c: &mut Criterion) {
    let current = create_book(1_000);
    let previous = create_book(0);
    let settings = settings();
    let reconciler = Reconciler::from_settings(&settings.primary_keys, &settings.comparison);

    c.bench_function("reconcile_10k_with_changes", |b| {
        b.iter(|| reconciler.compare(black_box(&current), black_box(&previous)))
    });
}

fn bench_full_pipeline(c: &mut Criterion) {
    let current = Arc::new(create_book(1_000));
    let previous = Arc::new(create_book(0));
    let pipeline = AuditPipeline::new(settings(), Arc::new(DisabledSuggester), PipelineLimits::default());
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("full_audit_pipeline_10k", |b| {
        b.to_async(&runtime)
            .iter(|| pipeline.run(black_box(current.clone()), black_box(previous.clone())))
    });
}

criterion_group!(
    benches,
    bench_rule_engine,
    bench_outlier_detector,
    bench_reconciler,
    bench_full_pipeline,
);

criterion_main!(benches);
