//! scorecard-runner: headless driver for the scorecard engine.
//!
//! Usage:
//!   scorecard-runner --seed 42 --population 5000 --db scorecards.db
//!   scorecard-runner --config data/engine_config.json --ipc-mode
//!
//! Without `--ipc-mode` it runs a scripted demo: build a scorecard, take
//! it live, back-test it against a synthetic population, drift the
//! population and report the resulting alerts.
//!
//! In `--ipc-mode` it reads one JSON command per line on stdin and
//! writes one JSON response per line on stdout.

use anyhow::Result;
use scorecard_core::{
    audit::ChangeRequest,
    command::EngineCommand,
    config::EngineConfig,
    engine::{PerformanceReport, ScorecardEngine},
    model::{Bin, Characteristic, Scorecard, ScorecardStatus, Thresholds},
    population::SyntheticPopulation,
    provider::{InMemoryApplications, InMemoryOutcomes},
    store::ScorecardStore,
    types::ApplicantData,
};
use serde_json::json;
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(serde::Serialize)]
#[serde(rename_all = "snake_case")]
enum IpcResponse {
    Ok(serde_json::Value),
    Error(String),
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let population = parse_arg(&args, "--population", 5_000usize);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let config = match string_arg(&args, "--config") {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    if !ipc_mode {
        println!("scorecard-runner");
        println!("  seed:        {seed}");
        println!("  population:  {population}");
        println!("  db:          {db}");
        println!("  bands:       {}", config.performance.band_count);
        println!("  started:     {}", chrono::Utc::now().to_rfc3339());
        println!();
    }

    let store = if db == ":memory:" {
        ScorecardStore::in_memory()?
    } else {
        ScorecardStore::open(db)?
    };
    let applications = Arc::new(InMemoryApplications::new());
    let outcomes = Arc::new(InMemoryOutcomes::new());
    let engine = ScorecardEngine::new(store, config)?
        .with_applications(applications.clone())
        .with_outcomes(outcomes.clone());

    if ipc_mode {
        run_ipc_loop(&engine)?;
    } else {
        run_demo(&engine, &applications, &outcomes, seed, population)?;
    }

    Ok(())
}

fn run_ipc_loop(engine: &ScorecardEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        let line = buffer.trim();
        if line.is_empty() {
            continue;
        }

        let raw: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                let err = IpcResponse::Error(e.to_string());
                writeln!(stdout, "{}", serde_json::to_string(&err)?)?;
                stdout.flush()?;
                continue;
            }
        };
        if raw.get("cmd").and_then(|c| c.as_str()) == Some("quit") {
            break;
        }

        let response = match serde_json::from_value::<EngineCommand>(raw) {
            Ok(cmd) => match engine.execute(cmd) {
                Ok(result) => IpcResponse::Ok(result),
                Err(e) => {
                    log::debug!("ipc command failed: {e}");
                    IpcResponse::Error(e.to_string())
                }
            },
            Err(e) => IpcResponse::Error(e.to_string()),
        };
        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }

    Ok(())
}

fn run_demo(
    engine: &ScorecardEngine,
    applications: &InMemoryApplications,
    outcomes: &InMemoryOutcomes,
    seed: u64,
    population: usize,
) -> Result<()> {
    let scorecard = engine.import_scorecard(sample_scorecard()?)?;
    let id = scorecard.scorecard_id.clone();
    let analyst = ChangeRequest::new("demo-analyst", "initial calibration");

    let scorecard = engine.set_status(&id, ScorecardStatus::Active, &analyst.at_version(scorecard.version))?;
    println!("Scorecard {} '{}' is {} at v{}", id, scorecard.name, scorecard.status, scorecard.version);
    println!();
    println!("{}", scorecard.script);

    let applicant: ApplicantData = [
        ("age".to_string(), json!(30)),
        ("income".to_string(), json!(42_000)),
        ("home".to_string(), json!("rent")),
    ]
    .into_iter()
    .collect();
    applications.insert("app-001", applicant.clone());

    let result = engine.live_calculate(&id, &applicant)?;
    println!("app-001 scored {:.2} -> {}", result.display_score(), result.decision);
    for line in &result.characteristic_scores {
        println!(
            "  {:<8} {:<12} {:>8.2}",
            line.code,
            line.bin_label.as_deref().unwrap_or("-"),
            line.weighted_points
        );
    }
    println!("  reason codes: {}", result.reason_codes.join(", "));

    let modifications: ApplicantData = [("home".to_string(), json!("own"))].into_iter().collect();
    let what_if = engine.what_if(&id, "app-001", &modifications)?;
    println!(
        "what-if home=own: {:.2} -> {:.2} ({:+.2}), decision changed: {}",
        what_if.base.display_score(),
        what_if.modified.display_score(),
        what_if.score_delta,
        what_if.decision_changed
    );
    println!();

    let synthetic = SyntheticPopulation::new(seed, population, scorecard.min_score, scorecard.max_score)
        .with_approval_cutoff(scorecard.thresholds.manual_review);
    outcomes.replace(&id, synthetic.iter().collect());
    engine.capture_psi_baseline(&id)?;
    print_report("baseline period", &engine.get_performance(&id)?);

    for (period, shift) in [(1, 40.0), (2, 80.0)] {
        let drifted = synthetic.clone().with_shift(-shift);
        outcomes.replace(&id, drifted.iter().collect());
        print_report(&format!("drift period {period}"), &engine.get_performance(&id)?);
    }

    let alerts = engine.get_alerts(&id)?;
    log::info!("demo finished with {} alerts", alerts.len());
    if let Some(first) = alerts.first() {
        engine.acknowledge_alert(&first.alert_id, "demo-analyst")?;
    }
    println!("=== Change log ===");
    for entry in engine.get_change_log(&id)? {
        println!(
            "  v{} {} {}: {} -> {} ({} by {})",
            entry.version,
            entry.change_type,
            entry.field_path,
            entry.old_value,
            entry.new_value,
            entry.justification,
            entry.actor
        );
    }
    Ok(())
}

fn print_report(title: &str, report: &PerformanceReport) {
    let s = &report.snapshot;
    println!("=== {title} ===");
    println!("  applications:  {}", s.total_applications);
    println!("  approval rate: {:.1}%", s.approval_rate * 100.0);
    if let Some(rate) = s.default_rate {
        println!("  default rate:  {:.1}%", rate * 100.0);
    }
    println!("  gini:          {}", metric(s.gini.value()));
    println!("  ks:            {}", metric(s.ks.value()));
    println!("  psi:           {} {:?}", metric(s.psi.value()), s.psi_status);
    for band in &s.bands {
        println!(
            "    {:<10} {:>6} {:>6.1}%",
            band.label,
            band.count,
            band.pct_of_population * 100.0
        );
    }
    for alert in &report.fired_alerts {
        println!("  ALERT [{}] {}", alert.severity.as_str(), alert.message);
    }
    println!();
}

fn metric(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}

fn sample_scorecard() -> Result<Scorecard> {
    Ok(Scorecard::new("Retail Unsecured", 600.0, 300.0, 850.0)?
        .with_thresholds(Thresholds::new(640.0, 580.0, 560.0))
        .with_characteristic(
            Characteristic::new("AGE", "Applicant Age", "age")
                .with_bin(Bin::range("18-24", Some(18.0), Some(25.0), -20.0))
                .with_bin(Bin::range("25-39", Some(25.0), Some(40.0), 10.0))
                .with_bin(Bin::range("40+", Some(40.0), None, 30.0)),
        )
        .with_characteristic(
            Characteristic::new("INCOME", "Annual Income", "income")
                .with_bin(Bin::range("<25k", None, Some(25_000.0), -35.0))
                .with_bin(Bin::range("25k-60k", Some(25_000.0), Some(60_000.0), 5.0))
                .with_bin(Bin::range("60k+", Some(60_000.0), None, 40.0)),
        )
        .with_characteristic(
            Characteristic::new("HOME", "Home Ownership", "home")
                .with_bin(Bin::category("Owner", "own", 25.0))
                .with_bin(Bin::category("Mortgage", "mortgage", 15.0))
                .with_bin(Bin::category("Renter", "rent", -5.0)),
        ))
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    string_arg(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
