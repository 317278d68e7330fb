//! Test Request Client
//!
//! Sends health, sample-profile and random patient requests to the inference
//! service over NATS and logs the replies.

use gdm_inference::types::patient::PatientData;
use rand::Rng;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

/// Random patient generator for load testing
struct PatientGenerator {
    rng: rand::rngs::ThreadRng,
}

impl PatientGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    fn flag(&mut self, p: f64) -> i64 {
        i64::from(self.rng.gen_bool(p))
    }

    /// Patient drawn around population norms
    fn generate_typical(&mut self) -> PatientData {
        let sys_bp = self.rng.gen_range(95.0..135.0);
        PatientData {
            age: self.rng.gen_range(18.0..34.0),
            no_of_pregnancy: self.rng.gen_range(0..3),
            gestation_in_previous_pregnancy: self.rng.gen_range(0.0..2.0),
            bmi: Some(self.rng.gen_range(18.5..27.0)),
            ogtt: Some(self.rng.gen_range(80.0..135.0)),
            hdl: self.rng.gen_range(45.0..80.0),
            family_history: self.flag(0.1),
            unexplained_prenatal_loss: self.flag(0.05),
            large_child_or_birth_defect: self.flag(0.05),
            pcos: self.flag(0.05),
            sys_bp,
            dia_bp: self.rng.gen_range(55.0..(sys_bp - 30.0).min(85.0)),
            hemoglobin: self.rng.gen_range(11.0..14.5),
            sedentary_lifestyle: self.flag(0.3),
            prediabetes: self.flag(0.05),
        }
    }

    /// Patient carrying several GDM risk markers
    fn generate_high_risk(&mut self) -> PatientData {
        let sys_bp = self.rng.gen_range(130.0..170.0);
        PatientData {
            age: self.rng.gen_range(33.0..45.0),
            no_of_pregnancy: self.rng.gen_range(2..6),
            gestation_in_previous_pregnancy: self.rng.gen_range(0.0..3.0),
            bmi: Some(self.rng.gen_range(29.0..42.0)),
            ogtt: Some(self.rng.gen_range(140.0..230.0)),
            hdl: self.rng.gen_range(25.0..45.0),
            family_history: self.flag(0.7),
            unexplained_prenatal_loss: self.flag(0.3),
            large_child_or_birth_defect: self.flag(0.4),
            pcos: self.flag(0.5),
            sys_bp,
            dia_bp: self.rng.gen_range(80.0..100.0),
            hemoglobin: self.rng.gen_range(9.0..12.0),
            sedentary_lifestyle: self.flag(0.7),
            prediabetes: self.flag(0.6),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_client=info".parse()?),
        )
        .init();

    info!("Starting Test Request Client");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let prefix = args.get(2).map(|s| s.as_str()).unwrap_or("gdm");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(20);
    let high_risk_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.3);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        prefix = %prefix,
        count = count,
        high_risk_rate = high_risk_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, high_risk_rate);
        }
    };

    for route in ["health", "model_info", "test.high_risk", "test.low_risk"] {
        let reply = client
            .request(format!("{}.{}", prefix, route), Vec::new().into())
            .await?;
        let body: Value = serde_json::from_slice(&reply.payload)?;
        info!("{} reply:\n{}", route, serde_json::to_string_pretty(&body)?);
    }

    let mut generator = PatientGenerator::new();
    let mut rng = rand::thread_rng();
    let mut by_category = std::collections::BTreeMap::<String, u64>::new();
    let mut failures = 0u64;

    for i in 0..count {
        let patient = if rng.gen_bool(high_risk_rate) {
            generator.generate_high_risk()
        } else {
            generator.generate_typical()
        };

        let payload = serde_json::to_vec(&patient)?;
        let reply = client
            .request(format!("{}.predict", prefix), payload.into())
            .await?;
        let body: Value = serde_json::from_slice(&reply.payload)?;

        if body["success"].as_bool() == Some(true) {
            let category = body["risk_category"].as_str().unwrap_or("unknown").to_string();
            *by_category.entry(category).or_insert(0) += 1;
        } else {
            failures += 1;
            warn!(detail = %body["detail"], "Prediction request failed");
        }

        if (i + 1) % 10 == 0 {
            info!("Sent {}/{} predictions ({:?})", i + 1, count, by_category);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    // One table-shaped batch of both samples
    let batch = serde_json::json!({
        "columns": ["Age", "No of Pregnancy", "Gestation in previous Pregnancy", "BMI", "HDL",
                    "Family History", "unexplained prenetal loss", "Large Child or Birth Default",
                    "PCOS", "Sys BP", "Dia BP", "OGTT", "Hemoglobin", "Sedentary Lifestyle",
                    "Prediabetes"],
        "rows": [
            [38, 3, 1, 32.5, 35, 1, 1, 1, 1, 145, 95, 180, 10.5, 1, 1],
            [25, 1, 0, 22.5, 60, 0, 0, 0, 0, 110, 70, 115, 12.5, 0, 0]
        ]
    });
    let reply = client
        .request(format!("{}.predict.batch", prefix), serde_json::to_vec(&batch)?.into())
        .await?;
    let body: Value = serde_json::from_slice(&reply.payload)?;
    info!("predict.batch reply:\n{}", serde_json::to_string_pretty(&body)?);

    info!(
        "Completed! Sent {} predictions, {} failed, categories: {:?}",
        count, failures, by_category
    );

    Ok(())
}

fn run_dry_mode(count: u64, high_risk_rate: f64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = PatientGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let patient = if rng.gen_bool(high_risk_rate) {
            generator.generate_high_risk()
        } else {
            generator.generate_typical()
        };

        if let Err(e) = patient.validate(true) {
            warn!(error = %e, "Generated patient failed validation");
        }

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample patient {}:\n{}", i + 1, serde_json::to_string_pretty(&patient)?);
        }
    }

    Ok(())
}
