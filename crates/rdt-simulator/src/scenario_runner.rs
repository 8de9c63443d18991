use anyhow::{Context, anyhow};
use rdt_abstract::{LossConfig, ProtocolConfig, TestAction, TestAssertion, TestScenario};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::harness::TransferSimulation;
use crate::trace::SimulationReport;

/// Horizon when a scenario sets no `max_duration`.
const DEFAULT_HORIZON_MS: u64 = 10_000;

pub fn load_scenario(path: impl AsRef<Path>) -> anyhow::Result<TestScenario> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse scenario")
}

pub fn run_scenario(path: impl AsRef<Path>) -> anyhow::Result<SimulationReport> {
    let scenario = load_scenario(path)?;
    run_loaded(&scenario)
}

/// Run a parsed scenario and check its assertions. The report is returned
/// only when every assertion holds.
pub fn run_loaded(scenario: &TestScenario) -> anyhow::Result<SimulationReport> {
    info!("Running Scenario: {}", scenario.name);
    if !scenario.description.is_empty() {
        info!("Description: {}", scenario.description);
    }

    let mut protocol = ProtocolConfig::default();
    scenario.protocol.apply_to(&mut protocol);
    let mut sender_loss = LossConfig::default();
    scenario.loss.apply_to(&mut sender_loss);
    let receiver_loss = scenario.loss.receiver.clone().unwrap_or_default();

    let max_duration = scenario
        .assertions
        .iter()
        .find_map(|a| {
            if let TestAssertion::MaxDuration { ms } = a {
                Some(*ms)
            } else {
                None
            }
        })
        .unwrap_or(DEFAULT_HORIZON_MS);

    let mut sim = TransferSimulation::new(protocol)
        .with_sender_loss(sender_loss)
        .with_receiver_loss(receiver_loss)
        .with_horizon(Duration::from_millis(max_duration));
    for action in &scenario.actions {
        sim = match action {
            TestAction::DropNextData { seq } => sim.drop_next_data(*seq),
            TestAction::DropNextAck { ack } => sim.drop_next_ack(*ack),
        };
    }

    let input = scenario.input.materialize();
    let report = sim.run(&input).context("Invalid scenario configuration")?;
    check_assertions(&scenario.assertions, &report)?;

    info!("Test Scenario Passed!");
    Ok(report)
}

pub fn check_assertions(
    assertions: &[TestAssertion],
    report: &SimulationReport,
) -> anyhow::Result<()> {
    for assertion in assertions {
        match assertion {
            TestAssertion::OutputMatchesInput => {
                if !report.output_matches_input {
                    return Err(anyhow!(
                        "Assertion Failed: output ({} bytes) differs from input ({} bytes)",
                        report.output_len,
                        report.input_len
                    ));
                }
            }
            TestAssertion::DataFramesSent { min, max } => {
                check_range(
                    "Sender put",
                    "data frames on the wire",
                    report.sender_stats.data_frames_sent,
                    *min,
                    *max,
                )?;
            }
            TestAssertion::AcksReceived { min, max } => {
                check_range(
                    "Sender received",
                    "acks",
                    report.sender_stats.acks_received,
                    *min,
                    *max,
                )?;
            }
            TestAssertion::Completed { expected } => {
                if report.completed != *expected {
                    return Err(anyhow!(
                        "Assertion Failed: completed = {}, expected {} (sender: {:?}, receiver: {:?})",
                        report.completed,
                        expected,
                        report.sender_error,
                        report.receiver_error
                    ));
                }
            }
            TestAssertion::MaxDuration { ms } => {
                if report.duration_ms > *ms {
                    return Err(anyhow!("Test timed out after {} ms", ms));
                }
            }
        }
    }
    Ok(())
}

fn check_range(subject: &str, what: &str, actual: u64, min: u64, max: Option<u64>) -> anyhow::Result<()> {
    if actual < min {
        return Err(anyhow!(
            "Assertion Failed: {} {} {}, expected min {}",
            subject,
            actual,
            what,
            min
        ));
    }
    if let Some(max) = max {
        if actual > max {
            return Err(anyhow!(
                "Assertion Failed: {} {} {}, expected max {}",
                subject,
                actual,
                what,
                max
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(toml_text: &str) -> TestScenario {
        toml::from_str(toml_text).unwrap()
    }

    #[test]
    fn parses_full_scenario() {
        let s = scenario(
            r#"
            name = "sr drop"
            description = "drop block 1 once"

            [protocol]
            kind = "selective-repeat"
            window_size = 4
            modulus = 8
            timeout_ms = 50

            [loss]
            send_ack = 0.1
            seed = 7

            [input]
            type = "pattern"
            size = 5000

            [[actions]]
            type = "drop_next_data"
            seq = 1

            [[assertions]]
            type = "output_matches_input"

            [[assertions]]
            type = "data_frames_sent"
            min = 7
            "#,
        );
        assert_eq!(s.actions.len(), 1);
        assert_eq!(s.assertions.len(), 2);
        assert_eq!(s.loss.seed, Some(7));
        assert!(s.loss.receiver.is_none());
        assert_eq!(s.input.materialize().len(), 5000);
    }

    #[test]
    fn lossless_scenario_passes() {
        let s = scenario(
            r#"
            name = "gbn text"

            [protocol]
            kind = "go-back-n"

            [input]
            type = "text"
            text = "hello, world"

            [[assertions]]
            type = "output_matches_input"

            [[assertions]]
            type = "data_frames_sent"
            min = 2
            max = 2

            [[assertions]]
            type = "completed"
            expected = true
            "#,
        );
        let report = run_loaded(&s).unwrap();
        assert_eq!(report.output, b"hello, world");
    }

    #[test]
    fn failing_assertion_is_reported() {
        let s = scenario(
            r#"
            name = "too strict"

            [input]
            type = "text"
            text = "abc"

            [[assertions]]
            type = "acks_received"
            min = 5
            "#,
        );
        let err = run_loaded(&s).unwrap_err();
        assert!(err.to_string().contains("Assertion Failed"));
    }

    #[test]
    fn invalid_window_is_rejected() {
        let s = scenario(
            r#"
            name = "bad window"

            [protocol]
            kind = "selective-repeat"
            window_size = 5
            modulus = 8

            [input]
            type = "text"
            text = "abc"
            "#,
        );
        assert!(run_loaded(&s).is_err());
    }
}
