// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Command-line surface over the VIN check workflow.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};

use crate::app::Session;
use crate::config::AppConfig;
use crate::models::submission::HistoryItem;
use crate::models::vin::{VinIssue, validate};
use crate::mvu::{AppModel, DecodeState, Msg, Services};
use crate::store::{Collection, list_records};

/// Exit code for input that failed validation.
pub const EXIT_INVALID: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "vincheck", version)]
#[command(about = "Repair, validate, and decode vehicle identification numbers")]
#[command(
    after_help = "Environment:\n  VINCHECK_STORE               local (default) or remote\n  VINCHECK_DATA_DIR            Local store directory\n  VINCHECK_OWNER               Owner id records are stored under\n  VINCHECK_GEMINI_API_KEY      Enables `scan`\n  VINCHECK_COMPLIANCE_WEBHOOK  Enables compliance lookups\n  VINCHECK_LOG_JSON            Emit JSON logs on stderr"
)]
pub struct Cli {
    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Repair and validate a VIN offline.
    Validate {
        #[arg(required = true, num_args = 1..)]
        raw: Vec<String>,
    },
    /// Validate a VIN and look it up in the decode service.
    Decode {
        #[arg(required = true, num_args = 1..)]
        raw: Vec<String>,
        /// Decode even when the check digit does not match.
        #[arg(long)]
        accept_mismatch: bool,
    },
    /// Read a VIN and plate from a label photo.
    Scan { image: PathBuf },
    /// Run the full check: validate, decode, save the submission, look up compliance.
    Check {
        #[arg(required = true, num_args = 1..)]
        raw: Vec<String>,
        #[arg(long)]
        plate: Option<String>,
        /// Submit as unverified when the check digit does not match.
        #[arg(long)]
        accept_mismatch: bool,
    },
    /// Show recent lookups.
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

/// Execute a parsed command line.
pub fn run(cli: Cli, config: &AppConfig) -> Result<ExitCode> {
    let json = cli.json;
    match cli.command {
        Commands::Validate { raw } => Ok(run_validate(&raw.join(" "), json)),
        Commands::Decode {
            raw,
            accept_mismatch,
        } => {
            let mut session = Session::new(Services::from_config(config));
            enter_vin(&mut session, &raw.join(" "), accept_mismatch);
            emit(json, model_json(session.model()), &render_model(session.model()));
            Ok(validation_exit(session.model()))
        }
        Commands::Scan { image } => {
            let mut session = Session::new(Services::from_config(config));
            session.dispatch(Msg::ImageCaptured(image));
            session.settle();
            if let Some(err) = session.model().error.clone() {
                emit(json, json!({ "error": err }), &err);
                return Ok(ExitCode::FAILURE);
            }
            emit(json, model_json(session.model()), &render_model(session.model()));
            Ok(validation_exit(session.model()))
        }
        Commands::Check {
            raw,
            plate,
            accept_mismatch,
        } => {
            let mut session = Session::new(Services::from_config(config));
            if let Some(plate) = plate {
                session.dispatch(Msg::PlateChanged(plate));
            }
            enter_vin(&mut session, &raw.join(" "), accept_mismatch);
            if blocking_issue(session.model()).is_some() {
                emit(json, model_json(session.model()), &render_model(session.model()));
                return Ok(ExitCode::from(EXIT_INVALID));
            }
            session.dispatch(Msg::SubmitRequested);
            session.settle();

            let model = session.model();
            emit(json, model_json(model), &render_model(model));
            if model.last_submission.is_none() {
                return Ok(ExitCode::FAILURE);
            }
            if let Some(err) = &model.error {
                eprintln!("warning: {err}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::History { limit } => {
            let services = Services::from_config(config);
            let items: Vec<HistoryItem> = list_records(
                services.store.as_ref(),
                &services.owner,
                Collection::History,
                limit,
            )
            .context("Failed to load history")?;
            let text = if items.is_empty() {
                "No lookups yet.".to_string()
            } else {
                items
                    .iter()
                    .map(|item| format!("{}  {:?}  {}", format_millis(item.timestamp), item.kind, item.value))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            emit(json, serde_json::to_value(&items)?, &text);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_validate(raw: &str, json: bool) -> ExitCode {
    let report = validate(raw);
    let issue = report.issue();
    let mut value = serde_json::to_value(&report).unwrap_or(Value::Null);
    if let (Some(issue), Value::Object(map)) = (issue, &mut value) {
        map.insert("message".into(), Value::from(issue.to_string()));
    }
    let text = match issue {
        None => format!("{}  OK (check digit {})", report.normalized, check_digit_of(&report.normalized)),
        Some(issue) => format!("{}  {}", report.normalized, issue),
    };
    emit(json, value, &text);
    if issue.is_some() {
        ExitCode::from(EXIT_INVALID)
    } else {
        ExitCode::SUCCESS
    }
}

fn check_digit_of(normalized: &str) -> char {
    normalized.chars().nth(crate::models::vin::CHECK_DIGIT_INDEX).unwrap_or('?')
}

fn enter_vin(session: &mut Session, raw: &str, accept_mismatch: bool) {
    session.dispatch(Msg::InputChanged(raw.to_string()));
    if accept_mismatch && session.model().issue() == Some(VinIssue::ChecksumMismatch) {
        session.dispatch(Msg::OverrideChecksum);
    }
    session.settle();
}

/// A problem that stops the workflow; a mismatch the operator overrode does not.
fn blocking_issue(model: &AppModel) -> Option<VinIssue> {
    model
        .issue()
        .filter(|issue| !(*issue == VinIssue::ChecksumMismatch && model.override_accepted))
}

fn validation_exit(model: &AppModel) -> ExitCode {
    if blocking_issue(model).is_some() {
        ExitCode::from(EXIT_INVALID)
    } else {
        ExitCode::SUCCESS
    }
}

fn emit(json: bool, value: Value, text: &str) {
    if json {
        println!("{value:#}");
    } else {
        println!("{text}");
    }
}

fn format_millis(millis: i64) -> String {
    time::OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .ok()
        .and_then(|t| t.format(&time::format_description::well_known::Rfc3339).ok())
        .unwrap_or_else(|| millis.to_string())
}

fn decode_json(decode: &DecodeState) -> Value {
    match decode {
        DecodeState::Idle => json!({ "state": "idle" }),
        DecodeState::Pending(_) => json!({ "state": "pending" }),
        DecodeState::Decoded(vehicle) => json!({ "state": "decoded", "vehicle": vehicle }),
        DecodeState::Unavailable(message) => json!({ "state": "unavailable", "message": message }),
    }
}

pub fn model_json(model: &AppModel) -> Value {
    json!({
        "vin": model.input,
        "plate": Some(&model.plate).filter(|p| !p.is_empty()),
        "correction": model.correction,
        "report": model.report,
        "message": model.validation_message(),
        "overrideAccepted": model.override_accepted,
        "confidence": model.confidence,
        "decode": decode_json(&model.decode),
        "compliance": model.compliance,
        "submission": model.last_submission,
        "error": model.error,
    })
}

pub fn render_model(model: &AppModel) -> String {
    let mut lines = vec![format!("VIN:        {}", model.input)];
    if !model.plate.is_empty() {
        lines.push(format!("Plate:      {}", model.plate));
    }
    if let Some(confidence) = model.confidence {
        lines.push(format!("Confidence: {confidence:?}"));
    }
    if let Some(correction) = &model.correction {
        lines.push(correction.clone());
    }
    match model.validation_message() {
        Some(message) => lines.push(message),
        None if model.report.is_some() => lines.push("Check digit OK".to_string()),
        None => {}
    }
    match &model.decode {
        DecodeState::Decoded(vehicle) => {
            lines.push(format!("Vehicle:    {}", vehicle.summary()));
            if let Some(weight) = &vehicle.weight_rating {
                lines.push(format!("GVWR:       {weight}"));
            }
            if let Some(engine) = &vehicle.engine_manufacturer {
                lines.push(format!("Engine:     {engine}"));
            }
        }
        DecodeState::Unavailable(message) => lines.push(message.clone()),
        DecodeState::Idle | DecodeState::Pending(_) => {}
    }
    if let Some(submission) = &model.last_submission {
        lines.push(format!("Saved:      {}", submission.summary));
    }
    if let Some(compliance) = &model.compliance {
        let mut line = format!("Compliance: {}", compliance.status.as_str());
        if let Some(detail) = &compliance.detail {
            line.push_str(&format!(" ({detail})"));
        }
        lines.push(line);
    }
    if let Some(err) = &model.error {
        lines.push(format!("Error: {err}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parses_spaced_vin_words() {
        let cli = Cli::try_parse_from(["vincheck", "validate", "1hgcm8263", "3a00435o"]).unwrap();
        match cli.command {
            Commands::Validate { raw } => assert_eq!(raw.join(" "), "1hgcm8263 3a00435o"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_check_flags_and_global_json() {
        let cli = Cli::try_parse_from([
            "vincheck",
            "check",
            "1HGCM82633A004352",
            "--plate",
            "8abc123",
            "--accept-mismatch",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Check {
                plate,
                accept_mismatch,
                ..
            } => {
                assert_eq!(plate.as_deref(), Some("8abc123"));
                assert!(accept_mismatch);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn history_limit_defaults_to_ten() {
        let cli = Cli::try_parse_from(["vincheck", "history"]).unwrap();
        assert!(matches!(cli.command, Commands::History { limit: 10 }));
        assert!(Cli::try_parse_from(["vincheck", "validate"]).is_err());
    }

    #[test]
    fn rendering_reports_override_and_unavailable_decode() {
        let mut model = AppModel::default();
        let mut cmds = Vec::new();
        crate::mvu::update(&mut model, Msg::InputChanged("1HGCM82643A004352".into()), &mut cmds);
        crate::mvu::update(&mut model, Msg::OverrideChecksum, &mut cmds);
        model.decode = DecodeState::Unavailable(crate::mvu::NOT_RECOGNIZED.into());

        let text = render_model(&model);
        assert!(text.contains(crate::mvu::OVERRIDE_NOTICE));
        assert!(text.contains("not recognized"));
        assert!(blocking_issue(&model).is_none());

        let value = model_json(&model);
        assert_eq!(value["decode"]["state"], "unavailable");
        assert_eq!(value["report"]["checksumOk"], false);
        assert_eq!(value["plate"], Value::Null);
    }

    #[test]
    fn validation_failures_exit_with_code_two() {
        assert_eq!(run_validate("1HGCM8", true), ExitCode::from(EXIT_INVALID));
        assert_eq!(run_validate("1HGCM82633A004352", true), ExitCode::SUCCESS);
    }
}
