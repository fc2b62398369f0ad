use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use labtrend::commands::{ai_setup, exam, patient, reports, CommandError};
use labtrend::config::AppConfig;
use labtrend::core_state::CoreState;
use labtrend::db::ExamListFilter;
use labtrend::models::enums::{ExamStatus, FileKind};
use labtrend::models::ExamMetadata;
use labtrend::trends::{MedicalRecordFilter, TrendQuery};

#[derive(Parser)]
#[command(name = "labtrend", version)]
#[command(about = "Laboratory exam pipeline: extraction, reference flags and patient trends", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage patients
    Patient {
        #[command(subcommand)]
        action: PatientAction,
    },
    /// Upload an exam file and process it
    Upload {
        #[arg(long)]
        patient: Uuid,
        file: PathBuf,
        /// Expected kind (pdf | image); checked against the file content
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        exam_type: Option<String>,
        /// Exam date (YYYY-MM-DD)
        #[arg(long)]
        exam_date: Option<NaiveDate>,
        #[arg(long)]
        lab: Option<String>,
        #[arg(long)]
        physician: Option<String>,
    },
    /// Reset an exam and process it again
    Reprocess {
        exam: Uuid,
    },
    /// Show one exam
    Show {
        exam: Uuid,
    },
    /// List a patient's exams
    List {
        #[arg(long)]
        patient: Uuid,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Delete an exam and its stored file
    Delete {
        exam: Uuid,
    },
    /// Trend series for a patient
    Trends {
        #[arg(long)]
        patient: Uuid,
        /// Parameter name filter; top parameters when omitted
        #[arg(long)]
        parameter: Option<String>,
        #[arg(long, default_value_t = 12)]
        months: u32,
    },
    /// Patient summary with alerts
    Summary {
        #[arg(long)]
        patient: Uuid,
    },
    /// Filtered medical record
    Record {
        #[arg(long)]
        patient: Uuid,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        exam_type: Option<String>,
    },
    /// Upload timeline
    Timeline {
        #[arg(long)]
        patient: Uuid,
    },
    /// Exam counts by status and storage usage
    Stats,
    /// Configuration store
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum PatientAction {
    /// Register a patient
    Add {
        name: String,
        /// Birth date (YYYY-MM-DD)
        #[arg(long)]
        birth_date: Option<NaiveDate>,
    },
    /// Show a patient
    Show { id: Uuid },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Store a setting
    Set {
        key: String,
        value: String,
        #[arg(long)]
        encrypt: bool,
    },
    /// Remove a setting
    Unset { key: String },
    /// Check the external analysis service
    Test,
}

fn main() -> ExitCode {
    labtrend::init_tracing();
    let cli = Cli::parse();

    let state = match CoreState::new(AppConfig::from_env()) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&state, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error [{}]: {e}", e.code());
            ExitCode::FAILURE
        }
    }
}

fn run(state: &Arc<CoreState>, command: Commands) -> Result<(), CommandError> {
    match command {
        Commands::Patient { action } => match action {
            PatientAction::Add { name, birth_date } => {
                print_json(&patient::add_patient(state, &name, birth_date)?)
            }
            PatientAction::Show { id } => print_json(&patient::get_patient(state, &id)?),
        },
        Commands::Upload {
            patient,
            file,
            kind,
            exam_type,
            exam_date,
            lab,
            physician,
        } => {
            let metadata = ExamMetadata {
                exam_type,
                exam_date,
                lab_name: lab,
                requesting_physician: physician,
            };
            let kind = kind.as_deref().map(parse_tag::<FileKind>).transpose()?;
            print_json(&exam::upload_exam_from_path(state, &patient, &file, kind, metadata)?)
        }
        Commands::Reprocess { exam: id } => print_json(&exam::reprocess_exam(state, &id)?),
        Commands::Show { exam: id } => print_json(&exam::get_exam(state, &id)?),
        Commands::List {
            patient,
            status,
            limit,
            offset,
        } => {
            let filter = ExamListFilter {
                status: status.as_deref().map(parse_tag::<ExamStatus>).transpose()?,
                limit,
                offset,
            };
            print_json(&exam::list_patient_exams(state, &patient, &filter)?)
        }
        Commands::Delete { exam: id } => {
            exam::delete_exam(state, &id)?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        Commands::Trends {
            patient,
            parameter,
            months,
        } => {
            let query = TrendQuery { parameter, months };
            print_json(&reports::patient_trends(state, &patient, &query)?)
        }
        Commands::Summary { patient } => print_json(&reports::patient_summary(state, &patient)?),
        Commands::Record {
            patient,
            from,
            to,
            exam_type,
        } => {
            let filter = MedicalRecordFilter {
                start_date: from,
                end_date: to,
                exam_type,
            };
            print_json(&reports::medical_record(state, &patient, &filter)?)
        }
        Commands::Timeline { patient } => print_json(&reports::patient_timeline(state, &patient)?),
        Commands::Stats => print_json(&exam::exam_stats(state)?),
        Commands::Config { action } => match action {
            ConfigAction::Set {
                key,
                value,
                encrypt,
            } => {
                ai_setup::set_config(state, &key, &value, encrypt)?;
                print_json(&serde_json::json!({ "stored": key }))
            }
            ConfigAction::Unset { key } => {
                ai_setup::remove_config(state, &key)?;
                print_json(&serde_json::json!({ "removed": key }))
            }
            ConfigAction::Test => print_json(&ai_setup::test_analysis_service(state)?),
        },
    }
}

fn parse_tag<T: std::str::FromStr>(raw: &str) -> Result<T, CommandError> {
    raw.parse()
        .map_err(|_| CommandError::InvalidInput(format!("unknown value '{raw}'")))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CommandError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CommandError::InvalidInput(e.to_string()))?;
    println!("{json}");
    Ok(())
}
