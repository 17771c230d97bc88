use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Local;
use clap::{Parser, Subcommand};

use aggregate::{aggregate, group_sections};
use ai::AiClient;
use config::Config;
use daemon::run_daemon;
use notify::{NotificationSyncer, ScheduleFile};
use store::{
    add_medicine, add_patient, insert_patient, load_registry, set_refill, take_pill, DoseStatus,
    Medicine,
};

pub mod aggregate;
pub mod ai;
pub mod classify;
pub mod config;
pub mod daemon;
pub mod notify;
pub mod refill;
pub mod store;
pub mod timeparse;

#[derive(Parser)]
#[command(name = "medtrack")]
#[command(
    about = "CLI-first patient medication tracking tool",
    long_about = "Track patients and their medicines, view time-of-day grouped reminders, and sync daily medication notifications. Everything is saved as JSON for easy import/export."
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new patient
    #[command(visible_alias = "ap")]
    AddPatient {
        /// Patient's full name
        name: String,
        /// ID number (e.g. "P-7721")
        #[arg(short, long)]
        id: String,
        /// Date of birth
        #[arg(long)]
        dob: Option<String>,
        /// Gender
        #[arg(long)]
        gender: Option<String>,
        /// Notes / history
        #[arg(long)]
        notes: Option<String>,
    },
    /// Add a medicine to a patient
    #[command(visible_alias = "am")]
    AddMed {
        /// Patient name
        patient: String,
        /// Medicine name
        name: String,
        /// Total pills prescribed
        #[arg(short, long)]
        total: u32,
        /// Pills per day
        #[arg(short, long, default_value_t = 1)]
        per_day: u32,
        /// Days per week (1-7)
        #[arg(short, long, default_value_t = 7)]
        days: u32,
        /// Dose times, comma-separated (e.g. "8:00 AM, 8:00 PM")
        #[arg(short, long, default_value = "")]
        schedule: String,
        /// Flag the medicine for refill immediately
        #[arg(long)]
        refill: bool,
    },
    /// List all patients
    #[command(visible_aliases = ["l", "ls"])]
    List,
    /// Show reminders grouped by time of day
    #[command(visible_alias = "rem")]
    Reminders,
    /// Take one pill of a medicine
    #[command(visible_alias = "t")]
    Take {
        /// Patient name
        patient: String,
        /// Medicine name
        medicine: String,
    },
    /// Set or clear a medicine's refill flag
    Refill {
        /// Patient name
        patient: String,
        /// Medicine name
        medicine: String,
        /// Clear the flag instead of setting it
        #[arg(long)]
        clear: bool,
    },
    /// Sync daily reminder notifications from the current patient data
    #[command(visible_alias = "s")]
    Sync,
    /// Start the background daemon that delivers due reminders
    #[command(visible_alias = "d")]
    Daemon,
    /// Create a patient from a transcript file using AI extraction
    Intake {
        /// Path to a plain-text transcript
        transcript: PathBuf,
    },
    /// Create a patient from an audio recording (transcribe + extract)
    Record {
        /// Path to an audio file (e.g. .m4a, .wav)
        audio: PathBuf,
    },
    /// Generate an AI summary of a patient record
    Summarize {
        /// Patient name
        patient: String,
        /// Translate the summary to this language
        #[arg(long)]
        language: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_env();

    let result = match cli.command {
        Commands::AddPatient {
            name,
            id,
            dob,
            gender,
            notes,
        } => cmd_add_patient(&config, name, id, dob, gender, notes),
        Commands::AddMed {
            patient,
            name,
            total,
            per_day,
            days,
            schedule,
            refill,
        } => cmd_add_med(&config, patient, name, total, per_day, days, schedule, refill),
        Commands::List => cmd_list(&config),
        Commands::Reminders => cmd_reminders(&config),
        Commands::Take { patient, medicine } => cmd_take(&config, &patient, &medicine),
        Commands::Refill {
            patient,
            medicine,
            clear,
        } => cmd_refill(&config, &patient, &medicine, clear),
        Commands::Sync => cmd_sync(&config),
        Commands::Daemon => {
            run_daemon(&config);
            Ok(())
        }
        Commands::Intake { transcript } => cmd_intake(&config, &transcript),
        Commands::Record { audio } => cmd_record(&config, &audio),
        Commands::Summarize { patient, language } => cmd_summarize(&config, &patient, language),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_add_patient(
    config: &Config,
    name: String,
    id: String,
    dob: Option<String>,
    gender: Option<String>,
    notes: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if name.trim().is_empty() {
        return Err("patient name cannot be empty".into());
    }
    let patient = add_patient(&config.data_file, name, id, dob, gender, notes)?;
    println!("Added patient: {} (ID #{})", patient.name, patient.patient_id);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_add_med(
    config: &Config,
    patient: String,
    name: String,
    total: u32,
    per_day: u32,
    days: u32,
    schedule: String,
    refill: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    // Warn about unparsable dose times up front; they would be silently
    // skipped at sync time.
    for token in timeparse::schedule_tokens(&schedule) {
        if timeparse::parse_time(token).is_none() {
            eprintln!(
                "Warning: '{}' is not a valid dose time (expected e.g. '8:00 AM'); it will not produce a notification",
                token
            );
        }
    }

    let medicine = Medicine {
        name: name.clone(),
        total_pills_prescribed: total.to_string(),
        pills_left: None,
        pills_per_day_to_be_taken: per_day.to_string(),
        days_per_week_to_take_the_prescription: days.to_string(),
        pill_schedule: schedule,
        refill_or_not: refill,
        status: None,
    };
    add_medicine(&config.data_file, &patient, medicine)?;
    println!("Added medicine '{}' for {}", name, patient);
    Ok(())
}

fn cmd_list(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let registry = load_registry(&config.data_file);

    if registry.patients.is_empty() {
        println!("No patients found.");
        return Ok(());
    }

    println!("\nPatients:");
    println!("{}", "=".repeat(60));
    for patient in &registry.patients {
        let alerts = patient
            .medicines
            .iter()
            .filter(|m| m.refill_needed())
            .count();
        println!("\n{}", patient.name);
        println!("  ID:        #{}", patient.patient_id);
        if let Some(dob) = &patient.dob {
            println!("  DOB:       {}", dob);
        }
        if let Some(gender) = &patient.gender {
            println!("  Gender:    {}", gender);
        }
        println!("  Medicines: {}", patient.medicines.len());
        if alerts > 0 {
            println!("  Alerts:    {} medicine(s) need refill", alerts);
        }
        for med in &patient.medicines {
            let schedule = if med.pill_schedule.is_empty() {
                "no schedule"
            } else {
                &med.pill_schedule
            };
            println!("    - {} ({}) @ {}", med.name, med.dosage_display(), schedule);
        }
    }
    println!();
    Ok(())
}

fn cmd_reminders(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let registry = load_registry(&config.data_file);
    let now = Local::now();
    let items = aggregate(&registry.patients, &now);

    if items.is_empty() {
        println!("No reminders. Add patients and medicines first.");
        return Ok(());
    }

    let upcoming = items.iter().filter(|i| i.status == DoseStatus::Upcoming).count();
    let done = items.iter().filter(|i| i.status == DoseStatus::Done).count();
    let missed = items.iter().filter(|i| i.status == DoseStatus::Missed).count();
    println!(
        "\nReminders: {} total, {} upcoming, {} done, {} missed",
        items.len(),
        upcoming,
        done,
        missed
    );

    for (group, members) in group_sections(&items) {
        println!("\n{}", group.label().to_uppercase());
        println!("{}", "-".repeat(40));
        for item in members {
            let status = match item.status {
                DoseStatus::Upcoming => "Upcoming",
                DoseStatus::Done => "Done",
                DoseStatus::Missed => "Missed",
            };
            let schedule = if item.schedule.is_empty() {
                "no schedule"
            } else {
                &item.schedule
            };
            print!(
                "  {} | {} | {} @ {} [{}]",
                item.medicine, item.dosage, item.patient, schedule, status
            );
            if item.urgent {
                print!("  LOW STOCK");
            }
            println!();
        }
    }
    println!();
    Ok(())
}

fn cmd_take(
    config: &Config,
    patient: &str,
    medicine: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = take_pill(&config.data_file, patient, medicine)?;
    println!(
        "Marked '{}' as taken for {} ({}/{} pills left)",
        medicine, patient, outcome.pills_left, outcome.total_prescribed
    );
    if outcome.refill_flagged {
        println!("Low stock: '{}' is now flagged for refill", medicine);
    }
    Ok(())
}

fn cmd_refill(
    config: &Config,
    patient: &str,
    medicine: &str,
    clear: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    set_refill(&config.data_file, patient, medicine, !clear)?;
    if clear {
        println!("Cleared refill flag on '{}' for {}", medicine, patient);
    } else {
        println!("Flagged '{}' for refill for {}", medicine, patient);
    }
    Ok(())
}

fn cmd_sync(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let registry = load_registry(&config.data_file);
    let now = Local::now();
    let items = aggregate(&registry.patients, &now);

    let mut schedule = ScheduleFile::open(&config.schedule_file);
    let report = NotificationSyncer::new().sync(&mut schedule, &items)?;

    println!("Scheduled {} daily reminder(s)", report.scheduled);
    for skip in &report.skipped {
        println!(
            "  Skipped {} / {} ('{}'): {}",
            skip.patient, skip.medicine, skip.token, skip.reason
        );
    }
    println!("Run 'medtrack daemon' to deliver them.");
    Ok(())
}

fn cmd_intake(
    config: &Config,
    transcript_path: &std::path::Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let transcript = std::fs::read_to_string(transcript_path)?;
    let client = AiClient::new(config)?;

    println!("Extracting patient data from transcript...");
    let intake = client.extract_patient(&transcript)?;
    save_intake(config, intake)
}

fn cmd_record(
    config: &Config,
    audio: &std::path::Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = AiClient::new(config)?;

    println!("Transcribing recording...");
    let intake = client.intake_from_audio(audio)?;
    save_intake(config, intake)
}

fn save_intake(
    config: &Config,
    intake: ai::PatientIntake,
) -> Result<(), Box<dyn std::error::Error>> {
    let patient = intake.into_patient();
    if patient.name.is_empty() {
        return Err("extraction produced no patient name; check the transcript".into());
    }

    let med_count = patient.medicines.len();
    let patient = insert_patient(&config.data_file, patient)?;
    println!(
        "Added patient: {} with {} medicine(s)",
        patient.name, med_count
    );
    if med_count > 0 {
        println!("Run 'medtrack sync' to schedule their reminders.");
    }
    Ok(())
}

fn cmd_summarize(
    config: &Config,
    patient_name: &str,
    language: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = load_registry(&config.data_file);
    let name_lower = patient_name.to_lowercase();
    let patient = registry
        .patients
        .iter()
        .find(|p| p.name.to_lowercase() == name_lower)
        .ok_or_else(|| format!("patient '{}' not found", patient_name))?;

    let client = AiClient::new(config)?;
    println!("Generating summary for {}...", patient.name);
    let mut summary = client.summarize(patient)?;

    if let Some(lang) = language {
        summary = client.translate(&summary, &lang)?;
    }

    println!("\n{}", summary);
    Ok(())
}
