use std::fs;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::refill::needs_refill;

/// Per-dose status for a medicine. Absent means upcoming; `missed` is
/// derived at read time and only `done` is ever written back.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DoseStatus {
    Upcoming,
    Done,
    Missed,
}

/// One prescribed medicine, in the document-store schema: numeric fields
/// are decimal strings and field names are camelCase on disk.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub name: String,
    pub total_pills_prescribed: String,
    /// Remaining count; defaults to `total_pills_prescribed` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pills_left: Option<i64>,
    pub pills_per_day_to_be_taken: String,
    pub days_per_week_to_take_the_prescription: String,
    /// Comma-separated dose times, e.g. "8:00 AM, 8:00 PM". May be empty,
    /// and the entry count need not match `pills_per_day_to_be_taken`.
    pub pill_schedule: String,
    pub refill_or_not: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DoseStatus>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub name: String,
    pub patient_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub medicines: Vec<Medicine>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Registry {
    pub patients: Vec<Patient>,
}

/// A medicine field failed schema validation. Raised fail-fast at write
/// time so a malformed record never lands in the store.
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("medicine name cannot be empty")]
    EmptyName,
    #[error("{field} must be a non-negative whole number, got '{value}'")]
    InvalidCount { field: &'static str, value: String },
    #[error("pillsPerDayToBeTaken must be a positive whole number, got '{value}'")]
    InvalidPerDay { value: String },
    #[error("daysPerWeekToTakeThePrescription must be 1-7, got '{value}'")]
    InvalidDaysPerWeek { value: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to access data file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize registry: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("patient '{0}' already exists")]
    PatientExists(String),
    #[error("patient '{0}' not found")]
    PatientNotFound(String),
    #[error("medicine '{medicine}' not found for patient '{patient}'")]
    MedicineNotFound { patient: String, medicine: String },
    #[error("medicine '{medicine}' already exists for patient '{patient}'")]
    MedicineExists { patient: String, medicine: String },
    #[error("no pills left for '{0}'; refill before taking another dose")]
    NoPillsLeft(String),
}

impl Medicine {
    /// Prescribed total as a number; 0 when the stored string is malformed
    /// (validation prevents that for records written by this tool, but the
    /// store tolerates foreign records).
    pub fn total_prescribed(&self) -> i64 {
        self.total_pills_prescribed.trim().parse().unwrap_or(0)
    }

    pub fn pills_remaining(&self) -> i64 {
        self.pills_left.unwrap_or_else(|| self.total_prescribed())
    }

    pub fn is_exhausted(&self) -> bool {
        self.pills_remaining() <= 0
    }

    /// Current urgency, combining the explicit flag with the quantity
    /// threshold.
    pub fn refill_needed(&self) -> bool {
        needs_refill(
            self.pills_remaining(),
            self.total_prescribed(),
            self.refill_or_not,
        )
    }

    /// Display string combining per-day count and remaining inventory.
    pub fn dosage_display(&self) -> String {
        format!(
            "{}x daily - {}/{} pills",
            self.pills_per_day_to_be_taken.trim(),
            self.pills_remaining(),
            self.total_prescribed(),
        )
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self
            .total_pills_prescribed
            .trim()
            .parse::<i64>()
            .map(|n| n < 0)
            .unwrap_or(true)
        {
            return Err(ValidationError::InvalidCount {
                field: "totalPillsPrescribed",
                value: self.total_pills_prescribed.clone(),
            });
        }
        if self
            .pills_per_day_to_be_taken
            .trim()
            .parse::<i64>()
            .map(|n| n <= 0)
            .unwrap_or(true)
        {
            return Err(ValidationError::InvalidPerDay {
                value: self.pills_per_day_to_be_taken.clone(),
            });
        }
        if self
            .days_per_week_to_take_the_prescription
            .trim()
            .parse::<i64>()
            .map(|n| !(1..=7).contains(&n))
            .unwrap_or(true)
        {
            return Err(ValidationError::InvalidDaysPerWeek {
                value: self.days_per_week_to_take_the_prescription.clone(),
            });
        }
        Ok(())
    }
}

/// Loads the patient registry from disk.
///
/// If the file doesn't exist, returns an empty registry. If it is
/// corrupted, creates a `.corrupted` backup and returns an empty registry
/// so the tool stays usable.
pub fn load_registry(path: &Path) -> Registry {
    if !path.exists() {
        return Registry::default();
    }

    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: Failed to read patient data file: {}", e);
            eprintln!(
                "Using empty registry. Check file permissions on: {}",
                path.display()
            );
            return Registry::default();
        }
    };

    match serde_json::from_str::<Registry>(&contents) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("WARNING: Patient data file cannot be parsed: {}", e);
            eprintln!("File location: {}", path.display());

            let backup_path = path.with_extension("json.corrupted");
            if let Err(backup_err) = fs::copy(path, &backup_path) {
                eprintln!("Failed to create backup: {}", backup_err);
            } else {
                eprintln!("Backup created at: {}", backup_path.display());
            }

            eprintln!("Starting with an empty patient registry.");
            Registry::default()
        }
    }
}

/// Saves the registry to disk atomically.
///
/// Writes to a temp file then renames (atomic on POSIX), and sets 0600
/// permissions on Unix for privacy.
pub fn save_registry(path: &Path, registry: &Registry) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(registry)?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &json)?;

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    #[cfg(unix)]
    {
        if let Ok(metadata) = fs::metadata(path) {
            let mut perms = metadata.permissions();
            perms.set_mode(0o600);
            if let Err(e) = fs::set_permissions(path, perms) {
                eprintln!("Warning: Failed to set file permissions: {}", e);
            }
        }
    }

    Ok(())
}

fn next_doc_id(registry: &Registry) -> String {
    let max = registry
        .patients
        .iter()
        .filter_map(|p| p.id.strip_prefix('p').and_then(|n| n.parse::<u64>().ok()))
        .max()
        .unwrap_or(0);
    format!("p{}", max + 1)
}

fn find_patient_mut<'a>(
    registry: &'a mut Registry,
    name: &str,
) -> Result<&'a mut Patient, StoreError> {
    let name_lower = name.to_lowercase();
    registry
        .patients
        .iter_mut()
        .find(|p| p.name.to_lowercase() == name_lower)
        .ok_or_else(|| StoreError::PatientNotFound(name.to_string()))
}

fn find_medicine_mut<'a>(
    patient: &'a mut Patient,
    medicine: &str,
) -> Result<&'a mut Medicine, StoreError> {
    let med_lower = medicine.to_lowercase();
    let patient_name = patient.name.clone();
    patient
        .medicines
        .iter_mut()
        .find(|m| m.name.to_lowercase() == med_lower)
        .ok_or(StoreError::MedicineNotFound {
            patient: patient_name,
            medicine: medicine.to_string(),
        })
}

/// Adds a new patient record. Patient names are unique case-insensitively.
pub fn add_patient(
    path: &Path,
    name: String,
    patient_id: String,
    dob: Option<String>,
    gender: Option<String>,
    notes: Option<String>,
) -> Result<Patient, StoreError> {
    let mut registry = load_registry(path);

    let name_lower = name.to_lowercase();
    if registry
        .patients
        .iter()
        .any(|p| p.name.to_lowercase() == name_lower)
    {
        return Err(StoreError::PatientExists(name));
    }

    let patient = Patient {
        id: next_doc_id(&registry),
        name,
        patient_id,
        dob,
        gender,
        phone: None,
        email: None,
        emergency_contact: None,
        height: None,
        weight: None,
        notes,
        medicines: Vec::new(),
    };
    registry.patients.push(patient.clone());
    registry.patients.sort_by(|a, b| a.name.cmp(&b.name));
    save_registry(path, &registry)?;
    Ok(patient)
}

/// Inserts a fully-formed patient (e.g. from AI intake), validating every
/// medicine before anything is written.
pub fn insert_patient(path: &Path, mut patient: Patient) -> Result<Patient, StoreError> {
    for med in &patient.medicines {
        med.validate()?;
    }

    let mut registry = load_registry(path);
    let name_lower = patient.name.to_lowercase();
    if registry
        .patients
        .iter()
        .any(|p| p.name.to_lowercase() == name_lower)
    {
        return Err(StoreError::PatientExists(patient.name));
    }

    patient.id = next_doc_id(&registry);
    registry.patients.push(patient.clone());
    registry.patients.sort_by(|a, b| a.name.cmp(&b.name));
    save_registry(path, &registry)?;
    Ok(patient)
}

/// Adds a medicine to an existing patient, validating fail-fast.
pub fn add_medicine(path: &Path, patient_name: &str, medicine: Medicine) -> Result<(), StoreError> {
    medicine.validate()?;

    let mut registry = load_registry(path);
    let patient = find_patient_mut(&mut registry, patient_name)?;

    let med_lower = medicine.name.to_lowercase();
    if patient
        .medicines
        .iter()
        .any(|m| m.name.to_lowercase() == med_lower)
    {
        return Err(StoreError::MedicineExists {
            patient: patient.name.clone(),
            medicine: medicine.name,
        });
    }

    patient.medicines.push(medicine);
    save_registry(path, &registry)?;
    Ok(())
}

/// Outcome of taking one pill, for display.
pub struct TakeOutcome {
    pub pills_left: i64,
    pub total_prescribed: i64,
    pub refill_flagged: bool,
}

/// Take one pill: decrement the remaining count, re-derive the refill flag
/// through the threshold policy, mark the medicine done, and persist.
///
/// The flag recomputation is one-directional: the current flag feeds back
/// in as the explicit flag, so once on it stays on until manually cleared.
/// Nothing is persisted if the save fails, so in-memory and on-disk state
/// never diverge.
pub fn take_pill(
    path: &Path,
    patient_name: &str,
    medicine_name: &str,
) -> Result<TakeOutcome, StoreError> {
    let mut registry = load_registry(path);
    let patient = find_patient_mut(&mut registry, patient_name)?;
    let med = find_medicine_mut(patient, medicine_name)?;

    let left = med.pills_remaining();
    if left <= 0 {
        return Err(StoreError::NoPillsLeft(med.name.clone()));
    }

    let new_left = left - 1;
    med.pills_left = Some(new_left);
    med.refill_or_not = needs_refill(new_left, med.total_prescribed(), med.refill_or_not);
    med.status = Some(DoseStatus::Done);

    let outcome = TakeOutcome {
        pills_left: new_left,
        total_prescribed: med.total_prescribed(),
        refill_flagged: med.refill_or_not,
    };

    save_registry(path, &registry)?;
    Ok(outcome)
}

/// Set or clear the explicit refill flag. Clearing is the only way an
/// already-flagged medicine drops back out of Action Needed.
pub fn set_refill(
    path: &Path,
    patient_name: &str,
    medicine_name: &str,
    on: bool,
) -> Result<(), StoreError> {
    let mut registry = load_registry(path);
    let patient = find_patient_mut(&mut registry, patient_name)?;
    let med = find_medicine_mut(patient, medicine_name)?;

    med.refill_or_not = on;

    save_registry(path, &registry)?;
    Ok(())
}

/// Clear `done` statuses so each day starts fresh (called at midnight by
/// the daemon).
pub fn reset_statuses(path: &Path) -> Result<usize, StoreError> {
    let mut registry = load_registry(path);
    let mut reset_count = 0;

    for patient in registry.patients.iter_mut() {
        for med in patient.medicines.iter_mut() {
            if med.status == Some(DoseStatus::Done) {
                med.status = None;
                reset_count += 1;
            }
        }
    }

    if reset_count > 0 {
        save_registry(path, &registry)?;
    }
    Ok(reset_count)
}
