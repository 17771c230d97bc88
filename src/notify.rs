use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::ReminderItem;
use crate::timeparse::{parse_time, schedule_tokens};

/// A daily-repeating scheduled notification, as held by the platform
/// store. Fires at `hour:minute` every day until canceled.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScheduledEntry {
    pub id: String,
    pub title: String,
    pub body: String,
    pub hour: u32,
    pub minute: u32,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to access schedule file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize schedule: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The platform's scheduled-notification store. The syncer only creates,
/// cancels and enumerates entries; it does not own their storage.
pub trait NotificationStore {
    fn schedule_daily(
        &mut self,
        id: &str,
        title: &str,
        body: &str,
        hour: u32,
        minute: u32,
    ) -> Result<(), NotifyError>;
    fn cancel(&mut self, id: &str) -> Result<(), NotifyError>;
    fn cancel_all(&mut self) -> Result<(), NotifyError>;
    fn list_scheduled(&self) -> Vec<ScheduledEntry>;
}

/// JSON-file-backed notification store, read by the reminder daemon.
pub struct ScheduleFile {
    path: PathBuf,
    entries: Vec<ScheduledEntry>,
}

impl ScheduleFile {
    /// Opens the schedule file, starting empty if it is missing or
    /// unreadable (a stale schedule is recreated on the next sync anyway).
    pub fn open(path: &Path) -> Self {
        let entries = fs::read_to_string(path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default();
        ScheduleFile {
            path: path.to_path_buf(),
            entries,
        }
    }

    fn persist(&self) -> Result<(), NotifyError> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &json)?;
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

impl NotificationStore for ScheduleFile {
    fn schedule_daily(
        &mut self,
        id: &str,
        title: &str,
        body: &str,
        hour: u32,
        minute: u32,
    ) -> Result<(), NotifyError> {
        self.entries.push(ScheduledEntry {
            id: id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            hour,
            minute,
        });
        self.persist()
    }

    fn cancel(&mut self, id: &str) -> Result<(), NotifyError> {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        if self.entries.len() != before {
            self.persist()?;
        }
        Ok(())
    }

    fn cancel_all(&mut self) -> Result<(), NotifyError> {
        self.entries.clear();
        self.persist()
    }

    fn list_scheduled(&self) -> Vec<ScheduledEntry> {
        self.entries.clone()
    }
}

/// Identifier convention for scheduled entries:
/// `patient-medicine-time` with every whitespace character replaced by `_`.
pub fn notification_id(patient: &str, medicine: &str, time: &str) -> String {
    format!("{}-{}-{}", patient, medicine, time)
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Why a dose was skipped during a sync, kept in the report so silent
/// skips stay observable.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    UnparsableTime,
    Exhausted,
    Platform(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnparsableTime => write!(f, "unparsable time"),
            SkipReason::Exhausted => write!(f, "no pills left"),
            SkipReason::Platform(e) => write!(f, "scheduling failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDose {
    pub patient: String,
    pub medicine: String,
    pub token: String,
    pub reason: SkipReason,
}

/// Result of one sync pass. `scheduled` counts only successfully created
/// entries; everything else lands in `skipped` with a reason.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub scheduled: usize,
    pub skipped: Vec<SkippedDose>,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("a sync is already in progress")]
    AlreadyRunning,
    #[error(transparent)]
    Store(#[from] NotifyError),
}

/// Reconciles the desired reminder set against the notification store
/// with a cancel-all-then-recreate pass.
///
/// Not safe to run concurrently with itself: a second pass racing the
/// first's cancel-all could duplicate or drop entries, so an in-flight
/// guard rejects overlapping calls.
pub struct NotificationSyncer {
    in_flight: AtomicBool,
}

impl NotificationSyncer {
    pub fn new() -> Self {
        NotificationSyncer {
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn sync(
        &self,
        store: &mut dyn NotificationStore,
        reminders: &[ReminderItem],
    ) -> Result<SyncReport, SyncError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(SyncError::AlreadyRunning);
        }
        let result = self.run(store, reminders);
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    fn run(
        &self,
        store: &mut dyn NotificationStore,
        reminders: &[ReminderItem],
    ) -> Result<SyncReport, SyncError> {
        // Full wipe first; individual entries are still canceled defensively
        // below in case a partial failure here left stragglers.
        store.cancel_all()?;

        let mut report = SyncReport::default();

        for reminder in reminders {
            // Exhausted medicines get no reminders, at every entrypoint.
            if reminder.pills_left <= 0 {
                report.skipped.push(SkippedDose {
                    patient: reminder.patient.clone(),
                    medicine: reminder.medicine.clone(),
                    token: reminder.schedule.clone(),
                    reason: SkipReason::Exhausted,
                });
                continue;
            }

            for token in schedule_tokens(&reminder.schedule) {
                let Some((hour, minute)) = parse_time(token) else {
                    report.skipped.push(SkippedDose {
                        patient: reminder.patient.clone(),
                        medicine: reminder.medicine.clone(),
                        token: token.to_string(),
                        reason: SkipReason::UnparsableTime,
                    });
                    continue;
                };

                let id = notification_id(&reminder.patient, &reminder.medicine, token);
                let _ = store.cancel(&id);

                let body = format!(
                    "{} for {} at {}",
                    reminder.medicine, reminder.patient, token
                );
                match store.schedule_daily(&id, "Medication Reminder", &body, hour, minute) {
                    Ok(()) => report.scheduled += 1,
                    Err(e) => {
                        eprintln!(
                            "Failed to schedule {} for {}: {}",
                            reminder.medicine, reminder.patient, e
                        );
                        report.skipped.push(SkippedDose {
                            patient: reminder.patient.clone(),
                            medicine: reminder.medicine.clone(),
                            token: token.to_string(),
                            reason: SkipReason::Platform(e.to_string()),
                        });
                    }
                }
            }
        }

        Ok(report)
    }
}

impl Default for NotificationSyncer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ReminderGroup;
    use crate::store::DoseStatus;
    use tempfile::TempDir;

    fn item(patient: &str, medicine: &str, schedule: &str, pills_left: i64) -> ReminderItem {
        ReminderItem {
            id: "p1-0".to_string(),
            patient: patient.to_string(),
            medicine: medicine.to_string(),
            dosage: String::new(),
            schedule: schedule.to_string(),
            group: ReminderGroup::Other,
            urgent: false,
            status: DoseStatus::Upcoming,
            pills_left,
        }
    }

    #[test]
    fn test_notification_id_replaces_whitespace() {
        assert_eq!(
            notification_id("Jane Smith", "Metformin", "9:30 AM"),
            "Jane_Smith-Metformin-9:30_AM"
        );
    }

    #[test]
    fn test_sync_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = ScheduleFile::open(&dir.path().join("schedule.json"));

        let reminders = vec![
            item("John Doe", "Lisinopril", "8:00 AM, 8:00 PM", 34),
            item("Jane Smith", "Metformin", "9:30 AM", 4),
        ];
        let report = NotificationSyncer::new()
            .sync(&mut store, &reminders)
            .unwrap();

        assert_eq!(report.scheduled, 3);
        assert!(report.skipped.is_empty());

        let entries = store.list_scheduled();
        assert_eq!(entries.len(), 3);
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert!(ids.contains(&"John_Doe-Lisinopril-8:00_AM"));
        assert!(ids.contains(&"John_Doe-Lisinopril-8:00_PM"));
        assert!(ids.contains(&"Jane_Smith-Metformin-9:30_AM"));
    }

    #[test]
    fn test_two_doses_differ_only_in_time() {
        let dir = TempDir::new().unwrap();
        let mut store = ScheduleFile::open(&dir.path().join("schedule.json"));

        let reminders = vec![item("Jane Smith", "Metformin", "8:00 AM, 8:00 PM", 10)];
        NotificationSyncer::new()
            .sync(&mut store, &reminders)
            .unwrap();

        let entries = store.list_scheduled();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "Jane_Smith-Metformin-8:00_AM");
        assert_eq!(entries[1].id, "Jane_Smith-Metformin-8:00_PM");
        assert_eq!((entries[0].hour, entries[0].minute), (8, 0));
        assert_eq!((entries[1].hour, entries[1].minute), (20, 0));
    }

    #[test]
    fn test_sync_replaces_previous_schedule() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schedule.json");
        let mut store = ScheduleFile::open(&path);
        let syncer = NotificationSyncer::new();

        syncer
            .sync(&mut store, &[item("A", "X", "8:00 AM", 10)])
            .unwrap();
        syncer
            .sync(&mut store, &[item("B", "Y", "9:00 AM", 10)])
            .unwrap();

        // Cancel-all means only the latest desired set survives, also on a
        // freshly reopened store.
        let reopened = ScheduleFile::open(&path);
        let entries = reopened.list_scheduled();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "B-Y-9:00_AM");
    }

    #[test]
    fn test_parse_failures_skipped_not_counted() {
        let dir = TempDir::new().unwrap();
        let mut store = ScheduleFile::open(&dir.path().join("schedule.json"));

        let reminders = vec![item("Jane", "Metformin", "9:30 AM, garbage, 8:00 PM", 10)];
        let report = NotificationSyncer::new()
            .sync(&mut store, &reminders)
            .unwrap();

        assert_eq!(report.scheduled, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].token, "garbage");
        assert_eq!(report.skipped[0].reason, SkipReason::UnparsableTime);
    }

    #[test]
    fn test_exhausted_medicine_not_scheduled() {
        let dir = TempDir::new().unwrap();
        let mut store = ScheduleFile::open(&dir.path().join("schedule.json"));

        let reminders = vec![
            item("Jane", "Metformin", "9:30 AM", 0),
            item("John", "Aspirin", "8:00 AM", 5),
        ];
        let report = NotificationSyncer::new()
            .sync(&mut store, &reminders)
            .unwrap();

        assert_eq!(report.scheduled, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, SkipReason::Exhausted);
        assert_eq!(store.list_scheduled()[0].id, "John-Aspirin-8:00_AM");
    }

    #[test]
    fn test_empty_schedule_produces_nothing() {
        let dir = TempDir::new().unwrap();
        let mut store = ScheduleFile::open(&dir.path().join("schedule.json"));

        let report = NotificationSyncer::new()
            .sync(&mut store, &[item("Jane", "Metformin", "", 10)])
            .unwrap();

        assert_eq!(report.scheduled, 0);
        assert!(report.skipped.is_empty());
        assert!(store.list_scheduled().is_empty());
    }

    #[test]
    fn test_overlapping_sync_rejected() {
        use std::sync::mpsc;
        use std::sync::Arc;
        use std::thread;

        // Store that parks inside the sync pass until released, keeping the
        // first sync in flight while a second one is attempted.
        struct BlockingStore {
            entered: mpsc::Sender<()>,
            release: mpsc::Receiver<()>,
        }
        impl NotificationStore for BlockingStore {
            fn schedule_daily(
                &mut self,
                _id: &str,
                _title: &str,
                _body: &str,
                _hour: u32,
                _minute: u32,
            ) -> Result<(), NotifyError> {
                Ok(())
            }
            fn cancel(&mut self, _id: &str) -> Result<(), NotifyError> {
                Ok(())
            }
            fn cancel_all(&mut self) -> Result<(), NotifyError> {
                self.entered.send(()).unwrap();
                self.release.recv().unwrap();
                Ok(())
            }
            fn list_scheduled(&self) -> Vec<ScheduledEntry> {
                Vec::new()
            }
        }

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let syncer = Arc::new(NotificationSyncer::new());

        let background = Arc::clone(&syncer);
        let handle = thread::spawn(move || {
            let mut store = BlockingStore {
                entered: entered_tx,
                release: release_rx,
            };
            background.sync(&mut store, &[item("Jane", "Metformin", "9:30 AM", 10)])
        });

        // Wait until the first sync is provably inside its pass.
        entered_rx.recv().unwrap();

        let dir = TempDir::new().unwrap();
        let mut other = ScheduleFile::open(&dir.path().join("schedule.json"));
        let second = syncer.sync(&mut other, &[]);
        assert!(matches!(second, Err(SyncError::AlreadyRunning)));

        release_tx.send(()).unwrap();
        let first = handle.join().unwrap().unwrap();
        assert_eq!(first.scheduled, 1);

        // Guard released once the first sync finished.
        assert!(syncer.sync(&mut other, &[]).is_ok());
    }

    #[test]
    fn test_platform_failure_does_not_abort_fanout() {
        // Store whose schedule_daily fails for one specific id.
        struct FlakyStore {
            fail_id: String,
            entries: Vec<ScheduledEntry>,
        }
        impl NotificationStore for FlakyStore {
            fn schedule_daily(
                &mut self,
                id: &str,
                title: &str,
                body: &str,
                hour: u32,
                minute: u32,
            ) -> Result<(), NotifyError> {
                if id == self.fail_id {
                    return Err(NotifyError::Io(std::io::Error::other("denied")));
                }
                self.entries.push(ScheduledEntry {
                    id: id.to_string(),
                    title: title.to_string(),
                    body: body.to_string(),
                    hour,
                    minute,
                });
                Ok(())
            }
            fn cancel(&mut self, id: &str) -> Result<(), NotifyError> {
                self.entries.retain(|e| e.id != id);
                Ok(())
            }
            fn cancel_all(&mut self) -> Result<(), NotifyError> {
                self.entries.clear();
                Ok(())
            }
            fn list_scheduled(&self) -> Vec<ScheduledEntry> {
                self.entries.clone()
            }
        }

        let mut store = FlakyStore {
            fail_id: "Jane-Metformin-8:00_AM".to_string(),
            entries: Vec::new(),
        };
        let reminders = vec![item("Jane", "Metformin", "8:00 AM, 8:00 PM", 10)];
        let report = NotificationSyncer::new()
            .sync(&mut store, &reminders)
            .unwrap();

        assert_eq!(report.scheduled, 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(report.skipped[0].reason, SkipReason::Platform(_)));
        assert_eq!(store.list_scheduled()[0].id, "Jane-Metformin-8:00_PM");
    }
}
