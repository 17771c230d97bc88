use chrono::{DateTime, Local};
use serde::Serialize;

use crate::classify::{classify, ReminderGroup};
use crate::store::{DoseStatus, Patient};
use crate::timeparse::{is_past_dose_time, parse_time, schedule_tokens};

/// A reminder card derived from one medicine. Pure projection of the
/// patient snapshot: recomputed on every read, never persisted, no
/// identity beyond `patientId-medicineIndex`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReminderItem {
    pub id: String,
    pub patient: String,
    pub medicine: String,
    pub dosage: String,
    pub schedule: String,
    pub group: ReminderGroup,
    pub urgent: bool,
    pub status: DoseStatus,
    pub pills_left: i64,
}

/// Flatten a snapshot of patients into reminder items, one per medicine,
/// preserving input order.
///
/// A pure function of the snapshot and `now`: identical input yields an
/// identical list regardless of when or how often it runs. Status is
/// derived here: a stored `done` is kept, otherwise a medicine whose
/// first parseable dose time is already past today counts as missed.
pub fn aggregate(patients: &[Patient], now: &DateTime<Local>) -> Vec<ReminderItem> {
    let mut items = Vec::new();

    for patient in patients {
        for (idx, med) in patient.medicines.iter().enumerate() {
            let urgent = med.refill_needed();
            let group = classify(&med.pill_schedule, urgent);

            let status = if med.status == Some(DoseStatus::Done) {
                DoseStatus::Done
            } else if first_dose_missed(&med.pill_schedule, now) {
                DoseStatus::Missed
            } else {
                DoseStatus::Upcoming
            };

            items.push(ReminderItem {
                id: format!("{}-{}", patient.id, idx),
                patient: patient.name.clone(),
                medicine: med.name.clone(),
                dosage: med.dosage_display(),
                schedule: med.pill_schedule.clone(),
                group,
                urgent,
                status,
                pills_left: med.pills_remaining(),
            });
        }
    }

    items
}

/// Whether the first parseable dose time in the schedule is already past
/// today. Unparseable tokens are skipped; a schedule with no parseable
/// time can never be missed.
fn first_dose_missed(schedule: &str, now: &DateTime<Local>) -> bool {
    schedule_tokens(schedule)
        .find_map(parse_time)
        .map(|(hour, minute)| is_past_dose_time(now, hour, minute))
        .unwrap_or(false)
}

/// Partition reminder items into display sections in the fixed order
/// {Action Needed, Morning, Afternoon, Evening, Other}, omitting empty
/// sections.
pub fn group_sections(items: &[ReminderItem]) -> Vec<(ReminderGroup, Vec<&ReminderItem>)> {
    ReminderGroup::SECTION_ORDER
        .iter()
        .filter_map(|&group| {
            let members: Vec<&ReminderItem> =
                items.iter().filter(|item| item.group == group).collect();
            if members.is_empty() {
                None
            } else {
                Some((group, members))
            }
        })
        .collect()
}
