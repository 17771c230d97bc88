use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Time-of-day (or urgency) bucket used to section the reminders list.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReminderGroup {
    ActionNeeded,
    Morning,
    Afternoon,
    Evening,
    Other,
}

impl ReminderGroup {
    /// Fixed display order for reminder sections.
    pub const SECTION_ORDER: [ReminderGroup; 5] = [
        ReminderGroup::ActionNeeded,
        ReminderGroup::Morning,
        ReminderGroup::Afternoon,
        ReminderGroup::Evening,
        ReminderGroup::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ReminderGroup::ActionNeeded => "Action Needed",
            ReminderGroup::Morning => "Morning",
            ReminderGroup::Afternoon => "Afternoon",
            ReminderGroup::Evening => "Evening",
            ReminderGroup::Other => "Other",
        }
    }
}

impl fmt::Display for ReminderGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn am_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{1,2}(?::\d{2})?\s*AM").unwrap())
}

fn pm_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,2})(?::\d{2})?\s*PM").unwrap())
}

/// Bucket a medicine's schedule string into a reminder group.
///
/// Refill urgency dominates: a medicine flagged for refill is always
/// `ActionNeeded` regardless of its schedule. Otherwise the first AM time
/// token wins Morning; a PM token is Afternoon for literal hours 1-5 and
/// Evening for 12 and 6-11 (the hour is the numeral written before "PM",
/// with no 12-hour conversion applied). Schedules with no time token fall
/// back to keyword matching, then `Other`.
///
/// Multi-dose schedules get a single label: the precedence above is applied
/// once over the whole joined string, not per dose.
pub fn classify(schedule: &str, refill_needed: bool) -> ReminderGroup {
    if refill_needed {
        return ReminderGroup::ActionNeeded;
    }

    let upper = schedule.trim().to_uppercase();
    if upper.is_empty() {
        return ReminderGroup::Other;
    }

    if am_token().is_match(&upper) {
        return ReminderGroup::Morning;
    }

    if let Some(caps) = pm_token().captures(&upper) {
        let hour: u32 = caps[1].parse().unwrap_or(0);
        return if (1..6).contains(&hour) {
            ReminderGroup::Afternoon
        } else {
            ReminderGroup::Evening
        };
    }

    if upper.contains("MORNING") {
        ReminderGroup::Morning
    } else if upper.contains("AFTERNOON") || upper.contains("NOON") {
        ReminderGroup::Afternoon
    } else if upper.contains("EVENING") || upper.contains("NIGHT") {
        ReminderGroup::Evening
    } else {
        ReminderGroup::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refill_dominates() {
        assert_eq!(classify("9:30 AM", true), ReminderGroup::ActionNeeded);
        assert_eq!(classify("", true), ReminderGroup::ActionNeeded);
        assert_eq!(classify("anything at all", true), ReminderGroup::ActionNeeded);
    }

    #[test]
    fn test_empty_schedule() {
        assert_eq!(classify("", false), ReminderGroup::Other);
        assert_eq!(classify("   ", false), ReminderGroup::Other);
    }

    #[test]
    fn test_am_is_morning() {
        assert_eq!(classify("9:30 AM", false), ReminderGroup::Morning);
        assert_eq!(classify("8:00 am", false), ReminderGroup::Morning);
        // AM wins over a later PM dose: one label per card
        assert_eq!(classify("8:00 AM, 8:00 PM", false), ReminderGroup::Morning);
    }

    #[test]
    fn test_pm_hour_buckets() {
        // Literal PM hour 1-5 is Afternoon
        assert_eq!(classify("1:00 PM", false), ReminderGroup::Afternoon);
        assert_eq!(classify("2:00 PM", false), ReminderGroup::Afternoon);
        assert_eq!(classify("5:59 PM", false), ReminderGroup::Afternoon);
        // 12 PM and 6-11 PM are Evening
        assert_eq!(classify("12:00 PM", false), ReminderGroup::Evening);
        assert_eq!(classify("6:00 PM", false), ReminderGroup::Evening);
        assert_eq!(classify("8:00 PM", false), ReminderGroup::Evening);
        assert_eq!(classify("11:00 PM", false), ReminderGroup::Evening);
        // Bare numeral before PM, no minutes
        assert_eq!(classify("3 PM", false), ReminderGroup::Afternoon);
        assert_eq!(classify("7 PM", false), ReminderGroup::Evening);
    }

    #[test]
    fn test_keyword_fallback() {
        assert_eq!(classify("every morning", false), ReminderGroup::Morning);
        assert_eq!(classify("around noon", false), ReminderGroup::Afternoon);
        assert_eq!(classify("in the afternoon", false), ReminderGroup::Afternoon);
        assert_eq!(classify("each evening", false), ReminderGroup::Evening);
        assert_eq!(classify("at night", false), ReminderGroup::Evening);
        assert_eq!(classify("with meals", false), ReminderGroup::Other);
    }

    #[test]
    fn test_section_order_is_fixed() {
        assert_eq!(
            ReminderGroup::SECTION_ORDER[0],
            ReminderGroup::ActionNeeded
        );
        assert_eq!(ReminderGroup::SECTION_ORDER[4], ReminderGroup::Other);
    }
}
