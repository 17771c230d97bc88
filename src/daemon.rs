use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use chrono::{Datelike, Local};
use notify_rust::Notification;

use crate::config::Config;
use crate::notify::{NotificationStore, ScheduleFile};
use crate::store::reset_statuses;
use crate::timeparse::is_past_dose_time;

/// Poll the synced schedule and fire a desktop notification for each entry
/// once per day at (or after) its daily trigger time.
pub fn run_daemon(config: &Config) {
    println!("Daemon started. Watching for due medication reminders...");
    println!("Press Ctrl+C to stop.");

    // Entry ids already fired today
    let mut notified_today: HashSet<String> = HashSet::new();
    let mut current_day = Local::now().day();

    loop {
        let now = Local::now();

        // New day: forget yesterday's firings and clear done statuses
        if now.day() != current_day {
            notified_today.clear();
            current_day = now.day();
            println!(
                "[{}] New day detected - resetting dose statuses",
                now.format("%H:%M:%S")
            );
            if let Err(e) = reset_statuses(&config.data_file) {
                eprintln!(
                    "[{}] Failed to reset dose statuses: {}",
                    now.format("%H:%M:%S"),
                    e
                );
            }
        }

        // Reload each pass so a sync run while the daemon is up is picked up
        let schedule = ScheduleFile::open(&config.schedule_file);

        for entry in schedule.list_scheduled() {
            if notified_today.contains(&entry.id) {
                continue;
            }
            if !is_past_dose_time(&now, entry.hour, entry.minute) {
                continue;
            }

            let result = Notification::new()
                .summary(&entry.title)
                .body(&entry.body)
                .icon("medication")
                .timeout(0) // Don't auto-dismiss
                .show();

            match result {
                Ok(_) => {
                    notified_today.insert(entry.id.clone());
                    println!("[{}] Reminder sent: {}", now.format("%H:%M:%S"), entry.body);
                }
                Err(e) => {
                    eprintln!(
                        "[{}] Failed to send notification '{}': {}",
                        now.format("%H:%M:%S"),
                        entry.id,
                        e
                    );
                }
            }
        }

        // Check every 60 seconds
        thread::sleep(Duration::from_secs(60));
    }
}
