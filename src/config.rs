use std::path::PathBuf;

/// Runtime context, built once at startup and passed down explicitly.
///
/// Uses the `dirs` crate to locate the home directory across platforms,
/// falling back to the current directory. `MEDTRACK_DATA_FILE` and
/// `MEDTRACK_SCHEDULE_FILE` override the defaults for scripting and tests.
#[derive(Debug, Clone)]
pub struct Config {
    /// Patient registry JSON file.
    pub data_file: PathBuf,
    /// Scheduled-notification JSON file read by the daemon.
    pub schedule_file: PathBuf,
    /// Groq API key for the AI intake/summary features.
    pub groq_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        let data_file = std::env::var_os("MEDTRACK_DATA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".medtrack.json"));
        let schedule_file = std::env::var_os("MEDTRACK_SCHEDULE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".medtrack-schedule.json"));

        Config {
            data_file,
            schedule_file,
            groq_api_key: std::env::var("GROQ_API_KEY").ok(),
        }
    }
}
