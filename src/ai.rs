use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::Config;
use crate::store::{Medicine, Patient};

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const TRANSCRIPTION_MODEL: &str = "whisper-large-v3";
const CHAT_MODEL: &str = "llama-3.3-70b-versatile";

const EXTRACTION_SYSTEM_PROMPT: &str = r#"
You are a medical assistant parsing transcribed speech into structured JSON format.
The user will provide a transcription and you must extract the patient's data according to the exact schema.

Schema JSON object to output:
{
  "name": "string (Full Name)",
  "idNumber": "string",
  "dob": "string (MM/DD/YYYY)",
  "gender": "string",
  "phone": "string",
  "email": "string",
  "emergencyContact": "string (Name and Phone)",
  "height": "string",
  "weight": "string",
  "notes": "string",
  "medicines": [
    {
      "name": "string",
      "totalPillsPrescribed": "string (number)",
      "pillsPerDayToBeTaken": "string (number)",
      "daysPerWeekToTakeThePrescription": "string (number)",
      "pillSchedule": "string (e.g. 8:00 AM, 8:00 PM)",
      "refillOrNot": boolean
    }
  ]
}

Return ONLY a valid JSON object matching this schema. If a value is not mentioned or unknown, set it to an empty string "". If no medicines are mentioned, leave the array empty. Ensure refillOrNot is a boolean. Do not include markdown wrappers.
"#;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("GROQ_API_KEY is not set; export it to use AI features")]
    MissingApiKey,
    #[error("failed to read audio file: {0}")]
    Io(#[from] std::io::Error),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {0}")]
    Api(String),
    #[error("transcription came back empty")]
    EmptyTranscription,
    #[error("model returned malformed JSON: {0}")]
    MalformedResponse(serde_json::Error),
    #[error("failed to serialize patient record: {0}")]
    Serialize(serde_json::Error),
}

/// Patient fields as extracted by the model: the document-store schema
/// with every scalar a string (empty when unknown). Defensive defaults
/// everywhere so a partially-filled object still deserializes.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PatientIntake {
    pub name: String,
    pub id_number: String,
    pub dob: String,
    pub gender: String,
    pub phone: String,
    pub email: String,
    pub emergency_contact: String,
    pub height: String,
    pub weight: String,
    pub notes: String,
    pub medicines: Vec<Medicine>,
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl PatientIntake {
    /// Convert into a storable patient record. The document id is assigned
    /// by the store on insert.
    pub fn into_patient(self) -> Patient {
        Patient {
            id: String::new(),
            name: self.name.trim().to_string(),
            patient_id: self.id_number.trim().to_string(),
            dob: non_empty(self.dob),
            gender: non_empty(self.gender),
            phone: non_empty(self.phone),
            email: non_empty(self.email),
            emergency_contact: non_empty(self.emergency_contact),
            height: non_empty(self.height),
            weight: non_empty(self.weight),
            notes: non_empty(self.notes),
            medicines: self.medicines,
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Strip a leading/trailing markdown code fence the model sometimes adds
/// despite being told not to.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

fn api_error_message(body: &serde_json::Value) -> String {
    body.pointer("/error/message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown API error")
        .to_string()
}

/// Client for the Groq transcription/LLM API.
pub struct AiClient {
    api_key: String,
    base_url: String,
    http: reqwest::blocking::Client,
}

impl AiClient {
    pub fn new(config: &Config) -> Result<Self, AiError> {
        let api_key = config.groq_api_key.clone().ok_or(AiError::MissingApiKey)?;
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(AiClient {
            api_key,
            base_url: GROQ_BASE_URL.to_string(),
            http,
        })
    }

    /// Transcribe an audio recording to text.
    pub fn transcribe(&self, audio: &Path) -> Result<String, AiError> {
        let form = reqwest::blocking::multipart::Form::new()
            .file("file", audio)?
            .text("model", TRANSCRIPTION_MODEL);

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()?;

        if !response.status().is_success() {
            let body: serde_json::Value = response.json()?;
            return Err(AiError::Api(api_error_message(&body)));
        }

        let result: TranscriptionResponse = response.json()?;
        Ok(result.text)
    }

    fn chat(&self, system: &str, user: &str, json_mode: bool) -> Result<String, AiError> {
        let mut payload = json!({
            "model": CHAT_MODEL,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": 0.1,
        });
        if json_mode {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()?;

        if !response.status().is_success() {
            let body: serde_json::Value = response.json()?;
            return Err(AiError::Api(api_error_message(&body)));
        }

        let result: ChatResponse = response.json()?;
        let content = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        Ok(content)
    }

    /// Extract structured patient fields from a transcription. The model
    /// is asked for strict JSON; malformed output is a reportable error,
    /// never a crash.
    pub fn extract_patient(&self, transcript: &str) -> Result<PatientIntake, AiError> {
        if transcript.trim().is_empty() {
            return Err(AiError::EmptyTranscription);
        }

        let user = format!("Transcription: \"{}\"", transcript);
        let content = self.chat(EXTRACTION_SYSTEM_PROMPT, &user, true)?;

        parse_intake(&content)
    }

    /// Transcribe a recording and extract patient fields in one pass.
    pub fn intake_from_audio(&self, audio: &Path) -> Result<PatientIntake, AiError> {
        let transcript = self.transcribe(audio)?;
        self.extract_patient(&transcript)
    }

    /// Produce a short clinical markdown summary of a patient record.
    pub fn summarize(&self, patient: &Patient) -> Result<String, AiError> {
        let system = "You are a clinical assistant. Given a patient record as JSON, \
                      write a concise markdown summary: demographics, medication list \
                      with remaining supply, refill concerns, and schedule notes. \
                      Do not invent information not present in the record.";
        let record = serde_json::to_string(patient).map_err(AiError::Serialize)?;
        self.chat(system, &record, false)
    }

    /// Translate free text to the target language.
    pub fn translate(&self, text: &str, target_language: &str) -> Result<String, AiError> {
        let system = format!(
            "Translate the user's text to {}. Return only the translation.",
            target_language
        );
        self.chat(&system, text, false)
    }
}

/// Parse the model's extraction output, tolerating a markdown fence.
pub fn parse_intake(content: &str) -> Result<PatientIntake, AiError> {
    serde_json::from_str(strip_code_fences(content)).map_err(AiError::MalformedResponse)
}
