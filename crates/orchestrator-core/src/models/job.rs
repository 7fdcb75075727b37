use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::UserSummary;

/// Kind of AI work a job performs.
///
/// Unknown strings from the backend are kept as `Other` so new job types
/// don't break listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    SpeechToText,
    TextToSpeech,
    VoiceCloning,
    Dubbing,
    AiStories,
    VideoGeneration,
    Other(String),
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        JobType::SpeechToText,
        JobType::TextToSpeech,
        JobType::VoiceCloning,
        JobType::Dubbing,
        JobType::AiStories,
        JobType::VideoGeneration,
    ];

    /// Wire value sent to and received from the backend.
    pub fn as_str(&self) -> &str {
        match self {
            JobType::SpeechToText => "stt",
            JobType::TextToSpeech => "tts",
            JobType::VoiceCloning => "voice_cloning",
            JobType::Dubbing => "dubbing",
            JobType::AiStories => "ai_stories",
            JobType::VideoGeneration => "video_generation",
            JobType::Other(s) => s,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            JobType::SpeechToText => "Speech-to-Text",
            JobType::TextToSpeech => "Text-to-Speech",
            JobType::VoiceCloning => "Voice Cloning",
            JobType::Dubbing => "Dubbing",
            JobType::AiStories => "AI Stories",
            JobType::VideoGeneration => "Video Generation",
            JobType::Other(s) => s,
        }
    }
}

impl From<String> for JobType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "stt" => JobType::SpeechToText,
            "tts" => JobType::TextToSpeech,
            "voice_cloning" => JobType::VoiceCloning,
            "dubbing" => JobType::Dubbing,
            "ai_stories" => JobType::AiStories,
            "video_generation" => JobType::VideoGeneration,
            _ => JobType::Other(s),
        }
    }
}

impl From<JobType> for String {
    fn from(t: JobType) -> Self {
        match t {
            JobType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Other(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Other(s) => s,
        }
    }

    /// Pending and running jobs are still in the backend's hands.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            _ => JobStatus::Other(s),
        }
    }
}

impl From<JobStatus> for String {
    fn from(s: JobStatus) -> Self {
        match s {
            JobStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "Pending"),
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Completed => write!(f, "Completed"),
            JobStatus::Failed => write!(f, "Failed"),
            JobStatus::Cancelled => write!(f, "Cancelled"),
            JobStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    /// Display name of the parent project
    #[serde(default)]
    pub project: Option<String>,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    #[serde(default)]
    pub input_url: Option<String>,
    #[serde(default)]
    pub input_file: Option<String>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub created_by: Option<UserSummary>,
    #[serde(default)]
    pub meta: Option<Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub has_result: bool,
}

impl Job {
    pub fn project_name(&self) -> &str {
        self.project.as_deref().unwrap_or("Unknown")
    }

    /// Look up a string entry in the job's metadata.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.as_ref()?.get(key)?.as_str()
    }
}

/// Maximum job progress value accepted by the backend
pub const MAX_PROGRESS: u8 = 100;

/// Payload for submitting a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewJob {
    pub project_id: i64,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_url: Option<String>,
    pub meta: Map<String, Value>,
}

impl NewJob {
    pub fn new(project_id: i64, job_type: JobType) -> Self {
        Self {
            project_id,
            job_type,
            status: JobStatus::Pending,
            progress: 0,
            input_url: None,
            meta: Map::new(),
        }
    }

    pub fn with_input_url(mut self, url: impl Into<String>) -> Self {
        self.input_url = Some(url.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Check the payload before it goes over the wire.
    pub fn validate(&self) -> Result<(), String> {
        if self.progress > MAX_PROGRESS {
            return Err(format!(
                "Progress must be between 0 and {} (got {})",
                MAX_PROGRESS, self.progress
            ));
        }
        if let JobType::Other(ref s) = self.job_type {
            if s.trim().is_empty() {
                return Err("Job type must not be empty".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub id: i64,
    /// Display string of the associated job
    #[serde(default)]
    pub job: Option<String>,
    #[serde(default)]
    pub job_type: Option<JobType>,
    #[serde(default)]
    pub job_status: Option<JobStatus>,
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub result_file_url: Option<String>,
    #[serde(default)]
    pub logs: Option<String>,
    #[serde(default)]
    pub meta: Option<Value>,
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    /// Where the output can be fetched from, if anywhere.
    pub fn output_location(&self) -> Option<&str> {
        self.result_file_url
            .as_deref()
            .or(self.result_url.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_job() {
        let json = r#"{"id": 42, "project": "Launch trailer (Owner: admin)", "type": "dubbing",
            "status": "running", "input_url": null, "input_file": null, "progress": 35,
            "created_by": {"id": 1, "username": "admin"},
            "meta": {"source_language": "en", "target_language": "es"},
            "created_at": "2025-03-01T12:00:00Z", "has_result": false}"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.job_type, JobType::Dubbing);
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.status.is_active());
        assert_eq!(job.progress, 35);
        assert_eq!(job.meta_str("target_language"), Some("es"));
    }

    #[test]
    fn test_unknown_type_and_status_survive() {
        let json = r#"{"id": 1, "type": "lip_sync", "status": "queued",
            "created_at": "2025-03-01T12:00:00Z"}"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.job_type, JobType::Other("lip_sync".to_string()));
        assert_eq!(job.status, JobStatus::Other("queued".to_string()));
        assert!(!job.status.is_active());
        assert_eq!(job.project_name(), "Unknown");

        let back = serde_json::to_value(&job).unwrap();
        assert_eq!(back["type"], "lip_sync");
        assert_eq!(back["status"], "queued");
    }

    #[test]
    fn test_new_job_payload() {
        let job = NewJob::new(3, JobType::VoiceCloning)
            .with_meta("voice_name", "Narrator")
            .with_meta("sample_text", "Hello there");
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(
            value,
            json!({
                "project_id": 3,
                "type": "voice_cloning",
                "status": "pending",
                "progress": 0,
                "meta": {"voice_name": "Narrator", "sample_text": "Hello there"}
            })
        );
    }

    #[test]
    fn test_new_job_rejects_progress_over_100() {
        let mut job = NewJob::new(1, JobType::TextToSpeech);
        assert!(job.validate().is_ok());
        job.progress = 101;
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_job_type_round_trip_through_strings() {
        for t in JobType::ALL {
            assert_eq!(JobType::from(t.as_str().to_string()), t);
        }
    }

    #[test]
    fn test_result_output_location_prefers_file() {
        let json = r#"{"id": 9, "job": "tts - completed", "job_type": "tts", "job_status": "completed",
            "result_url": "https://cdn.example.com/out.mp3",
            "result_file_url": "http://127.0.0.1:8000/media/jobs/results/out.mp3",
            "logs": "done", "meta": {}, "finished_at": "2025-03-01T12:05:00Z"}"#;
        let result: JobResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.job_type, Some(JobType::TextToSpeech));
        assert_eq!(
            result.output_location(),
            Some("http://127.0.0.1:8000/media/jobs/results/out.mp3")
        );
    }
}
