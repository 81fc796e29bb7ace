use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub recording: RecordingConfig,
    pub questions: QuestionsConfig,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub data_path: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordingConfig {
    pub screen_fps: u32,
    pub webcam_fps: u32,
    /// "direct" or "region_mirror".
    pub webcam_mode: String,
    pub preroll_ms: u64,
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Deserialize)]
pub struct QuestionsConfig {
    pub bank_path: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Built-in defaults when no config file is given.
    pub fn defaults() -> Self {
        Self {
            storage: StorageConfig {
                data_path: "data".to_string(),
            },
            recording: RecordingConfig {
                screen_fps: 15,
                webcam_fps: 30,
                webcam_mode: "direct".to_string(),
                preroll_ms: 500,
                max_consecutive_failures: 10,
            },
            questions: QuestionsConfig {
                bank_path: "questions.json".to_string(),
            },
        }
    }
}
