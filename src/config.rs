//! Configuration loading and management

use std::path::PathBuf;

use anyhow::Result;

use crate::recognition::RecognitionConfig;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Token to match in transcript candidates
    pub phrase: String,

    /// Recognition locale
    pub locale: String,

    /// Language model hint for the recognizer
    pub language_model: String,

    /// External recognizer command (VOICESNAP_RECOGNIZER, whitespace-split)
    pub recognizer_command: Vec<String>,

    /// External camera command (VOICESNAP_CAPTURE, whitespace-split)
    pub capture_command: Vec<String>,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("voicesnap");

        let socket_path = match std::env::var("VOICESNAP_SOCKET") {
            Ok(path) => PathBuf::from(path),
            Err(_) => data_dir.join("daemon.sock"),
        };

        let phrase = std::env::var("VOICESNAP_PHRASE").unwrap_or_else(|_| "scan".to_string());

        Ok(Self {
            socket_path,
            data_dir,
            phrase,
            locale: "en-US".to_string(),
            language_model: "free_form".to_string(),
            recognizer_command: command_from_env("VOICESNAP_RECOGNIZER"),
            capture_command: command_from_env("VOICESNAP_CAPTURE"),
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Fixed recognition session configuration
    pub fn recognition(&self) -> RecognitionConfig {
        RecognitionConfig {
            language_model: self.language_model.clone(),
            locale: self.locale.clone(),
            recognizer_command: self.recognizer_command.clone(),
        }
    }
}

/// Read a whitespace-split command line from an environment variable
fn command_from_env(var: &str) -> Vec<String> {
    std::env::var(var)
        .map(|cmd| cmd.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_load() {
        let config = Config::load().unwrap();
        assert!(config.socket_path.to_string_lossy().contains("voicesnap"));
        assert_eq!(config.locale, "en-US");
        assert_eq!(config.language_model, "free_form");
    }

    #[test]
    fn test_default_phrase() {
        let config = Config::load().unwrap();
        if std::env::var("VOICESNAP_PHRASE").is_err() {
            assert_eq!(config.phrase, "scan");
        }
    }

    #[test]
    fn test_recognition_config() {
        let config = Config::load().unwrap();
        let recognition = config.recognition();
        assert_eq!(recognition.locale, "en-US");
        assert_eq!(recognition.language_model, "free_form");
    }
}
