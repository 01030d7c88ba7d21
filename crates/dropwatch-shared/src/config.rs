//! Pipeline configuration.
//!
//! The chat -> project and project -> worksheet tables, the monitored chat
//! allow-list and the sheet layout are loaded once at startup into an
//! immutable [`PipelineConfig`] and handed to every component that needs
//! them. Missing fields in the JSON file fall back to the defaults of the
//! original deployment.

use std::path::Path;
use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::*;
use crate::error::ConfigError;
use crate::pattern::DropMatcher;
use crate::types::ChatId;

/// One tracked project: a chat group and the worksheet mirroring it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    pub name: String,
    pub chat_id: ChatId,
    #[serde(default)]
    pub description: String,
    pub worksheet: String,
}

/// Where rows live inside each project worksheet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SheetLayout {
    pub spreadsheet_id: String,
    /// First 1-based row that may hold data.
    pub data_start_row: u32,
    /// Rows fetched per allocator read.
    pub scan_window: u32,
    /// The allocator never hands out a row above this.
    pub max_row: u32,
    /// Row whose checkbox validation is copied onto new rows.
    pub template_row: u32,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            data_start_row: DEFAULT_DATA_START_ROW,
            scan_window: DEFAULT_SCAN_WINDOW,
            max_row: DEFAULT_MAX_ROW,
            template_row: DEFAULT_DATA_START_ROW,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub projects: Vec<ProjectConfig>,
    /// The only chat whose messages are processed. Everything else is dropped
    /// on arrival, even chats that appear in `projects`.
    pub monitored_chat: ChatId,
    pub identifier_prefix: String,
    pub completion_keywords: Vec<String>,
    pub sheet: SheetLayout,
    pub submitter_max_len: usize,
    pub receipt_rescan_secs: i64,
    pub receipt_rescan_limit: u32,
    pub remote_timeout_secs: u64,
    /// Offset applied to message timestamps before taking the review date.
    pub review_utc_offset_minutes: i32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let project = |name: &str, chat: &str, description: &str, worksheet: &str| ProjectConfig {
            name: name.to_string(),
            chat_id: ChatId::new(chat),
            description: description.to_string(),
            worksheet: worksheet.to_string(),
        };

        Self {
            projects: vec![
                project(
                    "Lawley",
                    "120363418298130331@g.us",
                    "Lawley Activation 3 group",
                    "Lawley WA_Tool Monitor",
                ),
                project(
                    "Velo Test",
                    "120363421664266245@g.us",
                    "Velo Test group",
                    "Velo Test",
                ),
                project(
                    "Mohadin",
                    "120363421532174586@g.us",
                    "Mohadin Activations group",
                    "Mohadin WA_Tool Monitor",
                ),
            ],
            monitored_chat: ChatId::new("120363421664266245@g.us"),
            identifier_prefix: DEFAULT_IDENTIFIER_PREFIX.to_string(),
            completion_keywords: DEFAULT_COMPLETION_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            sheet: SheetLayout::default(),
            submitter_max_len: DEFAULT_SUBMITTER_MAX_LEN,
            receipt_rescan_secs: DEFAULT_RECEIPT_RESCAN_SECS,
            receipt_rescan_limit: DEFAULT_RECEIPT_RESCAN_LIMIT,
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
            review_utc_offset_minutes: 0,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;

        info!(
            path = %path.display(),
            projects = config.projects.len(),
            monitored = %config.monitored_chat,
            "Loaded pipeline configuration"
        );

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.completion_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "completion_keywords must not be empty".into(),
            ));
        }
        if self.sheet.data_start_row < 2 {
            return Err(ConfigError::Invalid(
                "sheet.data_start_row must leave row 1 for headers".into(),
            ));
        }
        if self.sheet.scan_window == 0 {
            return Err(ConfigError::Invalid("sheet.scan_window must be > 0".into()));
        }
        if self.sheet.max_row < self.sheet.data_start_row {
            return Err(ConfigError::Invalid(
                "sheet.max_row must not be below sheet.data_start_row".into(),
            ));
        }
        if self.sheet.max_row > MAX_SHEET_ROW {
            return Err(ConfigError::Invalid(format!(
                "sheet.max_row must not exceed {MAX_SHEET_ROW}"
            )));
        }
        if !(0..=MAX_RECEIPT_RESCAN_SECS).contains(&self.receipt_rescan_secs) {
            return Err(ConfigError::Invalid(format!(
                "receipt_rescan_secs must be between 0 and {MAX_RECEIPT_RESCAN_SECS}"
            )));
        }
        if self.remote_timeout_secs == 0 {
            return Err(ConfigError::Invalid("remote_timeout_secs must be > 0".into()));
        }
        if FixedOffset::east_opt(self.review_utc_offset_minutes.saturating_mul(60)).is_none() {
            return Err(ConfigError::Invalid(format!(
                "review_utc_offset_minutes out of range: {}",
                self.review_utc_offset_minutes
            )));
        }
        // Surfaces a bad prefix at startup rather than on the first message.
        self.matcher()?;
        Ok(())
    }

    pub fn matcher(&self) -> Result<DropMatcher, ConfigError> {
        DropMatcher::new(&self.identifier_prefix, &self.completion_keywords)
    }

    pub fn project_for_chat(&self, chat: &ChatId) -> Option<&ProjectConfig> {
        self.projects.iter().find(|p| &p.chat_id == chat)
    }

    pub fn project(&self, name: &str) -> Option<&ProjectConfig> {
        self.projects.iter().find(|p| p.name == name)
    }

    pub fn is_monitored(&self, chat: &ChatId) -> bool {
        &self.monitored_chat == chat
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn review_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.review_utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_routes_match_deployment() {
        let config = PipelineConfig::default();
        let velo = ChatId::new("120363421664266245@g.us");
        assert!(config.is_monitored(&velo));
        assert_eq!(config.project_for_chat(&velo).unwrap().name, "Velo Test");
        assert_eq!(
            config.project("Mohadin").map(|p| p.worksheet.as_str()),
            Some("Mohadin WA_Tool Monitor")
        );
        assert!(config
            .project_for_chat(&ChatId::new("999@s.whatsapp.net"))
            .is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "monitored_chat": "1@g.us",
                "projects": [{{"name": "Alpha", "chat_id": "1@g.us", "worksheet": "Alpha Tab"}}],
                "sheet": {{"spreadsheet_id": "sheet-123"}}
            }}"#
        )
        .unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.projects.len(), 1);
        assert_eq!(config.sheet.spreadsheet_id, "sheet-123");
        assert_eq!(config.sheet.data_start_row, 17);
        assert_eq!(config.completion_keywords.len(), 6);
        assert_eq!(config.remote_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_header_overlap() {
        let mut config = PipelineConfig::default();
        config.sheet.data_start_row = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_limits() {
        let mut config = PipelineConfig::default();
        config.sheet.max_row = u32::MAX;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.receipt_rescan_secs = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.receipt_rescan_secs = -1;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.remote_timeout_secs = 0;
        assert!(config.validate().is_err());

        assert!(PipelineConfig::default().validate().is_ok());
    }
}
