use std::{fs::File, io::Read, path::Path};

use serde::Deserialize;

/// Tunables shared by every bulk operation, usually loaded from a YAML file:
///
/// ```yaml
/// temp_table_prefix: bulk_stage
/// temp_table_suffix_length: 8
/// drop_temp_tables_on_release: true
/// postgres_connect_timeout_ms: 5000
/// log_level: info
/// ```
///
/// Every field is optional. Connection strings are not part of the file, drivers read
/// `DATABASE_URL` from the environment (or `.env`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BulkSettings {
    pub temp_table_prefix: String,
    pub temp_table_suffix_length: usize,
    /// When false, released staging tables are left for the session to clean up.
    pub drop_temp_tables_on_release: bool,
    pub postgres_connect_timeout_ms: u64,
    pub log_level: Option<String>,
}

impl Default for BulkSettings {
    fn default() -> Self {
        BulkSettings {
            temp_table_prefix: "bulk_stage".to_string(),
            temp_table_suffix_length: 8,
            drop_temp_tables_on_release: true,
            postgres_connect_timeout_ms: 5000,
            log_level: None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ReadSettingsError {
    #[error("Could not open file: {0}")]
    CouldNotOpenFile(#[from] std::io::Error),

    #[error("Could not parse settings: {0}")]
    CouldNotParseSettings(#[from] serde_yaml::Error),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

impl BulkSettings {
    pub fn from_yaml_str(contents: &str) -> Result<Self, ReadSettingsError> {
        // An empty document deserializes to unit, not to an empty map.
        if contents.trim().is_empty() {
            return Ok(BulkSettings::default());
        }

        let settings: BulkSettings = serde_yaml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(file_path: &Path) -> Result<Self, ReadSettingsError> {
        let mut file = File::open(file_path)?;
        let mut contents = String::new();

        file.read_to_string(&mut contents)?;

        Self::from_yaml_str(&contents)
    }

    fn validate(&self) -> Result<(), ReadSettingsError> {
        if self.temp_table_prefix.is_empty() ||
            !self.temp_table_prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ReadSettingsError::InvalidSettings(format!(
                "temp_table_prefix must be a non-empty identifier, got '{}'",
                self.temp_table_prefix
            )));
        }

        if self.temp_table_suffix_length == 0 {
            return Err(ReadSettingsError::InvalidSettings(
                "temp_table_suffix_length must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_for_missing_fields() {
        let settings = BulkSettings::from_yaml_str("temp_table_prefix: stage\n").unwrap();

        assert_eq!(settings.temp_table_prefix, "stage");
        assert_eq!(settings.temp_table_suffix_length, 8);
        assert!(settings.drop_temp_tables_on_release);
        assert_eq!(settings.postgres_connect_timeout_ms, 5000);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(BulkSettings::from_yaml_str("").unwrap(), BulkSettings::default());
    }

    #[test]
    fn test_rejects_invalid_prefix() {
        let error = BulkSettings::from_yaml_str("temp_table_prefix: \"bad-prefix\"\n").unwrap_err();
        assert!(matches!(error, ReadSettingsError::InvalidSettings(_)));
    }

    #[test]
    fn test_rejects_unparseable_yaml() {
        let error = BulkSettings::from_yaml_str("temp_table_suffix_length: lots\n").unwrap_err();
        assert!(matches!(error, ReadSettingsError::CouldNotParseSettings(_)));
    }

    #[test]
    fn test_read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "drop_temp_tables_on_release: false\nlog_level: debug").unwrap();

        let settings = BulkSettings::from_file(file.path()).unwrap();

        assert!(!settings.drop_temp_tables_on_release);
        assert_eq!(settings.log_level.as_deref(), Some("debug"));
    }
}
