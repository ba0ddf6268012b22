//! Key-preserving edits of the configuration file.
//!
//! `DwhConfig` is a typed, read-only view. Writing back goes through
//! `ConfigDocument`, which holds the whole file as a `toml_edit` document so
//! comments, key order, and sections this crate knows nothing about survive
//! the round trip.

use std::io::Write;
use std::path::{Path, PathBuf};

use toml_edit::{DocumentMut, Item, Value};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// A loaded configuration file that can be edited and saved atomically.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    path: PathBuf,
    doc: DocumentMut,
}

impl ConfigDocument {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let doc = content.parse::<DocumentMut>()?;
        Ok(Self {
            path: path.to_path_buf(),
            doc,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_str(&self, section: &str, key: &str) -> Option<&str> {
        self.doc
            .get(section)
            .and_then(Item::as_table_like)
            .and_then(|s| s.get(key))
            .and_then(Item::as_str)
    }

    /// Set `[section].key`, creating the section if it does not exist yet.
    /// An existing value keeps its surrounding whitespace and trailing comment.
    pub fn set_str(&mut self, section: &str, key: &str, value: &str) -> ConfigResult<()> {
        let entry = self.doc.entry(section).or_insert(toml_edit::table());
        let Some(section_table) = entry.as_table_like_mut() else {
            return Err(ConfigError::Invalid(format!(
                "[{section}] is not a table"
            )));
        };
        match section_table.get_mut(key).and_then(Item::as_value_mut) {
            Some(existing) => {
                let decor = existing.decor().clone();
                *existing = Value::from(value);
                *existing.decor_mut() = decor;
            }
            None => {
                section_table.insert(key, toml_edit::value(value));
            }
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> String {
        self.doc.to_string()
    }

    /// Write the document to a temp file beside the target, then rename it
    /// over the target. Readers see either the old file or the new one.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.to_toml_string();
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let write_err = |source| ConfigError::Write {
            path: self.path.display().to_string(),
            source,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(content.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        debug!(path = %self.path.display(), "configuration saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = r#"
[cluster]
host = "None"
db_name = "dwh"
port = 5439

[iam_role]
arn = "None"

[s3]
log_data = "s3://udacity-dend/log_data"
"#;

    fn write_config(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("dwh.toml");
        std::fs::write(&path, FILE).unwrap();
        path
    }

    #[test]
    fn edit_preserves_unrelated_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir);

        let mut doc = ConfigDocument::load(&path).unwrap();
        doc.set_str("cluster", "host", "example.host").unwrap();
        doc.save().unwrap();

        let reloaded = ConfigDocument::load(&path).unwrap();
        assert_eq!(reloaded.get_str("cluster", "host"), Some("example.host"));
        assert_eq!(reloaded.get_str("cluster", "db_name"), Some("dwh"));
        assert_eq!(
            reloaded.get_str("s3", "log_data"),
            Some("s3://udacity-dend/log_data")
        );
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("port = 5439"));
    }

    #[test]
    fn comments_and_key_order_survive_a_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dwh.toml");
        let original = "\
# written by create, read by the etl
[cluster]
host = \"None\" # replaced on create
port = 5439
db_name = \"dwh\"

[iam_role]
arn = \"None\"
";
        std::fs::write(&path, original).unwrap();

        let mut doc = ConfigDocument::load(&path).unwrap();
        doc.set_str("cluster", "host", "example.host").unwrap();
        doc.save().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            raw,
            original.replace("host = \"None\"", "host = \"example.host\"")
        );
    }

    #[test]
    fn set_creates_missing_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dwh.toml");
        std::fs::write(&path, "[cluster]\nhost = \"None\"\n").unwrap();

        let mut doc = ConfigDocument::load(&path).unwrap();
        doc.set_str("iam_role", "arn", "arn:aws:iam::123:role/r").unwrap();
        assert_eq!(doc.get_str("iam_role", "arn"), Some("arn:aws:iam::123:role/r"));
    }

    #[test]
    fn set_on_scalar_section_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dwh.toml");
        std::fs::write(&path, "cluster = 3\n").unwrap();

        let mut doc = ConfigDocument::load(&path).unwrap();
        assert!(doc.set_str("cluster", "host", "h").is_err());
    }

    #[test]
    fn unsaved_edits_do_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir);

        let mut doc = ConfigDocument::load(&path).unwrap();
        doc.set_str("cluster", "host", "example.host").unwrap();
        drop(doc);

        let reloaded = ConfigDocument::load(&path).unwrap();
        assert_eq!(reloaded.get_str("cluster", "host"), Some("None"));
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigDocument::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
