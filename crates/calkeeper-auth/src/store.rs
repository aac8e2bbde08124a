//! Durable storage for the credential record.
//!
//! One JSON file, owner read/write only. Writes go to a sibling temp file
//! which is renamed over the target, so a crash mid-write leaves either the
//! old record or the new one.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::record::CredentialRecord;

/// File name used for the saved-token file.
pub const DEFAULT_TOKEN_FILE_NAME: &str = ".gcp-saved-tokens.json";

/// Reads and writes a single [`CredentialRecord`] at a fixed path.
///
/// No retries and no interpretation of token semantics; I/O errors are
/// returned with the path attached.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: `~/.local/share/calkeeper/.gcp-saved-tokens.json`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".local").join("share"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calkeeper")
            .join(DEFAULT_TOKEN_FILE_NAME)
    }

    /// Returns the backing path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the record.
    ///
    /// Fails with a `NotFound` error if the file does not exist and
    /// `CorruptData` if it does not parse.
    pub fn load(&self) -> AuthResult<CredentialRecord> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::not_found(&self.path));
            }
            Err(e) => return Err(AuthError::storage("read", &self.path, e)),
        };

        let record = serde_json::from_str(&content)
            .map_err(|e| AuthError::corrupt_data(&self.path, e))?;
        debug!(path = %self.path.display(), "loaded credential record");
        Ok(record)
    }

    /// Writes the record, replacing any previous one.
    pub fn save(&self, record: &CredentialRecord) -> AuthResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| AuthError::storage("create directory", parent, e))?;
        }

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| AuthError::invalid_response("failed to serialize record").with_source(e))?;

        let temp_path = self.temp_path();
        write_private(&temp_path, content.as_bytes())
            .map_err(|e| AuthError::storage("write", &temp_path, e))?;

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(AuthError::storage("rename", &self.path, e));
        }

        debug!(path = %self.path.display(), "saved credential record");
        Ok(())
    }

    /// Deletes the durable record. A missing file is not an error.
    pub fn remove(&self) -> AuthResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed credential record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::storage("remove", &self.path, e)),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Writes `bytes` to `path`, creating it with mode 0600 on Unix.
pub(crate) fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;

    // `mode` only applies on creation; tighten a pre-existing file too.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthErrorCode;

    fn store_in(dir: &tempfile::TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join(DEFAULT_TOKEN_FILE_NAME))
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = store_in(&dir).load().unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::NotFound);
    }

    #[test]
    fn load_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "not json").unwrap();

        let err = store.load().unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::CorruptData);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let record = CredentialRecord::new("access", Some("refresh".into()), Some(1_234));

        store.save(&record).unwrap();
        assert_eq!(store.load().unwrap(), record);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.save(&CredentialRecord::new("first", None, None)).unwrap();
        store.save(&CredentialRecord::new("second", None, None)).unwrap();

        assert_eq!(store.load().unwrap().access_token, "second");
    }

    #[test]
    fn save_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("nested/deeper/tokens.json"));

        store.save(&CredentialRecord::new("a", None, None)).unwrap();
        assert!(store.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&CredentialRecord::new("a", None, None)).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&CredentialRecord::new("a", None, None)).unwrap();

        store.remove().unwrap();
        assert!(!store.path().exists());
        store.remove().unwrap();
    }

    #[test]
    fn default_path_uses_token_file_name() {
        let path = CredentialStore::default_path();
        assert!(path.ends_with(format!("calkeeper/{}", DEFAULT_TOKEN_FILE_NAME)));
    }
}
