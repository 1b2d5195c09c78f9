//! JSON file session store.
//!
//! Each storage key maps to `<dir>/<key>.json`. Writes go to a sibling
//! temporary file first and are renamed into place.

use async_trait::async_trait;
use pulse_core::SessionState;
use pulse_sdk::{PulseResult, SessionStore};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File holding the state for `key`.
    ///
    /// ASCII alphanumerics, `-` and `_` are kept; every other byte becomes
    /// `%XX`, so distinct keys always map to distinct files.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut file = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                file.push(char::from(byte));
            } else {
                file.push_str(&format!("%{:02X}", byte));
            }
        }
        self.dir.join(format!("{}.json", file))
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn get(&self, key: &str) -> PulseResult<Option<SessionState>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(SessionState::decode(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, state: &SessionState) -> PulseResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, state.encode()?).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("Wrote session state to {}", path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PulseResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_roundtrip() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested"));
        let key = "PULSE_abc_$default_instance";

        assert!(store.get(key).await.unwrap().is_none());

        let mut state = SessionState::new(100, true);
        state.session_id = Some(1000);
        state.last_event_time = Some(1050);
        state.last_event_id = 7;
        store.set(key, &state).await.unwrap();

        assert!(store.path_for(key).ends_with("PULSE_abc_%24default_instance.json"));
        assert_eq!(store.get(key).await.unwrap(), Some(state));

        store.remove(key).await.unwrap();
        assert!(store.get(key).await.unwrap().is_none());
        store.remove(key).await.unwrap();
    }

    #[tokio::test]
    async fn test_similar_keys_do_not_collide() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let keys = ["a$b", "a_b", "a%24b", "a/b", "a\u{e9}b"];

        for (id, key) in keys.iter().enumerate() {
            let state = SessionState {
                session_id: Some(id as i64),
                ..Default::default()
            };
            store.set(key, &state).await.unwrap();
        }

        for (id, key) in keys.iter().enumerate() {
            let stored = store.get(key).await.unwrap().unwrap();
            assert_eq!(stored.session_id, Some(id as i64), "key {}", key);
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), keys.len());
        assert!(store.path_for("a/b").ends_with("a%2Fb.json"));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        std::fs::write(store.path_for("key"), b"not json").unwrap();

        assert!(store.get("key").await.is_err());
    }
}
