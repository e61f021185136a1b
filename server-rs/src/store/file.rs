use std::io::Write as _;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{RecordStore, Records, StoreError};

/// Stores a mapping as a pretty-printed JSON array of `[id, record]` pairs.
pub struct JsonFileStore<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl<T> RecordStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Records<T> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Records::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "unreadable store file, starting empty");
                return Records::new();
            }
        };

        match serde_json::from_str::<Vec<(String, T)>>(&data) {
            Ok(pairs) => pairs.into_iter().collect(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt store file, starting empty");
                Records::new()
            }
        }
    }

    fn save(&self, records: &Records<T>) -> Result<(), StoreError> {
        let pairs: Vec<(&String, &T)> = records.iter().collect();
        let bytes = serde_json::to_vec_pretty(&pairs)?;

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;

        let tmp = parent.join(format!(
            ".{}.tmp.{}",
            self.path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("store"),
            std::process::id()
        ));
        {
            let mut f = std::fs::File::create(&tmp).map_err(|e| self.io_err(e))?;
            f.write_all(&bytes).map_err(|e| self.io_err(e))?;
            f.sync_all().map_err(|e| self.io_err(e))?;
        }
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(self.io_err(e));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        name: String,
    }

    fn entry(name: &str) -> Entry {
        Entry {
            name: name.to_string(),
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::<Entry>::new(dir.path().join("absent.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clans.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = JsonFileStore::<Entry>::new(&path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn saved_mapping_is_read_back() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::<Entry>::new(dir.path().join("nested/clans.json"));
        let mut records = Records::new();
        records.insert("clan-1".to_string(), entry("Quake Club"));
        records.insert("clan-2".to_string(), entry("Rail Masters"));
        store.save(&records).unwrap();

        assert_eq!(store.load(), records);
    }

    #[test]
    fn file_holds_id_record_pairs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clans.json");
        let store = JsonFileStore::<Entry>::new(&path);
        let mut records = Records::new();
        records.insert("clan-1".to_string(), entry("Quake Club"));
        store.save(&records).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!([["clan-1", {"name": "Quake Club"}]]));
    }

    #[test]
    fn save_overwrites_and_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::<Entry>::new(dir.path().join("clans.json"));
        let mut records = Records::new();
        records.insert("a".to_string(), entry("first"));
        store.save(&records).unwrap();

        records.clear();
        store.save(&records).unwrap();
        assert!(store.load().is_empty());

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["clans.json".to_string()]);
    }
}
