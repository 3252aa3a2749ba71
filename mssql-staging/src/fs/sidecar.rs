//! JSON state files stored next to the database on the remote host.

use super::RemoteFs;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// One JSON document at a fixed remote path.
pub struct JsonSidecar<T> {
    fs: RemoteFs,
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> JsonSidecar<T> {
    pub fn new(fs: RemoteFs, path: PathBuf) -> Self {
        Self {
            fs,
            path,
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<T> {
        let content = self.fs.read_file(&self.path)?;
        Ok(serde_json::from_str(content.trim())?)
    }

    /// Overwrite the file with `value`.
    pub fn save(&self, value: &T) -> Result<()> {
        let content = serde_json::to_string(value)?;
        self.fs.write_file(&self.path, &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::scripted::ScriptedExecutor;
    use crate::testing::staging_context;
    use crate::EngineError;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Marker {
        name: String,
        count: u32,
    }

    #[test]
    fn test_save_and_load() {
        let executor = ScriptedExecutor::new();
        let fs = RemoteFs::new(staging_context(executor.clone()));
        let sidecar = JsonSidecar::<Marker>::new(fs, PathBuf::from("/mnt/.config/marker.json"));

        let value = Marker { name: "a'b".into(), count: 3 };
        sidecar.save(&value).unwrap();
        assert_eq!(sidecar.load().unwrap(), value);
    }

    #[test]
    fn test_corrupt_content_is_serialization_error() {
        let executor = ScriptedExecutor::new();
        executor.put_file("/mnt/.config/marker.json", "{not json");
        let fs = RemoteFs::new(staging_context(executor));
        let sidecar = JsonSidecar::<Marker>::new(fs, PathBuf::from("/mnt/.config/marker.json"));

        assert!(matches!(sidecar.load(), Err(EngineError::Serialization(_))));
    }
}
