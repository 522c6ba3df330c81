use std::path::{Path, PathBuf};

use tracing::debug;

use super::SnapshotSlot;

fn sanitize_filename(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// File-backed slot: one JSON file per key under a root directory. Writes go
/// through a tmp file and rename so a crash never leaves a torn snapshot.
pub struct FileSlot {
    root: PathBuf,
}

impl FileSlot {
    pub fn new(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_filename(key)))
    }
}

impl SnapshotSlot for FileSlot {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(target: "agrilink", "slot read failed for {:?}: {}", path, e);
                }
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.path_for(key));
    }
}
