use std::{fs, path::PathBuf};

use tracing::trace;

use crate::{error::ImageStoreError, services::ImageStore};

/// Content addressed image store on the local filesystem.
///
/// Images are written to `<root>/<blake3>.<ext>` and identified by their
/// hash, so storing the same image twice is a no-op.
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }

    /// Path of a stored image, if present.
    pub fn find(&self, id: &str) -> Option<PathBuf> {
        let entries = fs::read_dir(&self.root).ok()?;
        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .find(|path| path.file_stem().is_some_and(|stem| stem == id))
    }
}

impl ImageStore for FsImageStore {
    fn save_image(&self, data: &[u8]) -> Result<String, ImageStoreError> {
        let format = image::guess_format(data).map_err(|_| ImageStoreError::UnknownFormat)?;
        let extension = format.extensions_str().first().copied().unwrap_or("img");

        let id = blake3::hash(data).to_hex().to_string();
        let path = self.root.join(format!("{id}.{extension}"));
        if path.exists() {
            trace!(id = %id, "image already stored");
            return Ok(id);
        }

        fs::create_dir_all(&self.root).map_err(|source| {
            ImageStoreError::Io {
                action: format!("creating image directory {}", self.root.display()),
                source,
            }
        })?;
        fs::write(&path, data).map_err(|source| {
            ImageStoreError::Io {
                action: format!("writing image {}", path.display()),
                source,
            }
        })?;

        trace!(id = %id, path = %path.display(), "image stored");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n', 0, 0, 0, 0];

    #[test]
    fn test_save_png() {
        let dir = tempdir().unwrap();
        let store = FsImageStore::new(dir.path().join("images"));

        let id = store.save_image(PNG_MAGIC).unwrap();
        assert_eq!(id, blake3::hash(PNG_MAGIC).to_hex().to_string());

        let path = store.find(&id).unwrap();
        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(fs::read(path).unwrap(), PNG_MAGIC);
    }

    #[test]
    fn test_save_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FsImageStore::new(dir.path());

        let first = store.save_image(PNG_MAGIC).unwrap();
        let second = store.save_image(PNG_MAGIC).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_unknown_format() {
        let dir = tempdir().unwrap();
        let store = FsImageStore::new(dir.path());

        let err = store.save_image(b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>").unwrap_err();
        assert!(matches!(err, ImageStoreError::UnknownFormat));
        assert!(store.find("anything").is_none());
    }
}
