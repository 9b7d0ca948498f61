use std::path::{Path, PathBuf};

use bytes::Bytes;
use shared::error::PredictionError;
use thiserror::Error;

/// An image chosen by the user, held in memory until it is replaced,
/// cleared or uploaded. Clones share the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    name: String,
    mime_type: Option<String>,
    bytes: Bytes,
}

impl ImageFile {
    /// Builds a file from raw bytes, guessing the MIME type from `name`.
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let name = name.into();
        let mime_type = mime_guess::from_path(&name)
            .first()
            .map(|mime| mime.essence_str().to_string());
        Self {
            name,
            mime_type,
            bytes: bytes.into(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub async fn from_path(path: &Path) -> Result<Self, SelectPathError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| SelectPathError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(display_name(path), bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// A handle to the same buffer, for handing to the upload body.
    pub fn shared_bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[derive(Debug, Error)]
pub enum SelectPathError {
    #[error(transparent)]
    Rejected(#[from] PredictionError),
    #[error("failed to read image '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_mime_type_from_extension() {
        assert_eq!(
            ImageFile::new("leaf.png", Vec::new()).mime_type(),
            Some("image/png")
        );
        assert_eq!(
            ImageFile::new("leaf.JPG", Vec::new()).mime_type(),
            Some("image/jpeg")
        );
        assert_eq!(ImageFile::new("leaf", Vec::new()).mime_type(), None);
    }

    #[test]
    fn clones_share_one_buffer() {
        let file = ImageFile::new("leaf.jpg", vec![7u8; 4096]);
        let copy = file.clone();
        assert_eq!(copy.bytes().as_ptr(), file.bytes().as_ptr());
        assert_eq!(file.shared_bytes().as_ptr(), file.bytes().as_ptr());
    }

    #[tokio::test]
    async fn reads_file_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tomato.webp");
        std::fs::write(&path, b"RIFF....WEBP").expect("write");

        let file = ImageFile::from_path(&path).await.expect("read");
        assert_eq!(file.name(), "tomato.webp");
        assert_eq!(file.size_bytes(), 12);
        assert_eq!(file.mime_type(), Some("image/webp"));
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = ImageFile::from_path(&dir.path().join("absent.png"))
            .await
            .expect_err("must fail");
        assert!(matches!(err, SelectPathError::Read { .. }));
    }
}
