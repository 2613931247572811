//! Scratch files holding uploaded images while they are being diagnosed

use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Raster formats accepted for upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Format named by a file name's extension (`png`, `jpg`, `jpeg`)
    pub fn from_file_name(name: &str) -> Option<Self> {
        let mime = mime_guess::from_path(name).first()?;
        match mime.essence_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// Format recognized from the leading magic bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
        const JPEG_SOI: &[u8] = b"\xFF\xD8\xFF";

        if bytes.starts_with(PNG_SIGNATURE) {
            Some(Self::Png)
        } else if bytes.starts_with(JPEG_SOI) {
            Some(Self::Jpeg)
        } else {
            None
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Self::Png => ".png",
            Self::Jpeg => ".jpg",
        }
    }
}

/// An uploaded image written to disk for the length of one diagnosis.
///
/// The file is removed when this value is closed or dropped, whichever
/// comes first, so every exit path (including unwinding) cleans up.
#[derive(Debug)]
pub struct ScratchImage {
    file: NamedTempFile,
}

impl ScratchImage {
    /// Write `bytes` to a new file in `dir` and check it landed
    pub fn create(dir: &Path, bytes: &[u8], format: ImageFormat) -> io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("xray-upload-")
            .suffix(format.suffix())
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.as_file().sync_all()?;

        if !file.path().exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("scratch file {} vanished after write", file.path().display()),
            ));
        }

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Delete the file now, reporting a failure instead of swallowing it
    pub fn close(self) -> io::Result<()> {
        self.file.close()
    }
}
