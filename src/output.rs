//! Encoding the stitched image and handing it to a delivery surface

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as Base64Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use log::{info, warn};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// File name used when the primary delivery surface fails
pub const FALLBACK_FILE_NAME: &str = "screenshot_fallback.jpg";

/// An encoded output image
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mime_type: &'static str,
}

impl EncodedImage {
    /// `data:` URL suitable for an `<img src>` or a download link.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }

    /// Hex SHA-256 of the encoded bytes.
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// Encode `buffer` as JPEG at `quality` (1-100). Alpha is discarded.
pub fn encode_jpeg(buffer: &RgbaImage, quality: u8) -> Result<EncodedImage> {
    if !(1..=100).contains(&quality) {
        return Err(Error::EncodeError(format!("JPEG quality {} is outside 1..=100", quality)));
    }
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgba8(buffer.clone()).to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&rgb)
        .map_err(|e| Error::EncodeError(e.to_string()))?;
    Ok(EncodedImage {
        bytes,
        width: buffer.width(),
        height: buffer.height(),
        mime_type: "image/jpeg",
    })
}

/// Destination for finished captures (preview surface, disk, clipboard...)
pub trait ImageSink {
    fn deliver(&mut self, image: &EncodedImage) -> Result<()>;
}

/// Writes each image to disk.
///
/// With a directory target the file is named `screenshot_<unix millis>.jpg`.
#[derive(Debug, Clone)]
pub struct FileSink {
    target: FileTarget,
    last_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
enum FileTarget {
    Path(PathBuf),
    Directory(PathBuf),
}

impl FileSink {
    /// Always write to `path`, overwriting previous captures.
    pub fn to_path(path: impl Into<PathBuf>) -> Self {
        Self {
            target: FileTarget::Path(path.into()),
            last_path: None,
        }
    }

    /// Write timestamped files into `dir`.
    pub fn in_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            target: FileTarget::Directory(dir.into()),
            last_path: None,
        }
    }

    /// The fallback surface: `screenshot_fallback.jpg` in `dir`.
    pub fn fallback_in(dir: impl AsRef<Path>) -> Self {
        Self::to_path(dir.as_ref().join(FALLBACK_FILE_NAME))
    }

    /// Path of the most recent successful write
    pub fn last_path(&self) -> Option<&Path> {
        self.last_path.as_deref()
    }

    fn next_path(&self) -> PathBuf {
        match &self.target {
            FileTarget::Path(p) => p.clone(),
            FileTarget::Directory(dir) => {
                let millis = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis())
                    .unwrap_or_default();
                dir.join(format!("screenshot_{}.jpg", millis))
            }
        }
    }
}

impl ImageSink for FileSink {
    fn deliver(&mut self, image: &EncodedImage) -> Result<()> {
        let path = self.next_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &image.bytes)?;
        info!("wrote {}x{} capture to {}", image.width, image.height, path.display());
        self.last_path = Some(path);
        Ok(())
    }
}

/// Keeps delivered images in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub images: Vec<EncodedImage>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ImageSink for MemorySink {
    fn deliver(&mut self, image: &EncodedImage) -> Result<()> {
        self.images.push(image.clone());
        Ok(())
    }
}

/// Discards delivered images
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ImageSink for NullSink {
    fn deliver(&mut self, _image: &EncodedImage) -> Result<()> {
        Ok(())
    }
}

/// Delivers to `primary`, handing the image to `fallback` if that fails.
#[derive(Debug, Clone)]
pub struct FallbackSink<P, F> {
    pub primary: P,
    pub fallback: F,
}

impl<P, F> FallbackSink<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: ImageSink, F: ImageSink> ImageSink for FallbackSink<P, F> {
    fn deliver(&mut self, image: &EncodedImage) -> Result<()> {
        match self.primary.deliver(image) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("primary delivery failed ({}); using fallback", e);
                self.fallback.deliver(image)
            }
        }
    }
}

impl<S: ImageSink + ?Sized> ImageSink for Box<S> {
    fn deliver(&mut self, image: &EncodedImage) -> Result<()> {
        (**self).deliver(image)
    }
}
