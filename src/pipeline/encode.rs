//! Image encoding: composite bitmap → named PNG artifact.
//!
//! PNG is lossless, which matters for small résumé fonts: JPEG artefacts
//! around glyphs degrade what a vision model can read. The encoder runs at
//! its best compression with adaptive filtering; output is identical pixel
//! for pixel either way.
//!
//! Best compression on a multi-megapixel composite takes long enough to
//! stall a Tokio worker, so async callers go through [`encode`], which runs
//! [`encode_composite`] on the blocking pool.

use crate::error::EncodeError;
use crate::pipeline::render::CompositeImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::ImageEncoder as _;
use image::ExtendedColorType;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// MIME type of every encoded artifact.
pub const PNG_MIME: &str = "image/png";

static RE_PDF_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.pdf$").unwrap());

/// A named PNG ready for upload.
#[derive(Debug, Clone)]
pub struct EncodedArtifact {
    pub name: String,
    pub mime_type: &'static str,
    pub bytes: Arc<[u8]>,
}

impl EncodedArtifact {
    /// `data:` URI for immediate display. The caller owns the string.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

/// Derive the artifact name: drop one trailing `.pdf` (any case), add `.png`.
pub fn artifact_name(source_name: &str) -> String {
    format!("{}.png", RE_PDF_SUFFIX.replace(source_name, ""))
}

/// Serialise `image` as a PNG named after `source_name`.
pub fn encode_composite(
    image: &CompositeImage,
    source_name: &str,
) -> Result<EncodedArtifact, EncodeError> {
    let mut buf = Vec::new();
    PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive)
        .write_image(
            image.image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )?;

    if buf.is_empty() {
        return Err(EncodeError::Empty);
    }

    let name = artifact_name(source_name);
    debug!("Encoded {} → {} bytes", name, buf.len());

    Ok(EncodedArtifact {
        name,
        mime_type: PNG_MIME,
        bytes: buf.into(),
    })
}

/// [`encode_composite`] on the blocking pool. Takes ownership of the bitmap
/// so it can move to the worker thread.
pub async fn encode(
    composite: CompositeImage,
    source_name: &str,
) -> Result<EncodedArtifact, EncodeError> {
    let name = source_name.to_string();
    tokio::task::spawn_blocking(move || encode_composite(&composite, &name))
        .await
        .map_err(|e| EncodeError::Internal(e.to_string()))?
}
