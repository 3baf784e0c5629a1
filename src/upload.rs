//! Upload guard for the image-analysis path.
//!
//! Attachments are buffered in memory for forwarding, so the size ceiling
//! also bounds per-request memory. Both checks run while the multipart body
//! is being read; nothing reaches the inference client until they pass.

use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;
use thiserror::Error;

use crate::config::DEFAULT_UPLOAD_MAX_BYTES;

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadRejection {
    #[error("Image file is required")]
    MissingFile,

    #[error("File too large. Maximum {limit_mb}MB")]
    TooLarge { limit_mb: usize },

    #[error("Only image files are allowed (got {0})")]
    UnsupportedType(String),

    #[error("Malformed upload: {0}")]
    Malformed(String),
}

impl UploadRejection {
    /// Whether this rejection concerns the attachment itself rather than the form.
    pub fn is_payload_rejection(&self) -> bool {
        matches!(self, Self::TooLarge { .. } | Self::UnsupportedType(_))
    }
}

/// Size ceiling and type allow-list for attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_UPLOAD_MAX_BYTES,
        }
    }
}

impl UploadPolicy {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Check the attachment's declared content type. A part without a
    /// declaration is rejected, whatever its filename says.
    pub fn check_content_type(&self, declared: Option<&str>) -> Result<String, UploadRejection> {
        let mime = declared.map(str::trim).unwrap_or("").to_ascii_lowercase();
        if mime.starts_with("image/") {
            Ok(mime)
        } else if mime.is_empty() {
            Err(UploadRejection::UnsupportedType("undeclared".into()))
        } else {
            Err(UploadRejection::UnsupportedType(mime))
        }
    }

    pub fn check_size(&self, len: usize) -> Result<(), UploadRejection> {
        if len > self.max_bytes {
            Err(UploadRejection::TooLarge {
                limit_mb: self.max_bytes / (1024 * 1024),
            })
        } else {
            Ok(())
        }
    }
}

/// A validated image upload with its accompanying form fields.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
    pub description: String,
    pub language: String,
}

/// Read the image-analysis form, enforcing `policy` on the attachment.
pub async fn read_image_upload(
    policy: &UploadPolicy,
    multipart: &mut Multipart,
) -> Result<ImageUpload, UploadRejection> {
    let mut image: Option<(Vec<u8>, String, String)> = None;
    let mut description = String::new();
    let mut language = String::from("en");

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| map_multipart_error(policy, e))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            IMAGE_FIELD => {
                let mime = policy.check_content_type(field.content_type())?;
                let filename = field
                    .file_name()
                    .filter(|name| !name.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| fallback_filename(&mime));
                let bytes = read_bounded(policy, field).await?;
                image = Some((bytes, filename, mime));
            }
            "description" => {
                description = field
                    .text()
                    .await
                    .map_err(|e| map_multipart_error(policy, e))?;
            }
            "language" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| map_multipart_error(policy, e))?;
                if !value.trim().is_empty() {
                    language = value.trim().to_string();
                }
            }
            _ => {}
        }
    }

    let (bytes, filename, mime_type) = image.ok_or(UploadRejection::MissingFile)?;
    if bytes.is_empty() {
        return Err(UploadRejection::MissingFile);
    }

    Ok(ImageUpload {
        bytes,
        filename,
        mime_type,
        description,
        language,
    })
}

/// Buffer a field, failing as soon as it crosses the ceiling.
async fn read_bounded(policy: &UploadPolicy, mut field: Field<'_>) -> Result<Vec<u8>, UploadRejection> {
    let mut buf = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| map_multipart_error(policy, e))?
    {
        policy.check_size(buf.len() + chunk.len())?;
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Name forwarded upstream when the client sent none: `image.<ext>` with
/// the extension registered for `mime`.
fn fallback_filename(mime: &str) -> String {
    match mime_guess::get_mime_extensions_str(mime).and_then(|exts| exts.first()) {
        Some(ext) => format!("image.{ext}"),
        None => "image".to_string(),
    }
}

fn map_multipart_error(policy: &UploadPolicy, err: MultipartError) -> UploadRejection {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadRejection::TooLarge {
            limit_mb: policy.max_bytes / (1024 * 1024),
        }
    } else {
        UploadRejection::Malformed(err.body_text())
    }
}
