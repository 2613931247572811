//! Submission policy: exactly one of a text query or an image per submit

use crate::scratch::ImageFormat;
use axum::extract::multipart::{Multipart, MultipartError};
use thiserror::Error;

/// Raw contents of the submit form
#[derive(Debug, Default)]
pub struct SubmitForm {
    pub query: Option<String>,
    pub image: Option<Upload>,
}

/// An uploaded file as received
#[derive(Debug)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// An accepted image upload
#[derive(Debug)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

/// A validated submission
#[derive(Debug)]
pub enum Submission {
    Text(String),
    Image(ImageUpload),
}

/// Problems with what the user submitted. None of these reach the gateway.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Please enter a text query or upload an image (not both).")]
    BothSupplied,
    #[error("Please enter a text query or upload an image (not both).")]
    NothingSupplied,
    #[error("Unsupported file '{0}'. Please upload a jpg, jpeg or png image.")]
    UnsupportedImage(String),
    #[error("Error saving the uploaded image.")]
    Scratch(#[source] std::io::Error),
}

impl SubmissionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BothSupplied => "both_supplied",
            Self::NothingSupplied => "nothing_supplied",
            Self::UnsupportedImage(_) => "unsupported_image",
            Self::Scratch(_) => "scratch",
        }
    }
}

impl Submission {
    /// Apply the text-XOR-image rule. Whitespace-only text counts as no text;
    /// a file field with no bytes counts as no image, whatever its name.
    pub fn classify(form: SubmitForm) -> Result<Self, SubmissionError> {
        let query = form.query.filter(|q| !q.trim().is_empty());
        let image = form.image.filter(|upload| !upload.bytes.is_empty());

        match (query, image) {
            (Some(_), Some(_)) => Err(SubmissionError::BothSupplied),
            (None, None) => Err(SubmissionError::NothingSupplied),
            (Some(query), None) => Ok(Self::Text(query)),
            (None, Some(upload)) => {
                let format = ImageFormat::from_file_name(&upload.file_name)
                    .ok_or_else(|| SubmissionError::UnsupportedImage(upload.file_name.clone()))?;
                // Content wins over the name when they disagree
                let format = ImageFormat::sniff(&upload.bytes).unwrap_or(format);
                Ok(Self::Image(ImageUpload {
                    file_name: upload.file_name,
                    bytes: upload.bytes,
                    format,
                }))
            }
        }
    }
}

/// Read the `query` and `image` fields of a multipart submit form.
/// Unknown fields are skipped.
pub async fn read_form(mut multipart: Multipart) -> Result<SubmitForm, MultipartError> {
    let mut form = SubmitForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("query") => form.query = Some(field.text().await?),
            Some("image") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?.to_vec();
                form.image = Some(Upload { file_name, bytes });
            }
            _ => {}
        }
    }

    Ok(form)
}
