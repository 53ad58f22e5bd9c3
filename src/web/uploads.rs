use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use chrono::Utc;
use tokio::{fs::File, io::AsyncWriteExt};
use uuid::Uuid;

/// Result type used by the upload helpers.
pub type UploadResult<T> = Result<T, UploadError>;

/// MIME types accepted for question attachments.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.ms-powerpoint",
    "image/png",
    "image/jpeg",
    "image/gif",
];

pub const ALLOWED_TYPES_HINT: &str =
    "Allowed types: PDF, DOC/DOCX, PPT/PPTX, images (PNG, JPG, JPEG, GIF)";

/// Error returned when reading or persisting uploaded files.
#[derive(Debug)]
pub struct UploadError {
    message: String,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UploadError {}

/// A file field buffered out of a multipart request.
#[derive(Debug)]
pub struct IncomingFile {
    pub original_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Fields of the attachment upload form.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<IncomingFile>,
    pub question_id: Option<String>,
    pub folder_id: Option<String>,
}

/// Metadata for an upload persisted to the storage directory.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub stored_name: String,
    pub stored_path: PathBuf,
    pub size: u64,
}

/// Read the upload form. The file is buffered in memory because validation
/// needs `questionId`, which may arrive after the file field.
pub async fn read_upload_form(mut multipart: Multipart) -> UploadResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| UploadError::new(format!("Failed to parse upload form: {err}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        if field.file_name().is_some() {
            if field_name != "file" {
                return Err(UploadError::new(format!(
                    "Unsupported file field: `{field_name}`"
                )));
            }
            let original_name = field.file_name().unwrap_or("upload.bin").to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|err| UploadError::new(format!("Failed to read upload data: {err}")))?;
            form.file = Some(IncomingFile {
                original_name,
                content_type,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|err| UploadError::new(format!("Failed to read field `{field_name}`: {err}")))?;
        match field_name.as_str() {
            "questionId" => form.question_id = non_empty(value),
            "folderId" => form.folder_id = non_empty(value),
            _ => {}
        }
    }

    Ok(form)
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "null" {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Whether the declared content type is on the attachment allowlist.
/// Parameters (e.g. `; charset=...`) are ignored.
pub fn is_allowed_type(content_type: &str) -> bool {
    content_type
        .parse::<mime::Mime>()
        .map(|parsed| ALLOWED_MIME_TYPES.contains(&parsed.essence_str()))
        .unwrap_or(false)
}

/// Persist an upload under a generated collision-free name, keeping the
/// original extension.
pub async fn store_upload(dir: &Path, incoming: &IncomingFile) -> UploadResult<StoredUpload> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|err| UploadError::new(format!("Failed to create upload directory: {err}")))?;

    let stored_name = generated_name(&incoming.original_name);
    let stored_path = dir.join(&stored_name);

    let mut file = File::create(&stored_path)
        .await
        .map_err(|err| UploadError::new(format!("Failed to save file: {err}")))?;
    file.write_all(&incoming.bytes)
        .await
        .map_err(|err| UploadError::new(format!("Failed to write file: {err}")))?;
    file.flush()
        .await
        .map_err(|err| UploadError::new(format!("Failed to flush file: {err}")))?;

    Ok(StoredUpload {
        stored_name,
        stored_path,
        size: incoming.bytes.len() as u64,
    })
}

fn generated_name(original_name: &str) -> String {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    let suffix = Uuid::new_v4().simple().to_string();
    let stem = format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..6]);
    match extension {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn allowlist_ignores_parameters() {
        assert!(is_allowed_type("application/pdf"));
        assert!(is_allowed_type("image/png; charset=binary"));
        assert!(!is_allowed_type("application/zip"));
        assert!(!is_allowed_type("not a mime type"));
        assert!(!is_allowed_type(""));
    }

    #[test]
    fn generated_names_keep_a_clean_extension() {
        let name = generated_name("Histology Notes.PDF");
        assert!(name.ends_with(".pdf"));
        assert!(!name.contains(' '));

        let odd = generated_name("archive.tar/..");
        assert!(!odd.contains('/'));
        assert!(!odd.contains(".."));
    }

    #[test]
    fn generated_names_do_not_collide() {
        let a = generated_name("a.pdf");
        let b = generated_name("a.pdf");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn store_upload_writes_bytes_to_disk() {
        let dir = tempdir().unwrap();
        let incoming = IncomingFile {
            original_name: "ecg.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![1, 2, 3, 4],
        };

        let stored = store_upload(dir.path(), &incoming).await.unwrap();
        assert_eq!(stored.size, 4);
        assert!(stored.stored_name.ends_with(".png"));
        let on_disk = tokio::fs::read(&stored.stored_path).await.unwrap();
        assert_eq!(on_disk, incoming.bytes);
    }
}
