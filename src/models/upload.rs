use bytes::Bytes;
use serde::Serialize;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_PNG: &str = "image/png";
pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_JPG: &str = "image/jpg";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";

/// An uploaded file as handed to the validator and, once accepted, to a job.
///
/// `bytes` is reference counted, so cloning an upload for a retry attempt
/// never copies the file contents.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(skip)]
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            size: bytes.len() as u64,
            bytes,
        }
    }
}

/// Best-effort MIME guess from a file extension, used where no declared type
/// is available (the command-line batch runner).
pub fn mime_from_filename(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(MIME_PDF),
        "png" => Some(MIME_PNG),
        "jpg" | "jpeg" => Some(MIME_JPEG),
        "docx" => Some(MIME_DOCX),
        "txt" | "text" | "log" | "md" => Some(MIME_TEXT),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_from_filename() {
        assert_eq!(mime_from_filename("report.PDF"), Some(MIME_PDF));
        assert_eq!(mime_from_filename("scan.jpeg"), Some(MIME_JPEG));
        assert_eq!(mime_from_filename("notes.txt"), Some(MIME_TEXT));
        assert_eq!(mime_from_filename("letter.docx"), Some(MIME_DOCX));
        assert_eq!(mime_from_filename("archive.tar"), None);
        assert_eq!(mime_from_filename("README"), None);
    }

    #[test]
    fn test_size_follows_bytes() {
        let file = UploadedFile::new("a.txt", MIME_TEXT, Bytes::from_static(b"hello"));
        assert_eq!(file.size, 5);
    }
}
