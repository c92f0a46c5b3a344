use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use tracing::{debug, warn};

use crate::models::upload::{
    UploadedFile, MIME_DOCX, MIME_JPEG, MIME_JPG, MIME_PDF, MIME_PNG, MIME_TEXT,
};
use crate::models::verdict::{RejectionKind, ValidationVerdict};

const MB: u64 = 1024 * 1024;

/// Leading bytes inspected for signature matching.
const HEADER_LEN: usize = 10;

/// Bytes sampled by the text heuristic and the content scan.
const SAMPLE_LEN: usize = 1000;

/// Buffers shorter than this cannot carry any known signature.
const MIN_BUFFER_LEN: usize = 4;

/// Hard ceiling for the content scan regardless of declared type.
const MAX_SCAN_BYTES: usize = 100 * MB as usize;

/// Tag reported for uploads accepted by the text heuristic.
pub const TEXT_TAG: &str = "TEXT";

/// Known file signature, hex-encoded as it appears at offset 0.
pub struct Signature {
    pub tag: &'static str,
    pub format: &'static str,
    pub mime_types: &'static [&'static str],
}

pub const SIGNATURES: &[Signature] = &[
    Signature {
        tag: "255044462D",
        format: "PDF",
        mime_types: &[MIME_PDF],
    },
    Signature {
        tag: "89504E47",
        format: "PNG",
        mime_types: &[MIME_PNG],
    },
    Signature {
        tag: "FFD8FF",
        format: "JPEG",
        mime_types: &[MIME_JPEG, MIME_JPG],
    },
    Signature {
        tag: "504B0304",
        format: "DOCX",
        mime_types: &[MIME_DOCX],
    },
    // Empty zip archive.
    Signature {
        tag: "504B0506",
        format: "DOCX",
        mime_types: &[MIME_DOCX],
    },
];

/// Executables, scripts and system binaries.
static BLOCKED_EXTENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\.(exe|bat|cmd|com|scr|pif|vbs|vbe|js|jse|wsf|wsh|msi|msp|dll|sys|cpl|jar|ps1|sh|app|deb|rpm|apk)$",
    )
    .expect("blocked extension pattern is valid")
});

/// EICAR test string, its base64 form, and inline script injection.
static MALICIOUS_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"X5O!P%@AP\[4\\PZX54\(P\^\)7CC\)7\}\$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!\$H\+H\*",
        r"WDVPIVAlQEFQWzRcUFpYNTQoUF4pN0NDKTd9JEVJQ0FSLVNUQU5EQVJELUFOVElWSVJVUy1URVNULUZJTEUhJEgrSCo",
        r"(?i)<script[^>]*>[^<]*(eval|document\.cookie|window\.location)",
    ])
    .expect("malicious content patterns are valid")
});

/// Per-type upload limit in megabytes, `None` for types we do not accept.
pub fn max_size_mb(mime_type: &str) -> Option<u64> {
    match mime_type {
        MIME_PDF => Some(25),
        MIME_PNG | MIME_JPEG | MIME_JPG => Some(10),
        MIME_DOCX => Some(15),
        MIME_TEXT => Some(5),
        _ => None,
    }
}

fn to_whole_mb(bytes: u64) -> u64 {
    (bytes as f64 / MB as f64).round() as u64
}

/// Validate an upload before it may be queued for extraction.
///
/// Checks run cheapest and most dangerous first:
/// - Suspicious extension (short-circuits everything else)
/// - Per-type size policy
/// - Byte signature against the declared MIME type, or the printable-ratio
///   heuristic for `text/plain`
/// - Local pattern scan of the first 1000 bytes and the filename
///
/// The scan is a best-effort pattern match, not malware detection.
pub fn validate(filename: &str, declared_mime: &str, size: u64, buffer: &[u8]) -> ValidationVerdict {
    let verdict = evaluate(filename, declared_mime, size, buffer);

    match verdict.kind {
        Some(kind) => {
            warn!(
                filename = %filename,
                mime_type = %declared_mime,
                size,
                kind = %kind,
                reason = verdict.reason.as_deref().unwrap_or_default(),
                "Upload rejected"
            );
            metrics::counter!("upload_validation_rejections", "kind" => <&'static str>::from(kind))
                .increment(1);
        }
        None => {
            debug!(
                filename = %filename,
                signature = verdict.signature_tag.as_deref().unwrap_or_default(),
                "Upload accepted"
            );
        }
    }

    verdict
}

/// Convenience wrapper over [`validate`] for an [`UploadedFile`].
pub fn validate_upload(file: &UploadedFile) -> ValidationVerdict {
    validate(&file.filename, &file.mime_type, file.size, &file.bytes)
}

fn evaluate(filename: &str, declared_mime: &str, size: u64, buffer: &[u8]) -> ValidationVerdict {
    if let Some(rejection) = check_extension(filename) {
        return rejection;
    }

    if let Some(rejection) = check_size(declared_mime, size) {
        return rejection;
    }

    let signature_tag = match check_signature(declared_mime, buffer) {
        Ok(tag) => tag,
        Err(rejection) => return rejection,
    };

    if let Some(rejection) = scan_content(filename, buffer) {
        return rejection;
    }

    ValidationVerdict::accept(signature_tag)
}

/// Reject filenames ending in an executable, script or system-binary extension.
pub fn check_extension(filename: &str) -> Option<ValidationVerdict> {
    let found = BLOCKED_EXTENSION.find(filename)?;
    Some(ValidationVerdict::reject(
        RejectionKind::BlockedExtension,
        format!(
            "File extension '{}' is not allowed for security reasons",
            found.as_str().to_lowercase()
        ),
    ))
}

/// Enforce the per-type size limit against the declared size.
pub fn check_size(declared_mime: &str, size: u64) -> Option<ValidationVerdict> {
    let Some(limit_mb) = max_size_mb(declared_mime) else {
        return Some(ValidationVerdict::reject(
            RejectionKind::UnsupportedType,
            format!("File type '{}' is not supported", declared_mime),
        ));
    };

    if size > limit_mb * MB {
        return Some(ValidationVerdict::reject(
            RejectionKind::TooLarge,
            format!(
                "File size ({}MB) exceeds maximum allowed size ({}MB) for {}",
                to_whole_mb(size),
                limit_mb,
                declared_mime
            ),
        ));
    }

    None
}

/// Match the buffer's leading bytes against the signature table.
///
/// Returns the matched signature tag, or [`TEXT_TAG`] when a `text/plain`
/// upload passes the printable-ratio heuristic.
pub fn check_signature(declared_mime: &str, buffer: &[u8]) -> Result<String, ValidationVerdict> {
    if buffer.len() < MIN_BUFFER_LEN {
        return Err(ValidationVerdict::reject(
            RejectionKind::TooSmall,
            "File is too small to validate",
        ));
    }

    if declared_mime == MIME_TEXT {
        return if is_likely_text(buffer) {
            Ok(TEXT_TAG.to_string())
        } else {
            Err(ValidationVerdict::reject(
                RejectionKind::NotText,
                "File does not appear to be a valid text file",
            ))
        };
    }

    let header = hex::encode_upper(&buffer[..buffer.len().min(HEADER_LEN)]);

    SIGNATURES
        .iter()
        .find(|sig| header.starts_with(sig.tag) && sig.mime_types.iter().any(|m| *m == declared_mime))
        .map(|sig| sig.tag.to_string())
        .ok_or_else(|| {
            ValidationVerdict::reject(
                RejectionKind::SignatureMismatch,
                format!(
                    "File content does not match declared type {}. The file may be renamed or corrupted",
                    declared_mime
                ),
            )
        })
}

/// At least 80% of the first 1000 bytes are printable ASCII, tab, LF or CR.
pub fn is_likely_text(buffer: &[u8]) -> bool {
    let sample = &buffer[..buffer.len().min(SAMPLE_LEN)];
    if sample.is_empty() {
        return false;
    }

    let printable = sample
        .iter()
        .filter(|&&b| (32..=126).contains(&b) || matches!(b, 9 | 10 | 13))
        .count();

    printable * 10 >= sample.len() * 8
}

/// Heuristic content scan over the filename and the first 1000 bytes.
pub fn scan_content(filename: &str, buffer: &[u8]) -> Option<ValidationVerdict> {
    if buffer.is_empty() {
        return Some(ValidationVerdict::reject(RejectionKind::Empty, "File is empty"));
    }

    if buffer.len() > MAX_SCAN_BYTES {
        return Some(ValidationVerdict::reject(
            RejectionKind::TooLargeForScan,
            "File is too large for security processing",
        ));
    }

    let sample = String::from_utf8_lossy(&buffer[..buffer.len().min(SAMPLE_LEN)]);
    if MALICIOUS_PATTERNS.is_match(&sample) || MALICIOUS_PATTERNS.is_match(filename) {
        return Some(ValidationVerdict::reject(
            RejectionKind::MaliciousContent,
            "File contains potentially malicious content",
        ));
    }

    None
}
