use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Why an upload was refused before any extraction was attempted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RejectionKind {
    BlockedExtension,
    UnsupportedType,
    TooLarge,
    TooSmall,
    SignatureMismatch,
    NotText,
    Empty,
    MaliciousContent,
    TooLargeForScan,
}

/// Accept/reject decision for one upload.
///
/// `reason` and `kind` are present iff rejected; `signature_tag` iff accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<RejectionKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_tag: Option<String>,
}

impl ValidationVerdict {
    pub fn accept(signature_tag: impl Into<String>) -> Self {
        Self {
            accepted: true,
            kind: None,
            reason: None,
            signature_tag: Some(signature_tag.into()),
        }
    }

    pub fn reject(kind: RejectionKind, reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            kind: Some(kind),
            reason: Some(reason.into()),
            signature_tag: None,
        }
    }
}
