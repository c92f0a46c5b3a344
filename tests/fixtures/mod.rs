//! Sample documents for end-to-end and pipeline tests

#![allow(dead_code)]

use std::io::{Cursor, Write};

use image::{ImageBuffer, ImageFormat, Rgb};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// An upload as a client would send it.
#[derive(Debug, Clone)]
pub struct TestDocument {
    pub filename: &'static str,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl TestDocument {
    fn new(filename: &'static str, mime_type: &'static str, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename,
            mime_type,
            bytes: bytes.into(),
        }
    }
}

pub const MEETING_NOTES: &str = "Meeting notes\r\nAttendees: Ana, Bo\r\nNext review on Friday\r\n";

pub fn text_document() -> TestDocument {
    TestDocument::new("notes.txt", "text/plain", MEETING_NOTES)
}

pub fn docx_document() -> TestDocument {
    let body = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Purchase order 7731</w:t></w:r></w:p>
    <w:p><w:r><w:t>Deliver by March</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("[Content_Types].xml", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"<Types/>").unwrap();
    writer
        .start_file("word/document.xml", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(body.as_bytes()).unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    TestDocument::new(
        "order.docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        bytes,
    )
}

pub fn png_document() -> TestDocument {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(48, 24, Rgb([250, 250, 250]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    TestDocument::new("scan.png", "image/png", out.into_inner())
}

/// PNG bytes declared as a PDF.
pub fn renamed_document() -> TestDocument {
    let png = png_document();
    TestDocument::new("invoice.pdf", "application/pdf", png.bytes)
}

/// Blocked by extension before anything else is looked at.
pub fn executable_document() -> TestDocument {
    TestDocument::new("setup.exe", "application/octet-stream", b"MZ\x90\x00\x03\x00\x00\x00".to_vec())
}

pub fn eicar_document() -> TestDocument {
    TestDocument::new(
        "readme.txt",
        "text/plain",
        r"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*",
    )
}
