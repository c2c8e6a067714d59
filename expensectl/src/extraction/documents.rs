//! Bill images carried by an upload.
//!
//! Images pass through untouched. A PDF yields the JPEG images embedded in it, in object order. A
//! ZIP archive yields its image entries plus the images of any PDFs it holds; other entries are
//! ignored.

use std::io::{Cursor, Read};

use lopdf::{Dictionary, Document, Object};
use thiserror::Error;
use tracing::debug;

pub const PDF_EXTENSION: &str = "pdf";
pub const ARCHIVE_EXTENSION: &str = "zip";
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// One image ready to be stored and transcribed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillImage {
    /// Lowercased extension the image is stored under
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl BillImage {
    fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            extension: "jpg".to_string(),
            bytes,
        }
    }
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("unreadable PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("unreadable ZIP archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("failed to read archive entry: {0}")]
    Io(#[from] std::io::Error),
}

/// Lowercased extension of `filename`, if it has one.
pub fn extension_of(filename: &str) -> Option<String> {
    filename.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

/// Split an upload into the images it carries.
///
/// `extension` is the upload's lowercased extension; anything other than a PDF or an archive is
/// taken to be an image already. Archive entries larger than `max_entry_size` are skipped.
pub fn bill_images(extension: &str, bytes: &[u8], max_entry_size: u64) -> Result<Vec<BillImage>, DocumentError> {
    match extension {
        PDF_EXTENSION => pdf_images(bytes),
        ARCHIVE_EXTENSION => archive_images(bytes, max_entry_size),
        _ => Ok(vec![BillImage {
            extension: extension.to_string(),
            bytes: bytes.to_vec(),
        }]),
    }
}

/// JPEG images embedded in a PDF. Images stored in other encodings are skipped.
pub fn pdf_images(bytes: &[u8]) -> Result<Vec<BillImage>, DocumentError> {
    let document = Document::load_mem(bytes)?;

    let mut images = Vec::new();
    for (id, object) in &document.objects {
        let Object::Stream(stream) = object else { continue };
        if !is_image(&stream.dict) {
            continue;
        }
        if is_plain_jpeg(&stream.dict) {
            images.push(BillImage::jpeg(stream.content.clone()));
        } else {
            debug!(object = ?id, "Skipping PDF image that is not a plain JPEG");
        }
    }

    debug!(count = images.len(), "Extracted images from PDF");
    Ok(images)
}

fn is_image(dict: &Dictionary) -> bool {
    matches!(dict.get(b"Subtype"), Ok(Object::Name(name)) if name.as_slice() == b"Image")
}

// DCTDecode as the only filter means the stream content is the JPEG file itself
fn is_plain_jpeg(dict: &Dictionary) -> bool {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => name.as_slice() == b"DCTDecode",
        Ok(Object::Array(filters)) => {
            matches!(filters.as_slice(), [Object::Name(name)] if name.as_slice() == b"DCTDecode")
        }
        _ => false,
    }
}

fn archive_images(bytes: &[u8], max_entry_size: u64) -> Result<Vec<BillImage>, DocumentError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let mut images = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let Some(extension) = extension_of(&name) else { continue };
        let is_pdf = extension == PDF_EXTENSION;
        if !is_pdf && !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            continue;
        }

        // The declared size can lie, so the read is capped as well
        let mut content = Vec::new();
        entry.by_ref().take(max_entry_size + 1).read_to_end(&mut content)?;
        if content.len() as u64 > max_entry_size {
            debug!(entry = %name, "Skipping oversized archive entry");
            continue;
        }

        if is_pdf {
            match pdf_images(&content) {
                Ok(found) => images.extend(found),
                Err(e) => debug!(entry = %name, "Skipping unreadable PDF in archive: {e}"),
            }
        } else {
            images.push(BillImage { extension, bytes: content });
        }
    }

    debug!(count = images.len(), "Extracted images from archive");
    Ok(images)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::{Stream, dictionary};
    use std::io::Write;
    use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

    const JPEG: &[u8] = b"\xff\xd8\xff\xe0 bill \xff\xd9";

    /// A one-page PDF holding `jpegs` as DCT images plus one Flate-encoded image.
    pub(crate) fn pdf_with_jpegs(jpegs: &[&[u8]]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut xobjects = Dictionary::new();
        for (i, jpeg) in jpegs.iter().enumerate() {
            let image_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => 1,
                    "Height" => 1,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                jpeg.to_vec(),
            ));
            xobjects.set(format!("Im{i}"), image_id);
        }
        let raw_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "Filter" => "FlateDecode",
            },
            b"not a jpeg".to_vec(),
        ));
        xobjects.set("Raw", raw_id);

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
            "Resources" => dictionary! { "XObject" => xobjects },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    pub(crate) fn archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_images_pass_through() {
        let images = bill_images("png", b"png-bytes", 10).unwrap();
        assert_eq!(
            images,
            vec![BillImage {
                extension: "png".to_string(),
                bytes: b"png-bytes".to_vec()
            }]
        );
    }

    #[test]
    fn test_pdf_yields_embedded_jpegs_only() {
        let second: &[u8] = b"\xff\xd8 second \xff\xd9";
        let pdf = pdf_with_jpegs(&[JPEG, second]);

        let images = bill_images("pdf", &pdf, 1024).unwrap();
        assert_eq!(images.len(), 2);
        assert!(images.iter().all(|image| image.extension == "jpg"));
        assert_eq!(images[0].bytes, JPEG);
        assert_eq!(images[1].bytes, second);
    }

    #[test]
    fn test_pdf_without_images_is_empty() {
        assert!(pdf_images(&pdf_with_jpegs(&[])).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_pdf_is_an_error() {
        assert!(matches!(pdf_images(b"definitely not a pdf"), Err(DocumentError::Pdf(_))));
    }

    #[test]
    fn test_archive_yields_images_and_pdf_contents() {
        let pdf = pdf_with_jpegs(&[JPEG]);
        let big = vec![0u8; pdf.len() + 1];
        let zip = archive(&[
            ("bills/a.PNG", &b"png-a"[..]),
            ("notes.txt", &b"ignore me"[..]),
            ("bills/b.pdf", pdf.as_slice()),
            ("broken.pdf", &b"nope"[..]),
            ("big.jpg", big.as_slice()),
        ]);

        let images = bill_images("zip", &zip, pdf.len() as u64).unwrap();
        assert_eq!(
            images,
            vec![
                BillImage {
                    extension: "png".to_string(),
                    bytes: b"png-a".to_vec()
                },
                BillImage::jpeg(JPEG.to_vec()),
            ]
        );
    }

    #[test]
    fn test_garbage_archive_is_an_error() {
        assert!(matches!(bill_images("zip", b"PK nope", 1024), Err(DocumentError::Archive(_))));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Bills.ZIP").as_deref(), Some("zip"));
        assert_eq!(extension_of("a.b.jpeg").as_deref(), Some("jpeg"));
        assert_eq!(extension_of("noext"), None);
    }
}
