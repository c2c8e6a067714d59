//! Image to text transcription through a vision-capable chat model.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use tracing::{info, instrument};

use super::{ExtractionError, completions::CompletionsClient};

/// Transcripts containing any of these (case-insensitive) are treated as help or instruction
/// graphics rather than bills and discarded.
pub const UNWANTED_KEYWORDS: [&str; 6] = ["instructions", "terms", "guidelines", "help", "support", "important"];

const TRANSCRIBE_PROMPT: &str = "Extract all text from this image. Return only the extracted text without any additional \
explanations or formatting. Preserve the original layout and structure of the text. Include all numbers, dates, amounts, \
and any other textual information visible in the image.";

/// Turns an image into the text printed on it.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Returns the transcript, or [`ExtractionError::Empty`] when nothing usable was found.
    async fn extract_text(&self, image: &[u8], mime_type: &str) -> Result<String, ExtractionError>;
}

/// MIME type sent alongside a stored bill image: PNG for `.png`, JPEG for everything else.
///
/// PDFs never get here; uploads unpack them into their embedded JPEGs before anything is stored.
pub fn mime_for_path(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        _ => "image/jpeg",
    }
}

/// True when `text` trips the instructional keyword filter.
pub fn is_instructional(text: &str) -> bool {
    let lowered = text.to_lowercase();
    UNWANTED_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

pub struct VisionTextExtractor {
    completions: Arc<CompletionsClient>,
}

impl VisionTextExtractor {
    pub fn new(completions: Arc<CompletionsClient>) -> Self {
        Self { completions }
    }
}

#[async_trait]
impl TextExtractor for VisionTextExtractor {
    #[instrument(skip(self, image), fields(bytes = image.len()), err)]
    async fn extract_text(&self, image: &[u8], mime_type: &str) -> Result<String, ExtractionError> {
        let encoded = general_purpose::STANDARD.encode(image);
        let payload = json!({
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": TRANSCRIBE_PROMPT},
                    {"type": "image_url", "image_url": {"url": format!("data:{mime_type};base64,{encoded}")}}
                ]
            }],
            "temperature": 0.1,
            "max_tokens": 4000
        });

        let text = self.completions.complete(payload).await?;
        if text.is_empty() {
            return Err(ExtractionError::Empty);
        }
        if is_instructional(&text) {
            info!("Skipping image with instructional keywords");
            return Err(ExtractionError::Empty);
        }

        Ok(text)
    }
}
