//! Bill text to structured fields through a chat model in JSON mode.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{instrument, warn};

use super::{ExtractionError, completions::CompletionsClient, draft::ExtractionDraft};

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that extracts structured data from bills and returns only valid JSON without any explanations or markdown formatting.";

static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("object pattern is a valid regex"));

/// Turns a bill transcript into an untrusted structured draft.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// `usd_to_inr` is embedded in the instructions so USD bills get an INR amount.
    ///
    /// Empty text returns [`ExtractionError::Empty`] without calling out.
    async fn extract_fields(&self, text: &str, usd_to_inr: f64) -> Result<ExtractionDraft, ExtractionError>;
}

/// Instruction prompt for one bill.
pub fn build_prompt(text: &str, usd_to_inr: f64) -> String {
    format!(
        r#"Extract structured data from the given bill text with maximum accuracy.

Return **only** JSON output without explanations.

### Rules:
- **Date**: Format **DD-MM-YYYY** (e.g., 05-01-2024). Convert formats like DD/MM/YYYY, YYYY-MM-DD, and DD Mon YYYY.
- **Time**: Format **HH:MM** (12-hour, e.g., 03:45).**Exclude AM/PM**.
- **Time (AM/PM)**: Extract **only** "AM" or "PM", else "".
- **Bill Type**: Categorize as **"food"**, **"flight"**, or **"cab"** based on keywords.
- "Currency Name": Extract currency code (e.g., USD, INR, EUR) or infer from symbols (e.g., $ → USD, ₹ → INR).
  - should **not include** any other number or alphabet other than currency symbol
  - If unavailable, return "".
- "Bill Amount": Extract as **<currency symbol><amount>** (e.g., $25, ₹500).
  - Include symbol if present; otherwise, return numeric amount only (e.g., 25).
  - **Do not include any other characters, numbers, or alphabets.**
  - Convert codes like "INR" → "₹", "USD" → "$", "EUR" → "€".
  - If the symbol is missing or unrecognized, return "".
- **Bill Amount (INR)**:
  - Convert all currency values to INR.
  - If the bill is in **USD**, convert it to INR using the current exchange rate ({usd_to_inr:?}).
  - If already in INR, keep the value as is.
  - If the currency is **not USD or INR**, return "".
- **Details**:
  - "food": **only** Extract restaurant name.**Return only** name nothing else
  - "flight"/"cab": Extract **"From: <location> - To: <location>"**.**Return only** specific address not full address only important one.
  - If missing, return "".

### Example:
Example Input:
```
Bill: XYZ Restaurant
Date: January 5, 2024
Time: 15:45 PM
Type: Meal
Amount: 500 INR
```
Expected JSON Output:
```json
{{
    "Date": "05-01-2024",
    "Time": "03:45",
    "Time (AM/PM)": "PM",
    "Bill Type": "food",
    "Currency Name": "INR",
    "Bill Amount": "₹500",
    "Bill Amount (INR)": "₹500",
    "Details": "XYZ Restaurant"
}}
```

### Bill Text:
{text}

### JSON Output:
"#
    )
}

/// Parse the model's reply into a draft.
///
/// The reply is parsed as JSON directly; failing that, the widest `{...}` span in it is tried.
/// A reply with no fields at all is [`ExtractionError::Empty`].
pub fn parse_reply(reply: &str) -> Result<ExtractionDraft, ExtractionError> {
    let value = match serde_json::from_str::<Value>(reply) {
        Ok(value) => value,
        Err(_) => {
            let span = JSON_OBJECT.find(reply).ok_or_else(|| {
                warn!("Failed to parse JSON from completion reply");
                ExtractionError::Malformed {
                    reason: "reply contains no JSON object".to_string(),
                }
            })?;
            serde_json::from_str(span.as_str()).map_err(|e| ExtractionError::Malformed {
                reason: format!("reply JSON is invalid: {e}"),
            })?
        }
    };

    let draft = ExtractionDraft::from_value(value);
    if draft.is_empty() {
        return Err(ExtractionError::Empty);
    }
    Ok(draft)
}

pub struct ChatFieldExtractor {
    completions: Arc<CompletionsClient>,
}

impl ChatFieldExtractor {
    pub fn new(completions: Arc<CompletionsClient>) -> Self {
        Self { completions }
    }
}

#[async_trait]
impl FieldExtractor for ChatFieldExtractor {
    #[instrument(skip(self, text), fields(chars = text.len()), err)]
    async fn extract_fields(&self, text: &str, usd_to_inr: f64) -> Result<ExtractionDraft, ExtractionError> {
        if text.trim().is_empty() {
            return Err(ExtractionError::Empty);
        }

        let payload = json!({
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(text, usd_to_inr)}
            ],
            "temperature": 0.1,
            "response_format": {"type": "json_object"}
        });

        let reply = self.completions.complete(payload).await?;
        parse_reply(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::extraction::draft::BillType;
    use url::Url;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn extractor(server: &MockServer) -> ChatFieldExtractor {
        let config = ExtractionConfig {
            api_key: Some("sk-test".to_string()),
            openai_url: Url::parse(&server.uri()).unwrap(),
            ..Default::default()
        };
        ChatFieldExtractor::new(Arc::new(CompletionsClient::new(&config).unwrap()))
    }

    #[test]
    fn test_parse_plain_json() {
        let draft = parse_reply(r#"{"Date": "05-01-2024", "Bill Amount": "₹500", "Bill Type": "food"}"#).unwrap();
        assert_eq!(draft.date.as_deref(), Some("05-01-2024"));
        assert_eq!(draft.bill_type, Some(BillType::Food));
    }

    #[test]
    fn test_parse_json_wrapped_in_prose() {
        let reply = "Here you go:\n```json\n{\n  \"Date\": \"05-01-2024\",\n  \"Bill Amount\": \"$25\"\n}\n```\nThanks!";
        let draft = parse_reply(reply).unwrap();
        assert_eq!(draft.bill_amount.as_deref(), Some("$25"));
    }

    #[test]
    fn test_unparseable_reply_is_malformed() {
        assert!(matches!(parse_reply("no json here"), Err(ExtractionError::Malformed { .. })));
        assert!(matches!(parse_reply("{ not: json }"), Err(ExtractionError::Malformed { .. })));
    }

    #[test]
    fn test_empty_object_is_empty() {
        assert!(parse_reply("{}").unwrap_err().is_empty());
        assert!(parse_reply("[]").unwrap_err().is_empty());
    }

    #[test]
    fn test_prompt_embeds_rate_and_text() {
        let prompt = build_prompt("Bill: XYZ Restaurant", 83.0);
        assert!(prompt.contains("current exchange rate (83.0)"));
        assert!(prompt.contains("### Bill Text:\nBill: XYZ Restaurant\n"));
        assert!(prompt.contains("\"Details\": \"XYZ Restaurant\""));
    }

    #[tokio::test]
    async fn test_empty_text_makes_no_call() {
        let server = MockServer::start().await;
        let err = extractor(&server).extract_fields("  \n", 83.0).await.unwrap_err();
        assert!(err.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requests_json_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "temperature": 0.1,
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{\"Date\": \"05-01-2024\", \"Bill Amount\": \"₹500\"}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let draft = extractor(&server).extract_fields("XYZ Restaurant ₹500", 83.0).await.unwrap();
        assert_eq!(draft.bill_amount.as_deref(), Some("₹500"));

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
    }
}
