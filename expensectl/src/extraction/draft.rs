//! Bill payload types.
//!
//! [`ExtractionDraft`] is the model's structured guess and is never trusted: every field is
//! optional and anything that is not text-like reads as unknown instead of failing.
//! [`NormalizedBill`] is a draft that went through [`super::normalize`] and is the shape that gets
//! persisted and returned to clients. Both serialize with the bill JSON keys (`"Date"`,
//! `"Bill Amount (INR)"`, ...).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::{fmt, ops::Deref, str::FromStr};

/// JSON keys used by the extraction prompt and the stored payload.
pub mod keys {
    pub const DATE: &str = "Date";
    pub const TIME: &str = "Time";
    pub const TIME_MERIDIEM: &str = "Time (AM/PM)";
    pub const BILL_TYPE: &str = "Bill Type";
    pub const CURRENCY_NAME: &str = "Currency Name";
    pub const BILL_AMOUNT: &str = "Bill Amount";
    pub const BILL_AMOUNT_INR: &str = "Bill Amount (INR)";
    pub const DETAILS: &str = "Details";
    /// Lowercase date key some replies use instead of `Date`
    pub const DATE_LOWER: &str = "date";
    /// Total key some replies use instead of `Bill Amount`
    pub const TOTAL: &str = "total";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillType {
    Food,
    Flight,
    Cab,
}

impl BillType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillType::Food => "food",
            BillType::Flight => "flight",
            BillType::Cab => "cab",
        }
    }

    /// Travel bills carry a "From: X - To: Y" route in their details.
    pub fn is_travel(&self) -> bool {
        matches!(self, BillType::Flight | BillType::Cab)
    }
}

impl fmt::Display for BillType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "food" => Ok(BillType::Food),
            "flight" => Ok(BillType::Flight),
            "cab" => Ok(BillType::Cab),
            _ => Err(()),
        }
    }
}

/// AM/PM marker of the bill time. Serialized as `"AM"`, `"PM"` or `""`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Meridiem {
    Am,
    Pm,
    #[default]
    Unset,
}

impl Meridiem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Meridiem::Am => "AM",
            Meridiem::Pm => "PM",
            Meridiem::Unset => "",
        }
    }

    fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.eq_ignore_ascii_case("am") {
            Meridiem::Am
        } else if s.eq_ignore_ascii_case("pm") {
            Meridiem::Pm
        } else {
            Meridiem::Unset
        }
    }
}

impl Serialize for Meridiem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Meridiem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(text_of(&value).map(|s| Meridiem::parse(&s)).unwrap_or_default())
    }
}

/// Untrusted structured guess produced by the field extractor.
///
/// Keys the extractor does not know about are kept in `extra` so validation can still look at
/// alternative spellings (`date`, `total`) and the stored payload keeps everything the model said.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionDraft {
    #[serde(rename = "Date", deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "Time", deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(rename = "Time (AM/PM)")]
    pub time_meridiem: Meridiem,
    #[serde(rename = "Bill Type", deserialize_with = "lenient_bill_type", skip_serializing_if = "Option::is_none")]
    pub bill_type: Option<BillType>,
    /// Currency code. The model's value is ignored by normalization.
    #[serde(rename = "Currency Name", deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    #[serde(rename = "Bill Amount", deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub bill_amount: Option<String>,
    #[serde(rename = "Bill Amount (INR)", deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub bill_amount_inr: Option<String>,
    #[serde(rename = "Details", deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExtractionDraft {
    /// Build a draft from arbitrary JSON. Anything that is not an object yields an empty draft.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => serde_json::from_value(Value::Object(map)).unwrap_or_default(),
            _ => Self::default(),
        }
    }

    /// True when the model returned nothing at all (`{}`).
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.time.is_none()
            && self.time_meridiem == Meridiem::Unset
            && self.bill_type.is_none()
            && self.currency_code.is_none()
            && self.bill_amount.is_none()
            && self.bill_amount_inr.is_none()
            && self.details.is_none()
            && self.extra.is_empty()
    }

    /// Text value of a key outside the known fields, e.g. `total`.
    pub fn extra_text(&self, key: &str) -> Option<String> {
        self.extra.get(key).and_then(text_of)
    }
}

/// A draft after deterministic post-processing. Only [`super::normalize`] creates one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedBill(ExtractionDraft);

impl NormalizedBill {
    pub(crate) fn from_normalized(draft: ExtractionDraft) -> Self {
        Self(draft)
    }

    pub fn as_draft(&self) -> &ExtractionDraft {
        &self.0
    }

    pub fn into_draft(self) -> ExtractionDraft {
        self.0
    }

    /// Amount used in reports and totals: the INR amount, else the bill amount, else "0",
    /// with currency symbols and thousands separators removed.
    pub fn reporting_amount(&self) -> String {
        let raw = [self.0.bill_amount_inr.as_deref(), self.0.bill_amount.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .unwrap_or("0");
        clean_amount(raw)
    }
}

impl Deref for NormalizedBill {
    type Target = ExtractionDraft;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Strip the currency symbols and separators that commonly prefix amounts.
pub fn clean_amount(raw: &str) -> String {
    raw.chars().filter(|c| !matches!(c, '₹' | '$' | '€' | ',')).collect::<String>().trim().to_string()
}

/// Text-like JSON values as a string; everything else is unknown.
pub(crate) fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(text_of(&value))
}

fn lenient_bill_type<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<BillType>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(text_of(&value).and_then(|s| s.parse().ok()))
}
