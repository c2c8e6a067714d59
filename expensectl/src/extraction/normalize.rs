//! Deterministic cleanup applied to every draft before validation.
//!
//! The currency code is derived from the leading symbol of the bill amount only; whatever code the
//! model reported is discarded. Travel bills get their details rewritten to `From: X - To: Y`.

use once_cell::sync::Lazy;
use regex::Regex;

use super::draft::{ExtractionDraft, NormalizedBill};

/// Leading currency symbols that are recognised, and the code each maps to.
pub const CURRENCY_SYMBOLS: [(char, &str); 6] = [('$', "USD"), ('₹', "INR"), ('€', "EUR"), ('£', "GBP"), ('¥', "JPY"), ('₩', "KRW")];

static FROM_TO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)from\s*:\s*(.*?)\s*-\s*to\s*:\s*(.*)").expect("from/to pattern is a valid regex"));

/// Currency code for a symbol character, if it is one of [`CURRENCY_SYMBOLS`].
pub fn currency_for_symbol(symbol: char) -> Option<&'static str> {
    CURRENCY_SYMBOLS.iter().find(|(s, _)| *s == symbol).map(|(_, code)| *code)
}

/// Normalize an untrusted draft.
///
/// - `Currency Name` becomes the code of the amount's leading symbol, or `""` when there is none.
/// - `Bill Amount` loses that symbol and surrounding whitespace; without a symbol it is left verbatim.
/// - For flight and cab bills, `Details` matching `from: X - to: Y` (any case) is rewritten to
///   `From: X - To: Y`.
///
/// Everything else passes through unchanged.
pub fn normalize(draft: ExtractionDraft) -> NormalizedBill {
    apply(draft, false)
}

impl NormalizedBill {
    /// Run normalization again over an already normalized bill.
    ///
    /// The amount no longer carries its symbol at this point, so the derived currency code is
    /// kept unless a new leading symbol shows up. Each pass strips one symbol, so a bill whose
    /// amount started with two (`"$$25"`, `"$ ₹500"`) changes again here.
    pub fn renormalize(self) -> NormalizedBill {
        apply(self.into_draft(), true)
    }
}

fn apply(mut draft: ExtractionDraft, keep_code_without_symbol: bool) -> NormalizedBill {
    let symbol = draft
        .bill_amount
        .as_deref()
        .and_then(|amount| amount.chars().next())
        .and_then(|first| currency_for_symbol(first).map(|code| (first, code)));

    match symbol {
        Some((first, code)) => {
            draft.currency_code = Some(code.to_string());
            draft.bill_amount = draft.bill_amount.map(|amount| amount[first.len_utf8()..].trim().to_string());
        }
        None if keep_code_without_symbol => {
            draft.currency_code.get_or_insert_with(String::new);
        }
        None => draft.currency_code = Some(String::new()),
    }

    if draft.bill_type.is_some_and(|t| t.is_travel()) {
        if let Some(details) = draft.details.as_deref() {
            if let Some(route) = canonical_route(details) {
                draft.details = Some(route);
            }
        }
    }

    NormalizedBill::from_normalized(draft)
}

/// `From: X - To: Y` for details that contain a from/to pair, trimming both ends.
pub fn canonical_route(details: &str) -> Option<String> {
    let captures = FROM_TO.captures(details)?;
    let from = captures.get(1).map_or("", |m| m.as_str()).trim();
    let to = captures.get(2).map_or("", |m| m.as_str()).trim();
    Some(format!("From: {from} - To: {to}"))
}
