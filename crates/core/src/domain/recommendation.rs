use serde::{Deserialize, Serialize};

pub const NONE_IN_DATASET: &str = "none in dataset";
pub const MAX_REASON_WORDS: usize = 12;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemIdentity {
    pub brand: String,
    pub model: String,
    pub year: Option<u16>,
}

impl ItemIdentity {
    pub fn is_blank(&self) -> bool {
        self.brand.trim().is_empty() && self.model.trim().is_empty()
    }
}

impl std::fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = [self.brand.trim(), self.model.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        match self.year {
            Some(year) => write!(f, "{name} ({year})"),
            None => f.write_str(&name),
        }
    }
}

/// Supporting evidence for a pick: a quote or derivation from document
/// metadata, or the explicit `none in dataset` sentinel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Evidence {
    Quoted(String),
    NoneInDataset,
}

impl Evidence {
    /// Normalizes model-provided evidence; blanks and placeholders become the sentinel.
    pub fn from_model_text(text: &str) -> Self {
        let trimmed = text.trim();
        if is_placeholder_evidence(trimmed) {
            Self::NoneInDataset
        } else {
            Self::Quoted(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Quoted(text) => text,
            Self::NoneInDataset => NONE_IN_DATASET,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::NoneInDataset)
    }
}

impl From<String> for Evidence {
    fn from(value: String) -> Self {
        Self::from_model_text(&value)
    }
}

impl From<Evidence> for String {
    fn from(value: Evidence) -> Self {
        value.as_str().to_string()
    }
}

fn is_placeholder_evidence(text: &str) -> bool {
    matches!(text.to_ascii_lowercase().as_str(), "" | "none" | "none in dataset" | "n/a" | "na")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    pub identity: ItemIdentity,
    pub price_estimate_cents: Option<i64>,
    pub reason: String,
    pub evidence: Evidence,
    pub evidence_source: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifyingQuestion {
    pub question: String,
}

/// Keeps at most `MAX_REASON_WORDS` words; returns `None` for an empty reason.
pub fn bounded_reason(text: &str) -> Option<String> {
    let words = text.split_whitespace().take(MAX_REASON_WORDS).collect::<Vec<_>>();
    (!words.is_empty()).then(|| words.join(" "))
}

/// Formats cents as US dollars with thousands separators, e.g. `$8,999`.
pub fn format_usd(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let absolute = cents.unsigned_abs();
    let dollars = (absolute / 100).to_string();

    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (index, digit) in dollars.chars().enumerate() {
        if index > 0 && (dollars.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    match absolute % 100 {
        0 => format!("{sign}${grouped}"),
        remainder => format!("{sign}${grouped}.{remainder:02}"),
    }
}
