//! Turns raw completion text into a tagged response. Never fails: anything
//! unusable becomes `ParsedResponse::Malformed` with the original text.

use ridematch_core::attributes::parse_amount_cents;
use ridematch_core::domain::recommendation::{
    bounded_reason, ClarifyingQuestion, Evidence, ItemIdentity, Pick,
};
use serde::Deserialize;
use serde_json::Value;

const LOG_PREFIXES: &[&str] = &["[DEBUG]", "[WARN]", "[ERROR]"];
const FENCE: &str = "```";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedResponse {
    Clarify(ClarifyingQuestion),
    /// Picks in model order; the first is the primary.
    Recommendation { picks: Vec<Pick>, note: Option<String> },
    Malformed { raw_text: String },
}

impl ParsedResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Clarify(_) => "clarify",
            Self::Recommendation { .. } => "recommendation",
            Self::Malformed { .. } => "malformed",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawResponse {
    Clarify {
        question: Option<String>,
    },
    Recommendation {
        primary: Option<RawPick>,
        alternatives: Option<Vec<RawPick>>,
        picks: Option<Vec<RawPick>>,
        note: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct RawPick {
    brand: Option<String>,
    model: Option<String>,
    year: Option<Value>,
    #[serde(alias = "price", alias = "price_usd_estimate")]
    price_est: Option<Value>,
    reason: Option<String>,
    evidence: Option<Value>,
}

pub fn parse_response(raw: &str) -> ParsedResponse {
    let sanitized = sanitize(raw);
    let candidate = sanitized.trim();

    let parsed = serde_json::from_str::<RawResponse>(candidate).ok().or_else(|| {
        first_balanced_object(candidate)
            .and_then(|block| serde_json::from_str::<RawResponse>(block).ok())
    });

    match parsed {
        Some(response) => convert(response, raw),
        None => ParsedResponse::Malformed { raw_text: raw.to_string() },
    }
}

/// Drops log lines and markdown fence markers that some models echo around
/// JSON. Text sharing a line with a fence is kept.
pub fn sanitize(raw: &str) -> String {
    raw.lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !LOG_PREFIXES.iter().any(|prefix| trimmed.starts_with(prefix))
        })
        .map(strip_fence_markers)
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_fence_markers(line: &str) -> &str {
    let trimmed = line.trim();
    let opened = match trimmed.strip_prefix(FENCE) {
        // Skip the info string, e.g. the `json` in ```json.
        Some(rest) => rest.trim_start_matches(|ch: char| ch.is_ascii_alphanumeric()).trim_start(),
        None => trimmed,
    };
    opened.strip_suffix(FENCE).map_or(opened, str::trim_end)
}

fn convert(response: RawResponse, raw: &str) -> ParsedResponse {
    match response {
        RawResponse::Clarify { question } => {
            match question.map(|question| question.trim().to_string()).filter(|q| !q.is_empty()) {
                Some(question) => ParsedResponse::Clarify(ClarifyingQuestion { question }),
                None => ParsedResponse::Malformed { raw_text: raw.to_string() },
            }
        }
        RawResponse::Recommendation { primary, alternatives, picks, note } => {
            let ordered = primary
                .into_iter()
                .chain(alternatives.unwrap_or_default())
                .chain(picks.unwrap_or_default());
            let picks = ordered.filter_map(into_pick).collect();
            let note = note.map(|note| note.trim().to_string()).filter(|note| !note.is_empty());
            ParsedResponse::Recommendation { picks, note }
        }
    }
}

fn into_pick(raw: RawPick) -> Option<Pick> {
    let identity = ItemIdentity {
        brand: raw.brand.unwrap_or_default().trim().to_string(),
        model: raw.model.unwrap_or_default().trim().to_string(),
        year: raw.year.as_ref().and_then(year_value),
    };
    if identity.is_blank() {
        return None;
    }

    let reason = bounded_reason(raw.reason.as_deref().unwrap_or_default())?;
    let evidence = match raw.evidence {
        Some(Value::String(text)) => Evidence::from_model_text(&text),
        Some(Value::Array(items)) => {
            let joined = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .collect::<Vec<_>>()
                .join("; ");
            Evidence::from_model_text(&joined)
        }
        _ => Evidence::NoneInDataset,
    };

    Some(Pick {
        identity,
        price_estimate_cents: raw.price_est.as_ref().and_then(price_value),
        reason,
        evidence,
        evidence_source: None,
    })
}

fn year_value(value: &Value) -> Option<u16> {
    let year = match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    u16::try_from(year).ok().filter(|year| (1900..=2100).contains(year))
}

fn price_value(value: &Value) -> Option<i64> {
    let cents = match value {
        Value::Number(number) => number.as_f64().map(|dollars| (dollars * 100.0).round() as i64),
        Value::String(text) => parse_amount_cents(text),
        _ => None,
    }?;
    (cents > 0).then_some(cents)
}

/// The first `{...}` block with balanced braces, ignoring braces inside JSON
/// strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use ridematch_core::domain::recommendation::Evidence;

    use super::{first_balanced_object, parse_response, ParsedResponse};

    fn recommendation(raw: &str) -> (Vec<ridematch_core::Pick>, Option<String>) {
        match parse_response(raw) {
            ParsedResponse::Recommendation { picks, note } => (picks, note),
            other => panic!("expected recommendation, got {other:?}"),
        }
    }

    #[test]
    fn strict_clarify_shape_parses() {
        let parsed = parse_response(r#"{"type":"clarify","question":"What is your budget?"}"#);
        assert!(matches!(
            parsed,
            ParsedResponse::Clarify(ref question) if question.question == "What is your budget?"
        ));
    }

    #[test]
    fn primary_and_alternatives_keep_model_order() {
        let (picks, note) = recommendation(
            r#"{"type":"recommendation",
                "primary":{"brand":"KTM","model":"890 Adventure","year":2022,"price_est":13499,
                           "reason":"Long-travel WP suspension","evidence":"suspension_notes: WP XPLOR"},
                "alternatives":[{"brand":"Yamaha","model":"Tenere 700","year":"2021",
                                 "price_est":"$10,499","reason":"Plush fork for gravel","evidence":"none"}],
                "note":"Both are tall."}"#,
        );

        assert_eq!(picks.len(), 2);
        assert_eq!(picks[0].identity.brand, "KTM");
        assert_eq!(picks[0].price_estimate_cents, Some(1_349_900));
        assert_eq!(picks[1].identity.year, Some(2021));
        assert_eq!(picks[1].price_estimate_cents, Some(1_049_900));
        assert_eq!(picks[1].evidence, Evidence::NoneInDataset);
        assert_eq!(note.as_deref(), Some("Both are tall."));
    }

    #[test]
    fn legacy_picks_list_is_accepted() {
        let (picks, _) = recommendation(
            r#"{"type":"recommendation","picks":[{"brand":"Honda","model":"Africa Twin","reason":"Soft suspension","evidence":"plush"}]}"#,
        );
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].identity.model, "Africa Twin");
    }

    #[test]
    fn prose_and_fences_around_json_are_recovered() {
        let raw = "[DEBUG] retrieved 5 docs\nSure! Here is my answer:\n```json\n\
                   {\"type\":\"recommendation\",\"primary\":{\"brand\":\"BMW\",\"model\":\"F 900 GS\",\
                   \"reason\":\"Adjustable {firm} damping\",\"evidence\":\"none in dataset\"}}\n```\n\
                   Let me know if you need more.";
        let (picks, _) = recommendation(raw);
        assert_eq!(picks[0].identity.brand, "BMW");
        assert_eq!(picks[0].reason, "Adjustable {firm} damping");
    }

    #[test]
    fn single_line_fenced_json_is_recovered() {
        let parsed = parse_response(r#"```json {"type":"clarify","question":"What budget?"} ```"#);
        assert!(matches!(
            parsed,
            ParsedResponse::Clarify(ref question) if question.question == "What budget?"
        ));

        let (picks, _) = recommendation(
            r#"Here you go: ```{"type":"recommendation","picks":[{"brand":"Honda","model":"Rebel 500","reason":"Low seat","evidence":"none"}]}```"#,
        );
        assert_eq!(picks[0].identity.model, "Rebel 500");
    }

    #[test]
    fn non_json_prose_is_malformed_with_original_text() {
        let raw = "I think you would love the KTM 890, it has great suspension.";
        assert_eq!(parse_response(raw), ParsedResponse::Malformed { raw_text: raw.to_string() });
    }

    #[test]
    fn unknown_discriminator_and_truncated_json_are_malformed() {
        for raw in [
            r#"{"type":"ranking","items":[]}"#,
            r#"{"type":"recommendation","primary":{"brand":"KTM""#,
            r#"{"question":"no discriminator"}"#,
            r#"{"type":"clarify","question":"   "}"#,
            "",
        ] {
            assert_eq!(parse_response(raw).kind(), "malformed", "raw: {raw:?}");
        }
    }

    #[test]
    fn picks_without_reason_or_identity_are_dropped_and_reasons_bounded() {
        let (picks, _) = recommendation(
            r#"{"type":"recommendation","picks":[
                {"brand":"Suzuki","model":"V-Strom 650","reason":""},
                {"brand":"","model":"","reason":"Great bike"},
                {"brand":"Triumph","model":"Tiger 900","reason":"one two three four five six seven eight nine ten eleven twelve thirteen"}
            ]}"#,
        );
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].reason.split_whitespace().count(), 12);
        assert_eq!(picks[0].price_estimate_cents, None);
    }

    #[test]
    fn balanced_block_ignores_braces_in_strings() {
        let text = r#"noise {"a":"}{","b":{"c":1}} trailing }"#;
        assert_eq!(first_balanced_object(text), Some(r#"{"a":"}{","b":{"c":1}}"#));
        assert_eq!(first_balanced_object("no braces"), None);
    }
}
