//! Attribute extraction over free review or message text.
//!
//! The same keyword tables drive three consumers: document enrichment (index
//! time and query time), the fallback retrieval query, and the constraint
//! validator's prioritized-attribute check. Everything here is a pure function
//! of its input.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

pub const META_PRICE: &str = "price_usd_estimate";
pub const META_ENGINE_CC: &str = "engine_cc";
pub const META_CATEGORY_TAGS: &str = "category_tags";

/// Bytes of context kept on each side of a keyword hit when capturing a note.
pub const NOTE_RADIUS: usize = 48;

const SUSPENSION_KEYWORDS: &[&str] = &[
    "suspension",
    "long-travel",
    "long travel",
    "travel",
    "damping",
    "firm",
    "plush",
    "soft",
    "wp",
    "showa",
    "fork",
    "shock",
];

const ENGINE_KEYWORDS: &[&str] =
    &["engine", "cc", "displacement", "cylinder", "twin", "torque", "horsepower", "hp"];

const RIDE_STYLE_KEYWORDS: &[&str] = &[
    "adventure",
    "touring",
    "cruiser",
    "sport",
    "offroad",
    "off-road",
    "dual-sport",
    "enduro",
    "supermoto",
    "comfort",
];

const RIDE_CATEGORIES: &[(&str, &str)] = &[
    ("adventure", "adventure"),
    ("touring", "touring"),
    ("cruiser", "cruiser"),
    ("dual-sport", "dual-sport"),
    ("sport", "sport"),
    ("offroad", "offroad"),
    ("off-road", "offroad"),
    ("enduro", "enduro"),
    ("supermoto", "supermoto"),
];

const TYPO_CORRECTIONS: &[(&str, &str)] = &[
    ("suspention", "suspension"),
    ("longtravel", "long-travel"),
    ("travle", "travel"),
    ("dampning", "damping"),
];

const MEASUREMENT_UNITS: &[&str] =
    &["cc", "hp", "bhp", "ps", "nm", "rpm", "mm", "km", "kph", "mph", "mi", "miles", "kg", "lb", "lbs"];
const CURRENCY_WORDS: &[&str] = &["dollar", "dollars", "usd", "bucks"];
const LISTING_CONTEXT: &[&str] = &[
    "price", "priced", "msrp", "cost", "costs", "paid", "bought", "asking", "around", "about",
];
const BUDGET_WORDS: &[&str] =
    &["budget", "under", "below", "max", "maximum", "cap", "spend", "afford", "than"];
const APPROXIMATE_WORDS: &[&str] = &["around", "about", "roughly"];
/// How many words before an amount are searched for context words.
const CONTEXT_WINDOW: usize = 3;

const NUMBER_PATTERN: &str = r"[0-9]{1,3}(?:,[0-9]{3})+(?:\.[0-9]+)?|[0-9]+(?:\.[0-9]+)?";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedAttribute {
    Suspension,
    Engine,
    RideStyle,
}

impl TrackedAttribute {
    pub const ALL: [Self; 3] = [Self::Suspension, Self::Engine, Self::RideStyle];

    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Suspension => SUSPENSION_KEYWORDS,
            Self::Engine => ENGINE_KEYWORDS,
            Self::RideStyle => RIDE_STYLE_KEYWORDS,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Suspension => "suspension",
            Self::Engine => "engine",
            Self::RideStyle => "ride style",
        }
    }

    pub fn metadata_key(self) -> &'static str {
        match self {
            Self::Suspension => "suspension_notes",
            Self::Engine => "engine_notes",
            Self::RideStyle => "ride_style_notes",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredAttributes {
    pub price_estimate_cents: Option<i64>,
    pub engine_cc: Option<u32>,
    pub notes: BTreeMap<TrackedAttribute, String>,
    pub category_tags: BTreeSet<String>,
}

impl StructuredAttributes {
    pub fn note(&self, attribute: TrackedAttribute) -> Option<&str> {
        self.notes.get(&attribute).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.price_estimate_cents.is_none()
            && self.engine_cc.is_none()
            && self.notes.is_empty()
            && self.category_tags.is_empty()
    }

    pub fn to_metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        if let Some(cents) = self.price_estimate_cents {
            metadata.insert(META_PRICE.to_string(), cents_to_dollar_string(cents));
        }
        if let Some(engine_cc) = self.engine_cc {
            metadata.insert(META_ENGINE_CC.to_string(), engine_cc.to_string());
        }
        for (attribute, note) in &self.notes {
            metadata.insert(attribute.metadata_key().to_string(), note.clone());
        }
        if !self.category_tags.is_empty() {
            let tags = self.category_tags.iter().cloned().collect::<Vec<_>>().join(",");
            metadata.insert(META_CATEGORY_TAGS.to_string(), tags);
        }
        metadata
    }

    /// Reads extractor keys back from document metadata. Notes that fail the
    /// keyword traceability check are ignored rather than trusted.
    pub fn from_metadata(metadata: &BTreeMap<String, String>) -> Self {
        let value = |key: &str| metadata.get(key).map(|raw| raw.trim()).filter(|raw| !raw.is_empty());

        let notes = TrackedAttribute::ALL
            .into_iter()
            .filter_map(|attribute| {
                value(attribute.metadata_key())
                    .filter(|note| mentions_attribute(note, attribute))
                    .map(|note| (attribute, note.to_string()))
            })
            .collect();

        Self {
            price_estimate_cents: value(META_PRICE).and_then(parse_amount_cents),
            engine_cc: value(META_ENGINE_CC).and_then(|raw| raw.parse::<u32>().ok()),
            notes,
            category_tags: value(META_CATEGORY_TAGS)
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|tag| !tag.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Adds every extracted key missing from `metadata`; existing values win.
    pub fn fill_metadata(&self, metadata: &mut BTreeMap<String, String>) -> usize {
        let mut added = 0;
        for (key, value) in self.to_metadata() {
            if metadata.get(&key).map(|existing| existing.trim().is_empty()).unwrap_or(true) {
                metadata.insert(key, value);
                added += 1;
            }
        }
        added
    }
}

#[derive(Clone, Debug, Default)]
pub struct AttributeExtractor;

impl AttributeExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str) -> StructuredAttributes {
        if text.trim().is_empty() {
            return StructuredAttributes::default();
        }

        let corrected = correct_typos(text);
        let lowered = corrected.to_ascii_lowercase();

        let mut notes = BTreeMap::new();
        for attribute in TrackedAttribute::ALL {
            if let Some(hit) = first_keyword_hit(&lowered, attribute.keywords()) {
                let note = capture_note(&corrected, hit.start, hit.keyword.len());
                if !note.is_empty() {
                    notes.insert(attribute, note);
                }
            }
        }

        StructuredAttributes {
            price_estimate_cents: extract_price_cents(&lowered),
            engine_cc: extract_engine_cc(&lowered),
            notes,
            category_tags: extract_category_tags(&lowered),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeywordHit {
    pub keyword: &'static str,
    pub start: usize,
}

/// Does `text` contain any keyword of `attribute` on word boundaries?
pub fn mentions_attribute(text: &str, attribute: TrackedAttribute) -> bool {
    let lowered = correct_typos(text).to_ascii_lowercase();
    attribute
        .keywords()
        .iter()
        .any(|keyword| keyword_occurrences(&lowered, keyword).next().is_some())
}

/// The attribute whose keyword appears latest in `message`, i.e. the one the
/// user emphasized most recently.
pub fn prioritized_attribute(message: &str) -> Option<TrackedAttribute> {
    let lowered = correct_typos(message).to_ascii_lowercase();
    TrackedAttribute::ALL
        .into_iter()
        .filter_map(|attribute| {
            attribute
                .keywords()
                .iter()
                .filter_map(|keyword| keyword_occurrences(&lowered, keyword).last())
                .max()
                .map(|position| (position, attribute))
        })
        .max_by_key(|(position, _)| *position)
        .map(|(_, attribute)| attribute)
}

/// Every tracked keyword present in `text`, grouped by attribute in table order.
pub fn matched_keywords(text: &str) -> Vec<&'static str> {
    let lowered = correct_typos(text).to_ascii_lowercase();
    TrackedAttribute::ALL
        .into_iter()
        .flat_map(|attribute| attribute.keywords().iter().copied())
        .filter(|keyword| keyword_occurrences(&lowered, keyword).next().is_some())
        .collect()
}

/// Budget stated in a user message: `$8,000`, `8k`, or a bare amount with
/// budget context (`under 8000`) or a currency word (`8000 dollars`). When a
/// message states several, the last one introduced by a budget word wins,
/// otherwise the last one stated.
pub fn extract_budget_cents(message: &str) -> Option<i64> {
    let lowered = message.to_ascii_lowercase();
    let accepted = amount_matches(&lowered)
        .into_iter()
        .filter(|amount| accepts_amount(AmountPolicy::Budget, amount, &lowered))
        .collect::<Vec<_>>();

    accepted
        .iter()
        .rev()
        .find(|amount| preceded_by(&lowered, amount.start, BUDGET_WORDS))
        .or_else(|| accepted.last())
        .map(|amount| amount.cents)
}

/// Listing price found in free text; the first acceptable amount wins.
pub fn extract_price_cents(text: &str) -> Option<i64> {
    let lowered = text.to_ascii_lowercase();
    amount_matches(&lowered)
        .into_iter()
        .find(|amount| accepts_amount(AmountPolicy::Listing, amount, &lowered))
        .map(|amount| amount.cents)
}

/// Parses a single amount such as `12000`, `$12,000`, `12k` or `8999.50`.
pub fn parse_amount_cents(raw: &str) -> Option<i64> {
    let lowered = raw.trim().to_ascii_lowercase();
    let captures = single_amount_regex()?.captures(&lowered)?;
    amount_value(
        captures.name("number")?.as_str(),
        captures.name("dollar").is_some(),
        captures.name("thousands").is_some(),
    )
    .map(|(cents, _)| cents)
}

/// Fixes common misspellings of tracked keywords in any letter case. The fix
/// follows the case shape of the misspelling.
pub fn correct_typos(text: &str) -> String {
    let Some(typos) = typo_regex() else {
        return text.to_string();
    };
    typos
        .replace_all(text, |captures: &Captures<'_>| {
            let found = &captures[0];
            let lowered = found.to_ascii_lowercase();
            match TYPO_CORRECTIONS.iter().find(|(typo, _)| *typo == lowered) {
                Some((_, fix)) => match_case(found, fix),
                None => found.to_string(),
            }
        })
        .into_owned()
}

fn match_case(found: &str, fix: &str) -> String {
    if !found.chars().any(|ch| ch.is_ascii_lowercase()) {
        fix.to_ascii_uppercase()
    } else if found.starts_with(|ch: char| ch.is_ascii_uppercase()) {
        capitalize(fix)
    } else {
        fix.to_string()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn compiled(
    cell: &'static OnceLock<Option<Regex>>,
    pattern: impl FnOnce() -> String,
) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(&pattern()).ok()).as_ref()
}

/// An amount with an optional `$`, thousands suffix and the word after it.
fn amount_regex() -> Option<&'static Regex> {
    static AMOUNT: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&AMOUNT, || {
        format!(
            r"(?P<dollar>\$)?\s*\b(?P<number>{NUMBER_PATTERN})(?P<thousands>k)?\b(?:[\s-]*(?P<next>[a-z]+))?"
        )
    })
}

fn single_amount_regex() -> Option<&'static Regex> {
    static SINGLE: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&SINGLE, || {
        format!(r"^(?P<dollar>\$)?\s*(?P<number>{NUMBER_PATTERN})(?P<thousands>k)?$")
    })
}

/// `650cc`, `650 cc` or `650-cc`; digits after a separator (`1,254 cc`) are
/// not a displacement.
fn displacement_regex() -> Option<&'static Regex> {
    static DISPLACEMENT: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&DISPLACEMENT, || r"(?:^|[^0-9,.])(?P<cc>[0-9]{2,4})[\s-]*cc\b".to_string())
}

fn typo_regex() -> Option<&'static Regex> {
    static TYPOS: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(&TYPOS, || {
        let alternation =
            TYPO_CORRECTIONS.iter().map(|(typo, _)| *typo).collect::<Vec<_>>().join("|");
        format!("(?i){alternation}")
    })
}

fn keyword_occurrences<'a>(
    lowered: &'a str,
    keyword: &'a str,
) -> impl Iterator<Item = usize> + 'a {
    lowered.match_indices(keyword).map(|(start, _)| start).filter(move |start| {
        let before = lowered[..*start].chars().next_back();
        let after = lowered[*start + keyword.len()..].chars().next();
        !before.is_some_and(|ch| ch.is_ascii_alphabetic())
            && !after.is_some_and(|ch| ch.is_ascii_alphabetic())
    })
}

fn first_keyword_hit(lowered: &str, keywords: &'static [&'static str]) -> Option<KeywordHit> {
    keywords
        .iter()
        .filter_map(|keyword| {
            keyword_occurrences(lowered, keyword)
                .next()
                .map(|start| KeywordHit { keyword: *keyword, start })
        })
        .min_by(|left, right| {
            left.start.cmp(&right.start).then(right.keyword.len().cmp(&left.keyword.len()))
        })
}

fn capture_note(text: &str, start: usize, len: usize) -> String {
    let end = start + len;

    let mut from = start.saturating_sub(NOTE_RADIUS);
    while !text.is_char_boundary(from) {
        from += 1;
    }
    if from > 0 && !text[..from].ends_with(char::is_whitespace) {
        from = match text[from..start].find(char::is_whitespace) {
            Some(offset) => from + offset,
            None => start,
        };
    }

    let mut to = (end + NOTE_RADIUS).min(text.len());
    while !text.is_char_boundary(to) {
        to -= 1;
    }
    if to < text.len() && !text[to..].starts_with(char::is_whitespace) {
        to = match text[end..to].rfind(char::is_whitespace) {
            Some(offset) => end + offset,
            None => end,
        };
    }

    text[from..to]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|ch: char| matches!(ch, ',' | ';' | ':'))
        .trim()
        .to_string()
}

fn extract_category_tags(lowered: &str) -> BTreeSet<String> {
    RIDE_CATEGORIES
        .iter()
        .filter(|(keyword, _)| keyword_occurrences(lowered, keyword).next().is_some())
        .map(|(_, tag)| (*tag).to_string())
        .collect()
}

fn extract_engine_cc(lowered: &str) -> Option<u32> {
    let captures = displacement_regex()?.captures(lowered)?;
    captures.name("cc")?.as_str().parse::<u32>().ok()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AmountPolicy {
    Listing,
    Budget,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AmountForm {
    Dollar,
    Thousands,
    Bare { integer_digits: usize, year_like: bool },
}

#[derive(Clone, Copy, Debug)]
struct AmountMatch<'a> {
    cents: i64,
    form: AmountForm,
    /// Byte offset of the match in the lowered text.
    start: usize,
    /// Word directly after the amount (`cc`, `miles`, `dollars`).
    next: Option<&'a str>,
}

fn amount_matches(lowered: &str) -> Vec<AmountMatch<'_>> {
    let Some(pattern) = amount_regex() else {
        return Vec::new();
    };
    pattern
        .captures_iter(lowered)
        .filter_map(|captures| {
            let (cents, form) = amount_value(
                captures.name("number")?.as_str(),
                captures.name("dollar").is_some(),
                captures.name("thousands").is_some(),
            )?;
            Some(AmountMatch {
                cents,
                form,
                start: captures.get(0)?.start(),
                next: captures.name("next").map(|next| next.as_str()),
            })
        })
        .collect()
}

fn accepts_amount(policy: AmountPolicy, amount: &AmountMatch<'_>, lowered: &str) -> bool {
    let followed_by_unit = is_one_of(amount.next, MEASUREMENT_UNITS);

    match amount.form {
        AmountForm::Dollar => true,
        AmountForm::Thousands => !followed_by_unit,
        AmountForm::Bare { integer_digits, year_like } => {
            if followed_by_unit || integer_digits < 3 {
                return false;
            }
            if is_one_of(amount.next, CURRENCY_WORDS) {
                return true;
            }
            if year_like {
                return false;
            }
            match policy {
                AmountPolicy::Listing => {
                    integer_digits <= 6 && preceded_by(lowered, amount.start, LISTING_CONTEXT)
                }
                AmountPolicy::Budget => {
                    preceded_by(lowered, amount.start, BUDGET_WORDS)
                        || preceded_by(lowered, amount.start, APPROXIMATE_WORDS)
                }
            }
        }
    }
}

fn is_one_of(word: Option<&str>, words: &[&str]) -> bool {
    word.is_some_and(|word| words.iter().any(|candidate| *candidate == word))
}

/// Does one of `words` appear among the few words before byte offset `start`?
fn preceded_by(lowered: &str, start: usize, words: &[&str]) -> bool {
    lowered
        .get(..start)
        .unwrap_or_default()
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .rev()
        .take(CONTEXT_WINDOW)
        .any(|word| words.iter().any(|candidate| *candidate == word))
}

fn amount_value(number: &str, dollar: bool, thousands: bool) -> Option<(i64, AmountForm)> {
    let digits = number.replace(',', "");
    let amount = digits.parse::<f64>().ok().filter(|amount| amount.is_finite() && *amount > 0.0)?;
    let dollars = if thousands { amount * 1_000.0 } else { amount };
    let cents = (dollars * 100.0).round() as i64;

    let integer_part = digits.split('.').next().unwrap_or_default();
    let form = if thousands {
        AmountForm::Thousands
    } else if dollar {
        AmountForm::Dollar
    } else {
        let year_like = !digits.contains('.')
            && integer_part.len() == 4
            && integer_part.parse::<u16>().is_ok_and(|year| (1900..=2099).contains(&year));
        AmountForm::Bare { integer_digits: integer_part.len(), year_like }
    };

    Some((cents, form))
}

fn cents_to_dollar_string(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let absolute = cents.unsigned_abs();
    match absolute % 100 {
        0 => format!("{sign}{}", absolute / 100),
        remainder => format!("{sign}{}.{remainder:02}", absolute / 100),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        correct_typos, extract_budget_cents, extract_price_cents, matched_keywords,
        mentions_attribute, parse_amount_cents, prioritized_attribute, AttributeExtractor, StructuredAttributes,
        TrackedAttribute,
    };

    fn assert_notes_traceable(attributes: &StructuredAttributes, input: &str) {
        for (attribute, note) in &attributes.notes {
            assert!(!note.is_empty(), "empty note for {attribute:?} from {input:?}");
            assert!(
                mentions_attribute(note, *attribute),
                "note {note:?} for {attribute:?} lacks a keyword (input {input:?})"
            );
        }
    }

    #[test]
    fn price_patterns_are_recognized() {
        let cases = [
            ("Picked it up for $12,000 last spring", Some(1_200_000)),
            ("dealer wants 12k for it", Some(1_200_000)),
            ("msrp 12000 before fees", Some(1_200_000)),
            ("about 9500 dollars out the door", Some(950_000)),
            ("costs $ 8,999.50 with bags", Some(899_950)),
            ("first $7,000 then later $9,000", Some(700_000)),
            ("no numbers here", None),
        ];
        for (text, expected) in cases {
            assert_eq!(extract_price_cents(text), expected, "text: {text}");
        }
    }

    #[test]
    fn price_ignores_years_displacement_and_mileage() {
        assert_eq!(extract_price_cents("2021 model with a 690 cc single"), None);
        assert_eq!(extract_price_cents("only 12k miles on the clock"), None);
        assert_eq!(extract_price_cents("2019 model, 650cc, asking 5500"), Some(550_000));
        assert_eq!(extract_price_cents("a 650-cc single, asking 4,500 dollars"), Some(450_000));
        assert_eq!(extract_price_cents("the Tenere 700 is a great bike"), None);
    }

    #[test]
    fn budget_requires_currency_context() {
        assert_eq!(extract_budget_cents("adventure bike, budget $8000, prioritize suspension"), Some(800_000));
        assert_eq!(extract_budget_cents("keep it under 9000 please"), Some(900_000));
        assert_eq!(extract_budget_cents("around 10k"), Some(1_000_000));
        assert_eq!(extract_budget_cents("I like the KTM 690 a lot"), None);
        assert_eq!(extract_budget_cents("something from 2015 or newer"), None);
    }

    #[test]
    fn latest_budget_in_a_message_wins() {
        assert_eq!(
            extract_budget_cents("my budget was $10,000 but now make it max $8,000"),
            Some(800_000)
        );
        assert_eq!(
            extract_budget_cents("sold my old bike for $3,000, budget $8,000 now"),
            Some(800_000)
        );
        assert_eq!(
            extract_budget_cents("budget $8,000, I sold my old one for $3,000"),
            Some(800_000)
        );
        assert_eq!(extract_budget_cents("somewhere around 9k, maybe 10k"), Some(1_000_000));
    }

    #[test]
    fn suspension_note_is_a_short_window_containing_keyword() {
        let text = "The bike is heavy in town but once you leave the pavement the long-travel WP \
                    suspension soaks up everything. Engine is a smooth parallel twin making good \
                    torque, and it tours comfortably. Price around $13,500.";
        let attributes = AttributeExtractor::new().extract(text);

        let note = attributes.note(TrackedAttribute::Suspension).unwrap_or_default();
        assert!(note.contains("long-travel WP"), "note: {note}");
        assert!(note.len() < text.len());
        assert!(attributes.note(TrackedAttribute::Engine).is_some());
        assert_eq!(attributes.price_estimate_cents, Some(1_350_000));
        assert_notes_traceable(&attributes, text);
    }

    #[test]
    fn missing_keywords_leave_notes_absent() {
        let attributes = AttributeExtractor::new().extract("Lovely paint, great dealer service.");
        assert!(attributes.notes.is_empty());
        assert!(attributes.category_tags.is_empty());
    }

    #[test]
    fn empty_or_whitespace_input_yields_all_absent() {
        let extractor = AttributeExtractor::new();
        assert!(extractor.extract("").is_empty());
        assert!(extractor.extract(" \n\t ").is_empty());
    }

    #[test]
    fn notes_stay_traceable_across_odd_inputs() {
        let long_run = "x".repeat(500);
        let inputs = [
            "suspension",
            "WP",
            "ÜBER plush fork · größer travel ✓ 😀 and firm damping",
            "cc",
            "a 1,301cc V-twin with 160 hp; off-road capable dual-sport",
            "Suspention is great, longtravel and no dampning issues",
            "soft",
            "   touring     comfort   ",
            long_run.as_str(),
            "ééééééééééééééééééééééééééééééé shock ééééééééééééééééééééééééééééé",
        ];
        let extractor = AttributeExtractor::new();
        for input in inputs {
            let attributes = extractor.extract(input);
            assert_notes_traceable(&attributes, input);
        }
    }

    #[test]
    fn extraction_is_idempotent() {
        let text = "Tenere 700: 689cc twin, 210mm fork travel, adventure touring, $10,499";
        let extractor = AttributeExtractor::new();
        assert_eq!(extractor.extract(text), extractor.extract(text));
    }

    #[test]
    fn engine_displacement_and_categories_are_extracted() {
        let attributes = AttributeExtractor::new()
            .extract("A 1,254 cc boxer for touring, also does light off-road and enduro trails; 650 cc");
        assert_eq!(attributes.engine_cc, Some(650));

        let attributes = AttributeExtractor::new().extract("690cc supermoto, light off-road");
        assert_eq!(attributes.engine_cc, Some(690));
        assert!(attributes.category_tags.contains("supermoto"));
        assert!(attributes.category_tags.contains("offroad"));
    }

    #[test]
    fn typos_are_corrected_before_matching() {
        let attributes = AttributeExtractor::new().extract("Great suspention for the price");
        let note = attributes.note(TrackedAttribute::Suspension).unwrap_or_default();
        assert!(note.contains("suspension"), "note: {note}");
    }

    #[test]
    fn typo_correction_ignores_letter_case() {
        assert_eq!(
            correct_typos("SUSPENTION and Dampning, longtravel"),
            "SUSPENSION and Damping, long-travel"
        );
        assert!(mentions_attribute("GREAT SUSPENTION", TrackedAttribute::Suspension));

        let attributes = AttributeExtractor::new().extract("Great SUSPENTION for the price");
        let note = attributes.note(TrackedAttribute::Suspension).unwrap_or_default();
        assert!(note.contains("SUSPENSION"), "note: {note}");
    }

    #[test]
    fn metadata_round_trip_preserves_attributes() {
        let attributes = AttributeExtractor::new()
            .extract("Adventure bike with plush long travel suspension, 799cc triple, $11,200");
        let restored = StructuredAttributes::from_metadata(&attributes.to_metadata());
        assert_eq!(restored, attributes);
    }

    #[test]
    fn fill_metadata_never_overwrites_existing_values() {
        let attributes = AttributeExtractor::new().extract("soft suspension, $9,000");
        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("price_usd_estimate".to_string(), "7000".to_string());

        let added = attributes.fill_metadata(&mut metadata);
        assert_eq!(added, 1);
        assert_eq!(metadata.get("price_usd_estimate").map(String::as_str), Some("7000"));
        assert!(metadata.contains_key("suspension_notes"));
    }

    #[test]
    fn prioritized_attribute_prefers_latest_mention() {
        assert_eq!(
            prioritized_attribute("adventure bike, budget $8000, prioritize suspension"),
            Some(TrackedAttribute::Suspension)
        );
        assert_eq!(
            prioritized_attribute("good suspension but mostly I care about engine torque"),
            Some(TrackedAttribute::Engine)
        );
        assert_eq!(prioritized_attribute("something red"), None);
    }

    #[test]
    fn keyword_matching_respects_word_boundaries() {
        assert!(!mentions_attribute("software update", TrackedAttribute::Suspension));
        assert!(!mentions_attribute("twinkle", TrackedAttribute::Engine));
        assert!(mentions_attribute("a 690cc single", TrackedAttribute::Engine));
        assert_eq!(matched_keywords("long-travel fork"), vec!["long-travel", "travel", "fork"]);
    }

    #[test]
    fn amount_parsing_accepts_common_forms() {
        assert_eq!(parse_amount_cents("12000"), Some(1_200_000));
        assert_eq!(parse_amount_cents("$12,000"), Some(1_200_000));
        assert_eq!(parse_amount_cents("12k"), Some(1_200_000));
        assert_eq!(parse_amount_cents(" $ 8,999.50 "), Some(899_950));
        assert_eq!(parse_amount_cents("12000 miles"), None);
        assert_eq!(parse_amount_cents("about twelve"), None);
    }
}
