use ridematch_core::attributes::{
    parse_amount_cents, AttributeExtractor, TrackedAttribute, META_ENGINE_CC, META_PRICE,
};
use ridematch_core::domain::document::RetrievedDocument;
use ridematch_core::domain::recommendation::{Evidence, Pick};

/// Query-time enrichment: fills extractor keys missing from retrieved
/// documents. Returns the number of metadata entries added.
pub fn enrich_retrieved(
    documents: &mut [RetrievedDocument],
    extractor: &AttributeExtractor,
) -> usize {
    documents
        .iter_mut()
        .map(|document| extractor.extract(&document.raw_text).fill_metadata(&mut document.metadata))
        .sum()
}

/// Grounds each pick in the retrieved document it names. A matched document's
/// price replaces the model's claim; placeholder evidence is replaced by a
/// metadata derivation when one exists.
pub fn ground_picks(
    picks: Vec<Pick>,
    documents: &[RetrievedDocument],
    focus: Option<TrackedAttribute>,
) -> Vec<Pick> {
    picks
        .into_iter()
        .map(|pick| match matching_document(&pick, documents) {
            Some(document) => ground_pick(pick, document, focus),
            None => pick,
        })
        .collect()
}

fn ground_pick(
    mut pick: Pick,
    document: &RetrievedDocument,
    focus: Option<TrackedAttribute>,
) -> Pick {
    if let Some(cents) = document.meta(META_PRICE).and_then(parse_amount_cents) {
        pick.price_estimate_cents = Some(cents);
    }

    if pick.evidence.is_sentinel() {
        if let Some((key, evidence)) = metadata_evidence(document, focus) {
            pick.evidence = Evidence::Quoted(evidence);
            pick.evidence_source = Some(key);
        }
    }
    pick
}

/// With a prioritized attribute only its own metadata may stand in as
/// evidence, so a filled pick still references that attribute.
fn metadata_evidence(
    document: &RetrievedDocument,
    focus: Option<TrackedAttribute>,
) -> Option<(String, String)> {
    let keys = match focus {
        Some(TrackedAttribute::Engine) => {
            vec![TrackedAttribute::Engine.metadata_key(), META_ENGINE_CC]
        }
        Some(attribute) => vec![attribute.metadata_key()],
        None => vec![
            TrackedAttribute::Suspension.metadata_key(),
            META_ENGINE_CC,
            TrackedAttribute::Engine.metadata_key(),
            TrackedAttribute::RideStyle.metadata_key(),
            META_PRICE,
        ],
    };

    keys.into_iter().find_map(|key| {
        document.meta(key).map(|value| {
            let rendered = match key {
                META_ENGINE_CC => format!("{key}: {}cc", value.trim()),
                _ => format!("{key}: {}", value.trim()),
            };
            (key.to_string(), rendered)
        })
    })
}

fn matching_document<'a>(
    pick: &Pick,
    documents: &'a [RetrievedDocument],
) -> Option<&'a RetrievedDocument> {
    let brand = pick.identity.brand.trim().to_lowercase();
    let model = pick.identity.model.trim().to_lowercase();
    if brand.is_empty() && model.is_empty() {
        return None;
    }

    // A blank side of the pick's identity matches on the other side alone.
    let candidates = documents.iter().filter(|document| {
        let identity = document.identity();
        (brand.is_empty() || loosely_equal(&brand, &identity.brand.to_lowercase()))
            && (model.is_empty() || loosely_equal(&model, &identity.model.to_lowercase()))
    });

    let mut first = None;
    for document in candidates {
        if pick.identity.year.is_some() && document.identity().year == pick.identity.year {
            return Some(document);
        }
        first.get_or_insert(document);
    }
    first
}

/// Case-folded substring match in either direction; blanks never match.
fn loosely_equal(left: &str, right: &str) -> bool {
    let (left, right) = (left.trim(), right.trim());
    !left.is_empty() && !right.is_empty() && (left.contains(right) || right.contains(left))
}
