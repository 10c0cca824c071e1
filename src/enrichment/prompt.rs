// Prompt construction for place and brand analysis

use super::sampling::SampledReview;
use crate::model::Review;

pub const PLACE_SYSTEM_PROMPT: &str = "You are an expert business analyst specializing in \
customer feedback analysis. Provide structured, actionable insights from Google Maps reviews.";

pub const AGGREGATE_SYSTEM_PROMPT: &str = "Sei un consulente strategico esperto in brand \
reputation e customer experience. Rispondi sempre in formato JSON valido.";

/// Single-place analysis prompt
pub fn place_prompt(place_name: &str, reviews: &[SampledReview]) -> String {
    let review_texts = reviews
        .iter()
        .enumerate()
        .map(|(i, r)| format!("Review {} ({} stars): {}", i + 1, r.stars, r.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"Analyze the following Google Maps reviews for "{place_name}".

Provide a structured JSON response with:
{{
  "strengths": ["strength 1", "strength 2", ...],
  "weaknesses": ["weakness 1", "weakness 2", ...],
  "priorities": ["top priority 1", "top priority 2", "top priority 3"],
  "recommendations": ["strategic recommendation 1", "strategic recommendation 2", ...],
  "suggestions": ["specific actionable suggestion 1", "specific actionable suggestion 2", ...]
}}

IMPORTANT GUIDELINES:
- Identify 3-5 key strengths mentioned repeatedly in positive reviews
- Identify 3-5 key weaknesses mentioned in negative reviews
- Provide EXACTLY 3 top priorities (most urgent issues to address)
- Give 3-5 strategic recommendations for improvement
- Provide 5-7 concrete, actionable suggestions
- Focus on patterns and recurring themes
- Be specific and data-driven
- Write in Italian if reviews are in Italian, otherwise in English

Reviews ({count} total):

{review_texts}"#,
        count = reviews.len(),
    )
}

/// Brand-level analysis prompt
///
/// Polarity counts are taken over `all_reviews`; only `sample` is quoted.
pub fn aggregate_prompt(
    brand: &str,
    total_places: usize,
    all_reviews: &[Review],
    sample: &[SampledReview],
    sampling_enabled: bool,
) -> String {
    let mode = if sampling_enabled {
        "CAMPIONAMENTO (Presale)"
    } else {
        "ANALISI COMPLETA"
    };
    let places = if total_places > 0 {
        total_places.to_string()
    } else {
        "diverse".to_string()
    };

    let positive_count = all_reviews.iter().filter(|r| r.is_positive()).count();
    let negative_count = all_reviews
        .iter()
        .filter(|r| r.is_negative_or_unrated())
        .count();

    let positive_texts = bullet_list(sample.iter().filter(|r| r.is_positive()))
        .unwrap_or_else(|| "(Nessuna recensione positiva con testo)".to_string());
    let negative_texts = bullet_list(sample.iter().filter(|r| r.is_negative()))
        .unwrap_or_else(|| "(Nessuna recensione negativa con testo)".to_string());

    format!(
        r#"Analizza queste recensioni AGGREGATE di {places} schede Google Maps del brand "{brand}".
MODALITÀ: {mode}

Totale recensioni analizzate: {total}
- Positive (4-5 stelle): {positive_count}
- Negative (1-2 stelle): {negative_count}

CAMPIONE RECENSIONI POSITIVE:
{positive_texts}

CAMPIONE RECENSIONI NEGATIVE:
{negative_texts}

Fornisci un'analisi STRATEGICA a livello BRAND in formato JSON con:
1. "punti_forza": array di 5-8 punti di forza COMUNI a livello brand
2. "punti_debolezza": array di 5-8 punti di debolezza RICORRENTI a livello brand
3. "temi_positivi": array di 3-5 temi/pattern positivi emergenti
4. "temi_negativi": array di 3-5 temi/pattern negativi ricorrenti
5. "suggerimenti_strategici": array di 5-7 azioni strategiche per il brand
6. "priorita": array di 3 priorità assolute da affrontare subito

Concentrati su PATTERN RICORRENTI e INSIGHT STRATEGICI, non su casi singoli.
Rispondi SOLO con JSON valido, senza testo aggiuntivo."#,
        total = all_reviews.len(),
    )
}

fn bullet_list<'a>(reviews: impl Iterator<Item = &'a SampledReview>) -> Option<String> {
    let lines: Vec<String> = reviews.map(|r| format!("- {}", r.text)).collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}
