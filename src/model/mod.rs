//! Canonical data model
//!
//! Places and reviews are rebuilt from raw job output on every run. Analysis
//! results are attached in place once enrichment succeeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One item of an external job's result set
///
/// The schema is not uniform across providers: the same logical field may
/// sit under several alternate keys, and some records nest a review list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Map<String, Value>);

impl RawRecord {
    /// First present, non-null, non-empty string among `keys`.
    /// Numbers are rendered to strings so numeric ids still resolve.
    pub fn first_str(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| match self.0.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    /// First present, non-null, non-zero number among `keys`
    /// (numeric strings are accepted)
    pub fn first_number(&self, keys: &[&str]) -> Option<f64> {
        keys.iter().find_map(|key| {
            let value = match self.0.get(*key) {
                Some(Value::Number(n)) => n.as_f64(),
                Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
                _ => None,
            }?;
            (value.is_finite() && value != 0.0).then_some(value)
        })
    }

    /// Review sub-records when this record nests a review list
    pub fn nested_reviews(&self) -> Option<Vec<RawRecord>> {
        match self.0.get("reviews") {
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Object(map) => Some(RawRecord(map.clone())),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => RawRecord(map),
            _ => RawRecord::default(),
        }
    }
}

/// Kind of external batch job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Listing search
    Discovery,
    /// Review scrape for selected listings
    Scrape,
}

impl JobKind {
    /// Noun used in provider failure messages
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::Discovery => "search",
            JobKind::Scrape => "scrape",
        }
    }
}

/// A started external job, owned for one polling cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
    pub kind: JobKind,
    pub started_at: DateTime<Utc>,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>, kind: JobKind) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
            started_at: Utc::now(),
        }
    }
}

/// A business listing with its reviews
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    /// Unique within one run: explicit id, else URL, else title, else "unknown"
    pub place_id: String,
    pub title: String,
    pub address: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    /// URL as pasted by the user in explicit-URL mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    pub rating: f64,
    pub total_reviews: u64,
    pub reviews: Vec<Review>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
}

impl Place {
    /// URL handed to the review scrape job for this place
    pub fn scrape_url(&self) -> String {
        if !self.url.is_empty() {
            return self.url.clone();
        }
        match &self.original_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!(
                "https://www.google.com/maps/place/?q=place_id:{}",
                self.place_id
            ),
        }
    }
}

/// A single customer review
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub text: String,
    /// 1-5, or 0 when unrated
    pub stars: u8,
    pub published_at_date: String,
    pub author_name: String,
    pub author_url: String,
    pub likes_count: u64,
    pub response_from_owner: Option<String>,
}

impl Review {
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    pub fn has_owner_response(&self) -> bool {
        self.response_from_owner
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
    }

    pub fn is_positive(&self) -> bool {
        self.stars >= 4
    }

    /// Includes unrated reviews, matching the sampling filter
    pub fn is_negative_or_unrated(&self) -> bool {
        self.stars <= 2
    }
}

/// Structured analysis produced by the text analysis service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default, alias = "punti_forza")]
    pub strengths: Vec<String>,
    #[serde(default, alias = "punti_debolezza")]
    pub weaknesses: Vec<String>,
    /// Three entries expected, not enforced
    #[serde(default, alias = "priorita")]
    pub priorities: Vec<String>,
    #[serde(default, alias = "suggerimenti_strategici")]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default, alias = "temi_positivi", skip_serializing_if = "Vec::is_empty")]
    pub positive_themes: Vec<String>,
    #[serde(default, alias = "temi_negativi", skip_serializing_if = "Vec::is_empty")]
    pub negative_themes: Vec<String>,
}

impl AnalysisResult {
    /// Returned without calling the service when no review carries text
    pub fn insufficient_data() -> Self {
        Self {
            strengths: vec!["Insufficient review data".to_string()],
            weaknesses: vec!["No text reviews available for analysis".to_string()],
            priorities: vec!["Encourage customers to leave detailed reviews".to_string()],
            recommendations: vec!["Focus on improving review quantity and quality".to_string()],
            suggestions: vec!["Implement review request campaigns".to_string()],
            positive_themes: Vec::new(),
            negative_themes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.strengths.is_empty()
            && self.weaknesses.is_empty()
            && self.priorities.is_empty()
            && self.recommendations.is_empty()
            && self.suggestions.is_empty()
    }
}

/// Review counts by polarity with rounded percentages of all reviews
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sentiment {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
    pub positive_percent: u32,
    pub neutral_percent: u32,
    pub negative_percent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCount {
    pub word: String,
    pub count: usize,
}

/// Brand-level analysis slot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiStats {
    pub analysis: AnalysisResult,
}

/// Statistics over the full place set, recomputed rather than updated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub total_places: usize,
    pub total_reviews: usize,
    pub reviews_with_text: usize,
    pub reviews_with_response: usize,
    pub avg_rating: f64,
    /// Star value (1-5) to count
    pub distribution: BTreeMap<u8, usize>,
    pub sentiment: Sentiment,
    pub top_keywords: Vec<KeywordCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_stats: Option<AiStats>,
}

/// How the run was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Brand,
    Url,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Brand => "brand",
            SearchMode::Url => "url",
        }
    }
}

/// Final artifact handed to rendering, export and history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunArtifact {
    pub run_id: Uuid,
    pub mode: SearchMode,
    /// Brand name in brand mode
    pub query: Option<String>,
    pub ai_enabled: bool,
    pub completed_at: DateTime<Utc>,
    pub places: Vec<Place>,
    pub aggregate_stats: AggregateStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_record_fallback_keys() {
        let record = RawRecord::from(serde_json::json!({
            "totalScore": null,
            "rating": 4.5,
            "title": "",
            "name": "Cafe A",
            "stars": "4",
            "likes": 0
        }));
        assert_eq!(record.first_number(&["totalScore", "rating"]), Some(4.5));
        assert_eq!(record.first_str(&["title", "name"]), Some("Cafe A".to_string()));
        assert_eq!(record.first_number(&["stars"]), Some(4.0));
        assert_eq!(record.first_number(&["likesCount", "likes"]), None);
        assert!(record.nested_reviews().is_none());
    }

    #[test]
    fn test_scrape_url_fallbacks() {
        let mut place = Place {
            place_id: "ChIJabc".to_string(),
            ..Default::default()
        };
        assert_eq!(
            place.scrape_url(),
            "https://www.google.com/maps/place/?q=place_id:ChIJabc"
        );

        place.original_url = Some("https://maps.app.goo.gl/xyz".to_string());
        assert_eq!(place.scrape_url(), "https://maps.app.goo.gl/xyz");

        place.url = "https://www.google.com/maps/place/Cafe".to_string();
        assert_eq!(place.scrape_url(), "https://www.google.com/maps/place/Cafe");
    }

    #[test]
    fn test_analysis_accepts_italian_keys() {
        let json = r#"{
            "punti_forza": ["Servizio rapido"],
            "punti_debolezza": ["Prezzi alti"],
            "temi_positivi": ["Cortesia"],
            "temi_negativi": [],
            "suggerimenti_strategici": ["Formazione staff"],
            "priorita": ["Prezzi", "Attese", "Pulizia"]
        }"#;
        let analysis: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(analysis.strengths, vec!["Servizio rapido"]);
        assert_eq!(analysis.priorities.len(), 3);
        assert_eq!(analysis.recommendations, vec!["Formazione staff"]);
        assert_eq!(analysis.positive_themes, vec!["Cortesia"]);
        assert!(analysis.suggestions.is_empty());
    }

    #[test]
    fn test_owner_response_whitespace() {
        let mut review = Review {
            response_from_owner: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(!review.has_owner_response());
        review.response_from_owner = Some("Grazie!".to_string());
        assert!(review.has_owner_response());
    }
}
