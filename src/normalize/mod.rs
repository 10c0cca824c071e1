//! Result normalization
//!
//! Maps raw job output into canonical [`Place`]s. Scrape output arrives in
//! two shapes that may be mixed in one result set:
//!
//! - flat records, where the record is one review carrying a copy of its
//!   place's metadata
//! - nested records, where a place record carries a `reviews` array
//!
//! Both shapes are parsed by their own function and merged into one place
//! set keyed by [`place_key`]. Flat records are merged first, so their
//! place metadata wins over nested records for the same key.

mod urls;

pub use urls::{parse_place_urls, PlaceUrlParser};

use crate::model::{Place, RawRecord, Review};
use ahash::{AHashMap, AHashSet};
use std::collections::hash_map::Entry;
use tracing::debug;

/// Key used when a record carries no id, URL or title
pub const UNKNOWN_KEY: &str = "unknown";

const UNKNOWN_TITLE: &str = "Unknown Location";
const ANONYMOUS: &str = "Anonymous";

/// Raw record classified by shape
#[derive(Debug)]
pub enum RawShape<'a> {
    Flat(&'a RawRecord),
    Nested {
        parent: &'a RawRecord,
        reviews: Vec<RawRecord>,
    },
}

impl<'a> RawShape<'a> {
    pub fn classify(record: &'a RawRecord) -> Self {
        match record.nested_reviews() {
            Some(reviews) => RawShape::Nested {
                parent: record,
                reviews,
            },
            None => RawShape::Flat(record),
        }
    }
}

/// Derive the place key: explicit id, else URL, else title, else "unknown"
///
/// Two URL-less listings sharing a title collapse into one place.
pub fn place_key(record: &RawRecord) -> String {
    record
        .first_str(&["placeId", "url", "title"])
        .unwrap_or_else(|| UNKNOWN_KEY.to_string())
}

/// A review parsed from a raw record, before its id is resolved
#[derive(Debug, Clone)]
pub struct ReviewDraft {
    pub explicit_id: Option<String>,
    pub review: Review,
}

impl ReviewDraft {
    /// Fully empty reviews (unrated, no text) are discarded
    pub fn is_empty(&self) -> bool {
        self.review.stars == 0 && self.review.text.is_empty()
    }
}

/// Place metadata parsed from a flat review record
///
/// `name` is the reviewer's name in this shape, so only `title` is read.
pub fn parse_flat(record: &RawRecord) -> (Place, ReviewDraft) {
    let place = Place {
        place_id: place_key(record),
        title: record
            .first_str(&["title"])
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        address: record.first_str(&["address"]).unwrap_or_default(),
        url: record.first_str(&["url"]).unwrap_or_default(),
        category: record.first_str(&["categoryName"]).unwrap_or_default(),
        rating: record.first_number(&["totalScore"]).unwrap_or(0.0).max(0.0),
        total_reviews: record.first_number(&["reviewsCount"]).map_or(0, to_count),
        ..Default::default()
    };

    (place, parse_review(record, &["reviewId", "id"]))
}

/// Place metadata and review drafts parsed from a nested place record
pub fn parse_nested(parent: &RawRecord, reviews: &[RawRecord]) -> (Place, Vec<ReviewDraft>) {
    let place = Place {
        place_id: place_key(parent),
        title: parent
            .first_str(&["title", "name"])
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        address: parent.first_str(&["address"]).unwrap_or_default(),
        url: parent.first_str(&["url"]).unwrap_or_default(),
        category: parent.first_str(&["categoryName"]).unwrap_or_default(),
        rating: parent
            .first_number(&["totalScore", "rating"])
            .unwrap_or(0.0)
            .max(0.0),
        total_reviews: parent
            .first_number(&["reviewsCount"])
            .map_or(reviews.len() as u64, to_count),
        ..Default::default()
    };

    let drafts = reviews
        .iter()
        .map(|review| parse_review(review, &["reviewId"]))
        .collect();

    (place, drafts)
}

fn parse_review(record: &RawRecord, id_keys: &[&str]) -> ReviewDraft {
    let review = Review {
        id: String::new(),
        text: record
            .first_str(&["text", "reviewText"])
            .unwrap_or_default(),
        stars: record.first_number(&["stars", "rating"]).map_or(0, to_stars),
        published_at_date: record
            .first_str(&["publishedAtDate", "publishAt"])
            .unwrap_or_default(),
        author_name: record
            .first_str(&["name", "reviewerName"])
            .unwrap_or_else(|| ANONYMOUS.to_string()),
        author_url: record
            .first_str(&["reviewUrl", "reviewerUrl"])
            .unwrap_or_default(),
        likes_count: record
            .first_number(&["likesCount", "likes"])
            .map_or(0, to_count),
        response_from_owner: record.first_str(&["responseFromOwnerText", "ownerResponse"]),
    };

    ReviewDraft {
        explicit_id: record.first_str(id_keys),
        review,
    }
}

fn to_stars(value: f64) -> u8 {
    value.round().clamp(0.0, 5.0) as u8
}

fn to_count(value: f64) -> u64 {
    value.max(0.0).round() as u64
}

/// Places under construction, keyed by place key
///
/// Output order is fixed by [`PlaceSet::register`] calls, independently of
/// which shape first creates the place.
#[derive(Debug, Default)]
struct PlaceSet {
    order: Vec<String>,
    seen: AHashSet<String>,
    places: AHashMap<String, Place>,
}

impl PlaceSet {
    fn register(&mut self, key: &str) {
        if self.seen.insert(key.to_string()) {
            self.order.push(key.to_string());
        }
    }

    /// Existing place for the key, or `seed` when first seen
    fn merge(&mut self, seed: Place) -> &mut Place {
        match self.places.entry(seed.place_id.clone()) {
            Entry::Vacant(entry) => entry.insert(seed),
            Entry::Occupied(entry) => {
                let place = entry.into_mut();
                if place.title != seed.title && seed.title != UNKNOWN_TITLE {
                    debug!(
                        place_id = %place.place_id,
                        kept = %place.title,
                        ignored = %seed.title,
                        "Records with different titles merged under one place key"
                    );
                }
                place
            }
        }
    }

    fn into_places(mut self) -> Vec<Place> {
        self.order
            .into_iter()
            .filter_map(|key| self.places.remove(&key))
            .collect()
    }
}

fn push_review(place: &mut Place, draft: ReviewDraft) {
    if draft.is_empty() {
        return;
    }
    let mut review = draft.review;
    review.id = draft
        .explicit_id
        .unwrap_or_else(|| format!("{}_{}", place.place_id, place.reviews.len()));
    place.reviews.push(review);
}

/// Normalize a scrape result set into places with reviews
///
/// Produces exactly one place per distinct place key, in first-encounter
/// order. Reviews keep source order within each shape.
pub fn normalize(records: &[RawRecord]) -> Vec<Place> {
    let shapes: Vec<RawShape<'_>> = records.iter().map(RawShape::classify).collect();

    let mut set = PlaceSet::default();
    for record in records {
        set.register(&place_key(record));
    }

    for shape in &shapes {
        if let RawShape::Flat(record) = shape {
            let (seed, draft) = parse_flat(record);
            let place = set.merge(seed);
            push_review(place, draft);
        }
    }

    for shape in &shapes {
        if let RawShape::Nested { parent, reviews } = shape {
            let (seed, drafts) = parse_nested(parent, reviews);
            let place = set.merge(seed);
            for draft in drafts {
                push_review(place, draft);
            }
        }
    }

    let places = set.into_places();
    debug!(
        records = records.len(),
        places = places.len(),
        "Normalized scrape results"
    );
    places
}

/// Normalize listing search output into places without reviews
///
/// Listings without a title are dropped.
pub fn normalize_listings(records: &[RawRecord]) -> Vec<Place> {
    let mut set = PlaceSet::default();
    let mut dropped = 0usize;

    for record in records {
        let Some(title) = record.first_str(&["title", "name"]) else {
            dropped += 1;
            continue;
        };

        let seed = Place {
            place_id: place_key(record),
            title,
            address: record.first_str(&["address", "street"]).unwrap_or_default(),
            url: record.first_str(&["url"]).unwrap_or_default(),
            category: record.first_str(&["categoryName"]).unwrap_or_default(),
            rating: record
                .first_number(&["totalScore", "rating"])
                .unwrap_or(0.0)
                .max(0.0),
            total_reviews: record.first_number(&["reviewsCount"]).map_or(0, to_count),
            ..Default::default()
        };
        set.register(&seed.place_id);
        set.merge(seed);
    }

    if dropped > 0 {
        debug!(dropped, "Dropped listings without a title");
    }
    set.into_places()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: serde_json::Value) -> Vec<RawRecord> {
        match value {
            serde_json::Value::Array(items) => items.into_iter().map(RawRecord::from).collect(),
            _ => panic!("expected an array"),
        }
    }

    #[test]
    fn test_flat_records_merge_by_place_id() {
        let input = records(json!([
            {"placeId": "P1", "title": "Cafe A", "stars": 5, "text": "ottimo"},
            {"placeId": "P1", "title": "Cafe A", "stars": 1, "text": ""}
        ]));
        let places = normalize(&input);

        assert_eq!(places.len(), 1);
        let place = &places[0];
        assert_eq!(place.place_id, "P1");
        assert_eq!(place.title, "Cafe A");
        assert_eq!(place.reviews.len(), 2);
        assert_eq!(place.reviews[0].stars, 5);
        assert_eq!(place.reviews[1].stars, 1);
        assert_eq!(place.reviews[1].id, "P1_1");
        assert_eq!(place.reviews[0].author_name, "Anonymous");
    }

    #[test]
    fn test_empty_reviews_are_discarded() {
        let input = records(json!([
            {"placeId": "P1", "title": "Cafe A", "stars": 0, "text": ""},
            {"placeId": "P1", "title": "Cafe A", "text": "solo testo"},
            {"placeId": "P2", "title": "Cafe B", "reviews": [
                {"stars": 0},
                {"rating": 3}
            ]}
        ]));
        let places = normalize(&input);

        assert_eq!(places.len(), 2);
        assert_eq!(places[0].reviews.len(), 1);
        assert_eq!(places[0].reviews[0].id, "P1_0");
        assert_eq!(places[1].reviews.len(), 1);
        assert_eq!(places[1].reviews[0].stars, 3);
        for place in &places {
            assert!(place
                .reviews
                .iter()
                .all(|r| r.stars > 0 || !r.text.is_empty()));
        }
    }

    #[test]
    fn test_key_fallback_chain() {
        let input = records(json!([
            {"url": "https://maps/a", "title": "A", "stars": 4},
            {"title": "B", "stars": 4},
            {"stars": 2, "text": "meh"}
        ]));
        let places = normalize(&input);

        let keys: Vec<&str> = places.iter().map(|p| p.place_id.as_str()).collect();
        assert_eq!(keys, vec!["https://maps/a", "B", "unknown"]);
        assert_eq!(places[2].title, "Unknown Location");
    }

    #[test]
    fn test_flat_metadata_wins_over_nested() {
        // Nested record first in input, but flat records are merged first
        let input = records(json!([
            {"placeId": "P1", "name": "Nested Title", "rating": 3.9, "reviews": [
                {"reviewId": "n1", "stars": 2, "text": "lento"}
            ]},
            {"placeId": "P2", "title": "Other", "stars": 5},
            {"placeId": "P1", "title": "Flat Title", "totalScore": 4.4, "reviewsCount": 120,
             "reviewId": "f1", "stars": 5, "text": "buono"}
        ]));
        let places = normalize(&input);

        assert_eq!(places.len(), 2);
        // First-encounter order
        assert_eq!(places[0].place_id, "P1");
        assert_eq!(places[1].place_id, "P2");

        let p1 = &places[0];
        assert_eq!(p1.title, "Flat Title");
        assert_eq!(p1.rating, 4.4);
        assert_eq!(p1.total_reviews, 120);
        let ids: Vec<&str> = p1.reviews.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "n1"]);
    }

    #[test]
    fn test_nested_defaults() {
        let input = records(json!([
            {"placeId": "P9", "name": "Trattoria", "rating": 4.1, "reviews": [
                {"stars": 5, "text": "top", "reviewerName": "Gio", "likes": 3,
                 "ownerResponse": "Grazie"},
                {"stars": 4}
            ]}
        ]));
        let places = normalize(&input);
        let place = &places[0];

        assert_eq!(place.title, "Trattoria");
        assert_eq!(place.rating, 4.1);
        assert_eq!(place.total_reviews, 2);
        assert_eq!(place.reviews[0].author_name, "Gio");
        assert_eq!(place.reviews[0].likes_count, 3);
        assert_eq!(place.reviews[0].response_from_owner.as_deref(), Some("Grazie"));
        assert_eq!(place.reviews[1].id, "P9_1");
    }

    #[test]
    fn test_distinct_keys_produce_distinct_places() {
        let input: Vec<RawRecord> = (0..25)
            .map(|i| {
                RawRecord::from(json!({
                    "placeId": format!("P{}", i % 7),
                    "title": "X",
                    "stars": (i % 5) + 1
                }))
            })
            .collect();
        let places = normalize(&input);
        assert_eq!(places.len(), 7);
        assert_eq!(places.iter().map(|p| p.reviews.len()).sum::<usize>(), 25);
    }

    #[test]
    fn test_stars_are_rounded_and_clamped() {
        let input = records(json!([
            {"placeId": "P1", "stars": 4.6},
            {"placeId": "P1", "stars": 9}
        ]));
        let places = normalize(&input);
        assert_eq!(places[0].reviews[0].stars, 5);
        assert_eq!(places[0].reviews[1].stars, 5);
    }

    #[test]
    fn test_normalize_listings() {
        let input = records(json!([
            {"placeId": "A", "title": "Pizzeria Uno", "street": "Via Roma 1",
             "rating": 4.2, "reviewsCount": 88, "categoryName": "Pizza"},
            {"placeId": "B"},
            {"placeId": "A", "title": "Duplicate"},
            {"placeId": "C", "name": "Pizzeria Due", "totalScore": 3.8}
        ]));
        let places = normalize_listings(&input);

        assert_eq!(places.len(), 2);
        assert_eq!(places[0].title, "Pizzeria Uno");
        assert_eq!(places[0].address, "Via Roma 1");
        assert_eq!(places[0].rating, 4.2);
        assert_eq!(places[0].total_reviews, 88);
        assert_eq!(places[0].category, "Pizza");
        assert_eq!(places[1].title, "Pizzeria Due");
        assert!(places.iter().all(|p| p.reviews.is_empty()));
    }
}
