//! Aggregate statistics over normalized places
//!
//! Everything here is a pure function of the place set and is recomputed
//! whenever the review set changes.

mod keywords;

pub use keywords::{extract_top_keywords, MAX_KEYWORDS, MIN_WORD_LEN};

use crate::model::{AggregateStats, KeywordCount, Place, Review, Sentiment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Review-level statistics for a single place
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceStats {
    pub total_reviews: usize,
    pub reviews_with_text: usize,
    pub reviews_with_response: usize,
    pub avg_rating: f64,
    pub distribution: BTreeMap<u8, usize>,
    pub sentiment: Sentiment,
    pub top_keywords: Vec<KeywordCount>,
}

/// Running counts over a review set
#[derive(Debug, Default)]
struct Tally {
    total: usize,
    with_text: usize,
    with_response: usize,
    star_sum: u64,
    distribution: [usize; 5],
}

impl Tally {
    fn over<'a>(reviews: impl IntoIterator<Item = &'a Review>) -> Self {
        let mut tally = Self::default();
        for review in reviews {
            tally.total += 1;
            tally.star_sum += review.stars as u64;
            if review.has_text() {
                tally.with_text += 1;
            }
            if review.has_owner_response() {
                tally.with_response += 1;
            }
            // Unrated reviews count toward the total only
            if (1..=5).contains(&review.stars) {
                tally.distribution[(review.stars - 1) as usize] += 1;
            }
        }
        tally
    }

    /// Mean over all reviews, unrated included, rounded to one decimal
    fn avg_rating(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let mean = self.star_sum as f64 / self.total as f64;
        (mean * 10.0).round() / 10.0
    }

    fn distribution(&self) -> BTreeMap<u8, usize> {
        (1..=5u8)
            .map(|stars| (stars, self.distribution[(stars - 1) as usize]))
            .collect()
    }

    fn sentiment(&self) -> Sentiment {
        let [one, two, three, four, five] = self.distribution;
        let positive = four + five;
        let neutral = three;
        let negative = one + two;

        Sentiment {
            positive,
            neutral,
            negative,
            positive_percent: percent(positive, self.total),
            neutral_percent: percent(neutral, self.total),
            negative_percent: percent(negative, self.total),
        }
    }
}

/// Rounded share of `total`; 0 when there is nothing to share
fn percent(count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (count as f64 / total as f64 * 100.0).round() as u32
}

/// Statistics over the full place set
///
/// `ai_stats` is left empty; the brand-level analysis is attached by the
/// caller once enrichment finishes.
pub fn compute_stats(places: &[Place]) -> AggregateStats {
    let reviews = places.iter().flat_map(|p| p.reviews.iter());
    let tally = Tally::over(reviews.clone());

    let top_keywords = text_keywords(reviews);

    AggregateStats {
        total_places: places.len(),
        total_reviews: tally.total,
        reviews_with_text: tally.with_text,
        reviews_with_response: tally.with_response,
        avg_rating: tally.avg_rating(),
        distribution: tally.distribution(),
        sentiment: tally.sentiment(),
        top_keywords,
        ai_stats: None,
    }
}

fn text_keywords<'a>(reviews: impl IntoIterator<Item = &'a Review>) -> Vec<KeywordCount> {
    extract_top_keywords(
        reviews
            .into_iter()
            .filter(|r| r.has_text())
            .map(|r| r.text.as_str()),
    )
}

/// Statistics for one place, same rules as [`compute_stats`]
pub fn compute_place_stats(place: &Place) -> PlaceStats {
    let tally = Tally::over(&place.reviews);
    PlaceStats {
        total_reviews: tally.total,
        reviews_with_text: tally.with_text,
        reviews_with_response: tally.with_response,
        avg_rating: tally.avg_rating(),
        distribution: tally.distribution(),
        sentiment: tally.sentiment(),
        top_keywords: text_keywords(&place.reviews),
    }
}
