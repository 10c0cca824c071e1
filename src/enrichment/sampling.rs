// Review sampling for analysis requests

use crate::config::EnrichmentConfig;
use crate::model::Review;

/// Bounds on the review text sent to the analysis service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPolicy {
    pub enabled: bool,
    /// Max positive and max negative reviews each
    pub per_polarity: usize,
    /// Max characters per review text
    pub char_limit: usize,
    /// Max text reviews in a single-place request
    pub place_review_limit: usize,
}

impl SamplingPolicy {
    pub fn from_config(config: &EnrichmentConfig) -> Self {
        Self {
            enabled: config.sampling,
            per_polarity: config.sample_per_polarity,
            char_limit: config.sample_char_limit,
            place_review_limit: config.place_review_limit,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Reviews to send, in source order
    ///
    /// Only reviews with text are considered. With sampling on, at most
    /// `per_polarity` positive (4-5 stars) and `per_polarity` negative or
    /// unrated (0-2 stars) reviews are kept, each truncated to `char_limit`
    /// characters. With sampling off every text review is sent as is.
    pub fn select(&self, reviews: &[Review]) -> Vec<SampledReview> {
        let with_text = reviews.iter().filter(|r| r.has_text());

        if !self.enabled {
            return with_text.map(SampledReview::full).collect();
        }

        let (mut positive, mut negative) = (0usize, 0usize);
        with_text
            .filter(|r| {
                if r.is_positive() && positive < self.per_polarity {
                    positive += 1;
                    true
                } else if r.is_negative_or_unrated() && negative < self.per_polarity {
                    negative += 1;
                    true
                } else {
                    false
                }
            })
            .map(|r| SampledReview::truncated(r, self.char_limit))
            .collect()
    }
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            per_polarity: 20,
            char_limit: 200,
            place_review_limit: 50,
        }
    }
}

/// Review text as it will appear in a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledReview {
    pub stars: u8,
    pub text: String,
}

impl SampledReview {
    fn full(review: &Review) -> Self {
        Self {
            stars: review.stars,
            text: review.text.clone(),
        }
    }

    fn truncated(review: &Review, limit: usize) -> Self {
        Self {
            stars: review.stars,
            text: review.text.chars().take(limit).collect(),
        }
    }

    pub fn is_positive(&self) -> bool {
        self.stars >= 4
    }

    pub fn is_negative(&self) -> bool {
        self.stars <= 2
    }
}
