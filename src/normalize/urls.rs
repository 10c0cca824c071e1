// Explicit-URL mode: pasted Google Maps links to places without a search job

use crate::error::{Result, ScopeError};
use crate::model::Place;
use ahash::AHashSet;
use regex::Regex;
use tracing::{debug, warn};
use url::form_urlencoded;

const UNKNOWN_TITLE: &str = "Unknown Location";

/// Compiled place URL patterns, tried in order
pub struct PlaceUrlParser {
    query_place_id: Regex,
    place_id: Regex,
    data_place_id: Regex,
    bare_place_id: Regex,
    place_name: Regex,
}

impl PlaceUrlParser {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                ScopeError::Config(format!("Invalid place URL pattern '{}': {}", pattern, e))
            })
        };

        Ok(Self {
            query_place_id: compile(r"query_place_id=([a-zA-Z0-9_-]+)")?,
            place_id: compile(r"place_id[=:]([a-zA-Z0-9_-]+)")?,
            data_place_id: compile(r"/place/([^/]+)/.*!1s([a-zA-Z0-9_-]+)")?,
            bare_place_id: compile(r"^(ChIJ[a-zA-Z0-9_-]+)$")?,
            place_name: compile(r"/place/([^/?]+)")?,
        })
    }

    /// Parse one pasted line; `None` when neither an id nor a name is found
    pub fn parse(&self, line: &str) -> Option<Place> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let capture = |re: &Regex, group: usize| {
            re.captures(trimmed)
                .and_then(|caps| caps.get(group))
                .map(|m| m.as_str().to_string())
        };

        let mut title = UNKNOWN_TITLE.to_string();
        let mut place_id = capture(&self.query_place_id, 1).or_else(|| capture(&self.place_id, 1));

        if place_id.is_none() {
            if let Some(caps) = self.data_place_id.captures(trimmed) {
                place_id = caps.get(2).map(|m| m.as_str().to_string());
                if let Some(name) = caps.get(1) {
                    title = decode_component(name.as_str());
                }
            }
        }

        if place_id.is_none() {
            place_id = capture(&self.bare_place_id, 1);
        }

        if place_id.is_none() {
            if let Some(name) = capture(&self.place_name, 1) {
                title = decode_component(&name);
            }
        }

        let (place_id, url) = match place_id {
            Some(id) => {
                let url = format!(
                    "https://www.google.com/maps/search/?api=1&query=Google&query_place_id={}",
                    id
                );
                (id, url)
            }
            None if title != UNKNOWN_TITLE => {
                let encoded: String = form_urlencoded::byte_serialize(title.as_bytes()).collect();
                let url = format!("https://www.google.com/maps/search/?api=1&query={}", encoded);
                (format!("search:{}", title), url)
            }
            None => return None,
        };

        Some(Place {
            place_id,
            title,
            url,
            original_url: Some(trimmed.to_string()),
            ..Default::default()
        })
    }
}

/// Percent-decode a URL path segment, treating `+` as a space
fn decode_component(segment: &str) -> String {
    // Escape pair separators so the whole segment decodes as a single key
    let escaped = segment.replace('&', "%26").replace('=', "%3D");
    form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

/// Turn pasted URLs (one per line) into places, skipping unparsable lines
///
/// A place pasted more than once is kept at its first position only. Fails
/// with a validation error when the input is empty or no line parses.
pub fn parse_place_urls<S: AsRef<str>>(lines: &[S]) -> Result<Vec<Place>> {
    let lines: Vec<&str> = lines
        .iter()
        .map(|l| l.as_ref().trim())
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return Err(ScopeError::Validation("No URLs provided".to_string()));
    }

    let parser = PlaceUrlParser::new()?;
    let mut places = Vec::with_capacity(lines.len());
    let mut seen = AHashSet::with_capacity(lines.len());
    for line in &lines {
        match parser.parse(line) {
            Some(place) if seen.insert(place.place_id.clone()) => places.push(place),
            Some(place) => debug!(place_id = %place.place_id, "Skipping repeated place: {}", line),
            None => warn!("Could not parse URL: {}", line),
        }
    }

    debug!(
        parsed = places.len(),
        total = lines.len(),
        "Parsed place URLs"
    );

    if places.is_empty() {
        return Err(ScopeError::Validation(format!(
            "None of the {} URLs could be parsed",
            lines.len()
        )));
    }
    Ok(places)
}
