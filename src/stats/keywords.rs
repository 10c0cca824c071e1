// Keyword frequency over review text

use crate::model::KeywordCount;
use ahash::{AHashMap, AHashSet};

/// Maximum number of keywords reported
pub const MAX_KEYWORDS: usize = 30;

/// Shortest token counted, in characters
pub const MIN_WORD_LEN: usize = 4;

/// Accented letters kept alongside ASCII word characters
const ACCENTED: &[char] = &['à', 'è', 'é', 'ì', 'ò', 'ù', 'á', 'í', 'ó', 'ú'];

#[rustfmt::skip]
const STOPWORDS: &[&str] = &[
    // Italian articles
    "il", "lo", "la", "i", "gli", "le", "un", "uno", "una", "l",
    // Italian prepositions
    "di", "da", "a", "in", "su", "per", "con", "tra", "fra",
    "al", "allo", "alla", "agli", "alle",
    "del", "dello", "della", "dei", "degli", "delle",
    "dal", "dallo", "dalla", "dai", "dagli", "dalle",
    "nel", "nello", "nella", "nei", "negli", "nelle",
    "sul", "sullo", "sulla", "sui", "sugli", "sulle",
    // Conjunctions, relatives, demonstratives
    "e", "ed", "o", "od", "ma", "però", "anche", "se", "che", "chi", "cui",
    "quale", "quali", "quando", "dove", "come", "perché", "perchè",
    "questo", "questa", "questi", "queste", "quello", "quella", "quelli", "quelle",
    // Personal pronouns
    "io", "tu", "lui", "lei", "noi", "voi", "loro",
    "mi", "ti", "si", "ci", "vi", "ne", "me", "te", "ce", "ve",
    // Quantifiers and adverbs
    "molto", "poco", "più", "meno", "tanto", "troppo", "tutto", "tutti", "tutta", "tutte",
    "ogni", "ciascuno", "alcuni", "alcune", "non", "mai", "sempre", "già", "ancora",
    "solo", "proprio", "quasi", "circa", "davvero", "veramente",
    // Auxiliary and common verbs
    "essere", "avere", "fare", "stare", "andare", "venire", "dovere", "potere", "volere", "sapere",
    "sono", "è", "ho", "ha", "hanno", "era", "erano", "stato", "stati", "stata", "state", "fatto",
    "sia", "siamo", "siano", "abbia", "abbiano",
    // Filler nouns
    "cosa", "cose", "volta", "volte", "modo", "parte", "caso", "momento",
    "punto", "nome", "anno", "anni", "giorno", "giorni", "ora", "ore",
    "stesso", "stessa", "stessi", "stesse",
    // English
    "the", "and", "or", "but", "on", "at", "to", "for", "of", "with",
    "is", "was", "are", "were", "been", "be", "have", "has", "had",
    "do", "does", "did", "will", "would", "should", "could", "can",
    "this", "that", "these", "those", "it", "its", "my", "your", "his", "her", "their", "our",
    "you", "him", "she", "them", "us", "very", "really", "just", "also",
];

/// Top keywords across `texts`
///
/// Tokens appearing once are dropped. Ties keep first-occurrence order.
pub fn extract_top_keywords<'a, I>(texts: I) -> Vec<KeywordCount>
where
    I: IntoIterator<Item = &'a str>,
{
    let stopwords: AHashSet<&str> = STOPWORDS.iter().copied().collect();
    let mut index: AHashMap<String, usize> = AHashMap::new();
    let mut counts: Vec<KeywordCount> = Vec::new();

    for text in texts {
        if text.is_empty() {
            continue;
        }

        let cleaned = clean_text(text);
        for word in cleaned.split_whitespace() {
            if !is_candidate(word, &stopwords) {
                continue;
            }
            match index.get(word) {
                Some(&i) => counts[i].count += 1,
                None => {
                    index.insert(word.to_string(), counts.len());
                    counts.push(KeywordCount {
                        word: word.to_string(),
                        count: 1,
                    });
                }
            }
        }
    }

    counts.retain(|k| k.count > 1);
    // Stable: equal counts stay in first-occurrence order
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(MAX_KEYWORDS);
    counts
}

/// Lowercase and replace everything but word characters, whitespace and
/// the accepted accented letters with spaces
fn clean_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c.is_whitespace() || ACCENTED.contains(&c)
            {
                c
            } else {
                ' '
            }
        })
        .collect()
}

fn is_candidate(word: &str, stopwords: &AHashSet<&str>) -> bool {
    word.chars().count() >= MIN_WORD_LEN
        && !stopwords.contains(word)
        && !word.chars().all(|c| c.is_ascii_digit())
        && !has_char_run(word, 3)
}

/// True when some character repeats `run` or more times consecutively
fn has_char_run(word: &str, run: usize) -> bool {
    let mut prev = None;
    let mut len = 0;
    for c in word.chars() {
        if Some(c) == prev {
            len += 1;
        } else {
            prev = Some(c);
            len = 1;
        }
        if len >= run {
            return true;
        }
    }
    false
}
