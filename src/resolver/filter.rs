//! Title heuristics for related-track candidates.
//!
//! Keyword checks work on whole words of a normalised title (lowercase,
//! punctuation folded to spaces), so `mix` does not match `mixtape`.

const STOP_WORDS: &[&str] = &[
    "official", "video", "audio", "lyrics", "lyric", "remix", "cover", "live", "music", "mv", "hd", "hq", "4k",
    "1080p", "720p", "480p", "visualizer", "ft", "feat", "the", "a", "an", "and", "of", "with",
];

const PAD_TERMS: &[&str] = &["music", "song"];
const MAX_TERMS: usize = 4;

const MUSIC_KEYWORDS: &[&str] = &[
    "music", "song", "songs", "official", "audio", "video", "lyrics", "lyric", "album", "single", "track", "feat",
    "ft", "band", "singer", "beats", "lofi", "jazz", "pop", "rock", "hip hop", "rap", "classical", "acoustic",
    "piano", "instrumental", "ballad", "soundtrack", "ost", "edm", "r b", "mv", "melody", "hits", "bossa nova",
    "orchestra", "symphony", "concert", "playlist",
];

const NON_MUSIC_KEYWORDS: &[&str] = &[
    "tutorial", "review", "vlog", "gaming", "gameplay", "reaction", "unboxing", "podcast", "interview", "news",
    "trailer", "how to", "lesson", "challenge", "prank", "documentary", "asmr", "walkthrough", "highlights",
    "explained", "behind the scenes",
];

/// Any word starting with one of these marks a remix or cover ("remixes", "covered").
const REMIX_STEMS: &[&str] = &["remix", "cover", "mashup", "nightcore", "megamix", "karaoke"];

/// Matched as whole words only, so `mixtape` stays clean.
const REMIX_PHRASES: &[&str] = &["mix", "mixes", "slowed", "reverb", "sped up", "8d", "bass boosted"];

/// Lowercases, folds punctuation to spaces and collapses whitespace.
pub fn normalize(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn contains_keyword(normalized: &str, keyword: &str) -> bool {
    format!(" {normalized} ").contains(&format!(" {keyword} "))
}

fn contains_any(normalized: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| contains_keyword(normalized, k))
}

pub fn significant_words(title: &str) -> Vec<String> {
    normalize(title).split_whitespace().filter(|w| !STOP_WORDS.contains(w)).map(str::to_string).collect()
}

/// Up to four significant words of the seed title, padded to at least two.
pub fn derive_search_terms(title: &str) -> Vec<String> {
    let mut terms = significant_words(title);
    terms.truncate(MAX_TERMS);
    for pad in PAD_TERMS {
        if terms.len() >= 2 {
            break;
        }
        terms.push((*pad).to_string());
    }
    terms
}

pub fn is_music_content(title: &str) -> bool {
    let n = normalize(title);
    contains_any(&n, MUSIC_KEYWORDS) && !contains_any(&n, NON_MUSIC_KEYWORDS) && !is_remix_or_cover(title)
}

pub fn is_remix_or_cover(title: &str) -> bool {
    let n = normalize(title);
    let stemmed = n.split_whitespace().any(|w| REMIX_STEMS.iter().any(|stem| w.starts_with(stem)));
    stemmed || contains_any(&n, REMIX_PHRASES)
}

/// Same first two significant words as the seed. Titles with fewer than two never match.
pub fn is_near_duplicate(candidate: &str, seed: &str) -> bool {
    let c = significant_words(candidate);
    let s = significant_words(seed);
    c.len() >= 2 && s.len() >= 2 && c[..2] == s[..2]
}
