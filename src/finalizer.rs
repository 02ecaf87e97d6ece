//! Quality/keyword finalizer (C8). Recomputes derived per-photo fields after
//! a file has been merged in: quality score, keyword set, title, date
//! fields.

use crate::model::{Details, File, Photo, Source};
use chrono::Datelike;
use std::collections::HashSet;

const STOPWORDS: &[&str] = &["the", "and", "img", "dsc", "photo", "picture", "of", "a", "an"];

/// A small palette-name table matching the 16 hue/lightness buckets
/// `facts::palette_index` assigns (GLOSSARY: Perceptual color signature).
const COLOR_NAMES: [&str; 16] = [
    "black", "gray", "white", "red", "orange", "yellow", "green", "teal", "blue", "purple", "pink",
    "brown", "red", "orange", "yellow", "green",
];

/// Year/month/day derived from `taken_at_local`, for date-based indexing.
/// Not persisted as columns: nothing in the abstract catalog interface
/// queries by date directly, so these are computed on demand rather than
/// adding schema the core itself never reads back.
pub struct DateFields {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

pub fn date_fields(photo: &Photo) -> DateFields {
    match photo.taken_at_local {
        Some(local) => DateFields { year: Some(local.year()), month: Some(local.month()), day: Some(local.day()) },
        None => DateFields { year: None, month: None, day: None },
    }
}

/// Small integer in [0..7], monotone (adding information never lowers
/// the score) and deterministic.
pub fn quality_score(photo: &Photo, _details: &Details, files: &[File]) -> i32 {
    let mut score = 0;
    if photo.title.value.is_some() {
        score += 1;
    }
    if photo.description.value.is_some() {
        score += 1;
    }
    if photo.resolution >= 2.0 {
        score += 1;
    }
    if photo.coordinates.value.is_some() {
        score += 1;
    }
    if photo.exposure.value.is_some() {
        score += 1;
    }
    if photo.taken_at.src >= Source::Exif {
        score += 1;
    }
    let has_complete_primary = files.iter().any(|f| f.primary && f.error.is_none());
    if files.len() > 1 || has_complete_primary {
        score += 1;
    }
    score.min(7)
}

fn deaccent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

fn tokenize(s: &str) -> Vec<String> {
    s.chars()
        .map(|c| if c.is_alphanumeric() { deaccent(c.to_ascii_lowercase()) } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Union of parsed keywords, filename tokens (current + original),
/// dominant color name. Location keywords and classification labels come
/// from out-of-scope collaborators (location resolution, neural labeling)
/// and are left for the caller to fold in before persisting, if available.
pub fn derive_keywords(photo: &Photo, details: &Details, files: &[File]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |token: String| {
        if !token.is_empty() && !STOPWORDS.contains(&token.as_str()) && seen.insert(token.clone()) {
            out.push(token);
        }
    };

    if let Some(kw) = &details.keywords.value {
        for part in kw.split(',') {
            for token in tokenize(part) {
                push(token);
            }
        }
    }
    for token in tokenize(&photo.name) {
        push(token);
    }
    if let Some(orig) = &photo.original_name {
        for token in tokenize(orig) {
            push(token);
        }
    }
    if let Some(color) = files.iter().find(|f| f.primary).and_then(|f| f.main_color.as_deref()) {
        if let Ok(idx) = u8::from_str_radix(color, 16) {
            if let Some(name) = COLOR_NAMES.get(idx as usize) {
                push(name.to_string());
            }
        }
    }

    out
}

/// Deterministic function of date (and, when available, location and
/// labels); set at `Source::Auto` priority so any higher-priority source
/// already on the photo wins via the normal `Sourced::set` rule.
pub fn derive_title(photo: &Photo) -> String {
    let date_part = date_fields(photo)
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "Unknown date".to_string());
    format!("{} - {}", photo.name, date_part)
}

/// Recomputes quality, keywords, title. Returns true if anything changed.
pub fn finalize(photo: &mut Photo, details: &mut Details, files: &[File]) -> bool {
    let mut changed = false;

    let quality = quality_score(photo, details, files);
    if photo.quality != quality && photo.quality != -1 {
        photo.quality = quality;
        changed = true;
    }

    let keywords = derive_keywords(photo, details, files).join(", ");
    if details.keywords.value.as_deref() != Some(keywords.as_str()) {
        changed |= details.keywords.set(keywords, details.keywords.src.max(Source::Auto));
    }

    let title = derive_title(photo);
    changed |= photo.title.set(title, Source::Auto);

    changed
}
