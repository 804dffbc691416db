use crate::domain::text;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Containment only counts when the shorter name covers more than this share of the longer.
const MIN_CONTAINMENT_RATIO: f64 = 0.5;
const MAX_LENGTH_DIFF: usize = 2;
const MAX_POSITIONAL_MISMATCHES: usize = 2;
// Near-equality is disabled for names this short or shorter.
const MIN_NEAR_MATCH_LEN: usize = 5;

/// Descriptive attributes of one owner's building, used as the market comparison filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingProfile {
    pub user_id: Uuid,
    pub building_name: String,
    pub country: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub zone: Option<String>,
    pub unit_count_range: Option<String>,
    pub age_category: Option<String>,
    pub has_amenities: Option<bool>,
    #[serde(default)]
    pub amenities: Vec<String>,
}

impl BuildingProfile {
    /// Folds a newer extraction into the stored profile. Known values are never replaced
    /// by missing ones.
    pub fn merge(&mut self, incoming: BuildingProfile) {
        fn keep<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        keep(&mut self.country, incoming.country);
        keep(&mut self.province, incoming.province);
        keep(&mut self.city, incoming.city);
        keep(&mut self.neighborhood, incoming.neighborhood);
        keep(&mut self.zone, incoming.zone);
        keep(&mut self.unit_count_range, incoming.unit_count_range);
        keep(&mut self.age_category, incoming.age_category);
        keep(&mut self.has_amenities, incoming.has_amenities);

        for amenity in incoming.amenities {
            if !self.amenities.iter().any(|a| a.eq_ignore_ascii_case(&amenity)) {
                self.amenities.push(amenity);
            }
        }
    }
}

/// Canonical comparison form: lowercase, no diacritics, no separators, with the usual
/// abbreviations expanded (`"Edif. Central"` and `"Edificio Central"` normalize alike).
pub fn normalize_building_name(name: &str) -> String {
    text::words(name)
        .iter()
        .map(|w| expand_abbreviation(w))
        .collect()
}

fn expand_abbreviation(word: &str) -> &str {
    match word {
        "edif" | "ed" | "edf" => "edificio",
        "cons" | "consor" => "consorcio",
        "av" | "avda" => "avenida",
        "pje" => "pasaje",
        "gral" => "general",
        other => other,
    }
}

/// Returns the existing building name that `candidate` most likely refers to.
pub fn find_matching_building<'a, S: AsRef<str>>(
    candidate: &str,
    existing: &'a [S],
) -> Option<&'a str> {
    let wanted = normalize_building_name(candidate);
    if wanted.is_empty() {
        return None;
    }

    existing
        .iter()
        .map(AsRef::as_ref)
        .find(|name| names_match(&wanted, &normalize_building_name(name)))
}

fn names_match(a: &str, b: &str) -> bool {
    if b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }

    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    if longer.contains(shorter) {
        let ratio = shorter.len() as f64 / longer.len() as f64;
        if ratio > MIN_CONTAINMENT_RATIO {
            return true;
        }
    }

    if longer.len() - shorter.len() <= MAX_LENGTH_DIFF && longer.len() > MIN_NEAR_MATCH_LEN {
        // Position-by-position comparison; missing trailing characters count as mismatches.
        let s = shorter.as_bytes();
        let l = longer.as_bytes();
        let mismatches = (0..l.len()).filter(|&i| s.get(i) != Some(&l[i])).count();
        return mismatches <= MAX_POSITIONAL_MISMATCHES;
    }

    false
}
