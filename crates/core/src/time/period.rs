use crate::domain::text;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const MONTHS: [(&str, u32); 26] = [
    ("enero", 1),
    ("ene", 1),
    ("febrero", 2),
    ("feb", 2),
    ("marzo", 3),
    ("mar", 3),
    ("abril", 4),
    ("abr", 4),
    ("mayo", 5),
    ("may", 5),
    ("junio", 6),
    ("jun", 6),
    ("julio", 7),
    ("jul", 7),
    ("agosto", 8),
    ("ago", 8),
    ("septiembre", 9),
    ("setiembre", 9),
    ("sep", 9),
    ("set", 9),
    ("octubre", 10),
    ("oct", 10),
    ("noviembre", 11),
    ("nov", 11),
    ("diciembre", 12),
    ("dic", 12),
];

/// A billing month. Orders chronologically and renders as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if !(1900..=2999).contains(&year) || !(1..=12).contains(&month) {
            return None;
        }
        Some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_canonical(s.trim()).ok_or_else(|| anyhow::anyhow!("not a YYYY-MM period: {s}"))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Outcome of parsing a period label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodParse {
    Parsed(YearMonth),
    Unparseable,
}

impl PeriodParse {
    pub fn year_month(self) -> Option<YearMonth> {
        match self {
            PeriodParse::Parsed(ym) => Some(ym),
            PeriodParse::Unparseable => None,
        }
    }
}

/// Parses `YYYY-MM`, `YYYY-MM-DD`, `MM/YYYY` and Spanish labels such as
/// `"enero 2024"`, `"Septiembre de 2023"` or `"ago 2024"`.
pub fn parse_period(label: &str) -> PeriodParse {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return PeriodParse::Unparseable;
    }

    if let Some(ym) = parse_canonical(trimmed) {
        return PeriodParse::Parsed(ym);
    }

    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return PeriodParse::Parsed(YearMonth::from_date(d));
    }

    if let Some(ym) = parse_slash(trimmed) {
        return PeriodParse::Parsed(ym);
    }

    let words: Vec<String> = text::words(trimmed)
        .into_iter()
        .filter(|w| w != "de" && w != "del")
        .collect();
    if words.len() != 2 {
        return PeriodParse::Unparseable;
    }

    let month = month_index(&words[0]);
    let year = parse_year(&words[1]);
    match (month, year) {
        (Some(m), Some(y)) => {
            YearMonth::new(y, m).map_or(PeriodParse::Unparseable, PeriodParse::Parsed)
        }
        _ => PeriodParse::Unparseable,
    }
}

/// Canonical month for a stored analysis. The stored ISO date is preferred over the label.
pub fn period_to_year_month(label: &str, iso_date: Option<NaiveDate>) -> Option<YearMonth> {
    if let Some(d) = iso_date {
        return Some(YearMonth::from_date(d));
    }
    parse_period(label).year_month()
}

/// Ordering key for trend series: known months chronologically, then unparseable labels.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeriodKey {
    Known(YearMonth),
    Unknown(String),
}

impl PeriodKey {
    pub fn new(label: &str, iso_date: Option<NaiveDate>) -> Self {
        match period_to_year_month(label, iso_date) {
            Some(ym) => PeriodKey::Known(ym),
            None => PeriodKey::Unknown(label.trim().to_string()),
        }
    }

    pub fn year_month(&self) -> Option<YearMonth> {
        match self {
            PeriodKey::Known(ym) => Some(*ym),
            PeriodKey::Unknown(_) => None,
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodKey::Known(ym) => write!(f, "{ym}"),
            PeriodKey::Unknown(label) => f.write_str(label),
        }
    }
}

fn parse_canonical(s: &str) -> Option<YearMonth> {
    let (y, m) = s.split_once('-')?;
    if y.len() != 4 || m.len() != 2 {
        return None;
    }
    if !y.bytes().all(|b| b.is_ascii_digit()) || !m.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    YearMonth::new(y.parse().ok()?, m.parse().ok()?)
}

fn parse_slash(s: &str) -> Option<YearMonth> {
    let (m, y) = s.split_once('/')?;
    let m = m.trim();
    let y = y.trim();
    if m.is_empty() || m.len() > 2 || y.len() != 4 {
        return None;
    }
    YearMonth::new(y.parse().ok()?, m.parse().ok()?)
}

fn month_index(word: &str) -> Option<u32> {
    MONTHS
        .iter()
        .find(|(name, _)| *name == word)
        .map(|(_, m)| *m)
}

fn parse_year(word: &str) -> Option<i32> {
    if word.len() != 4 {
        return None;
    }
    word.parse::<i32>().ok().filter(|y| (1900..=2999).contains(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(y: i32, m: u32) -> YearMonth {
        YearMonth::new(y, m).unwrap()
    }

    #[test]
    fn canonical_labels_are_identity() {
        for label in ["2024-01", "2023-12", "1999-07", "2030-10"] {
            let parsed = period_to_year_month(label, None).unwrap();
            assert_eq!(parsed.to_string(), label);
        }
    }

    #[test]
    fn iso_date_takes_precedence_over_label() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(period_to_year_month("enero 2020", Some(d)), Some(ym(2024, 3)));
    }

    #[test]
    fn parses_spanish_labels() {
        assert_eq!(parse_period("enero 2024"), PeriodParse::Parsed(ym(2024, 1)));
        assert_eq!(parse_period("Septiembre de 2023"), PeriodParse::Parsed(ym(2023, 9)));
        assert_eq!(parse_period("SETIEMBRE 2023"), PeriodParse::Parsed(ym(2023, 9)));
        assert_eq!(parse_period("ago 2024"), PeriodParse::Parsed(ym(2024, 8)));
        assert_eq!(parse_period("03/2024"), PeriodParse::Parsed(ym(2024, 3)));
        assert_eq!(parse_period("2024-05-31"), PeriodParse::Parsed(ym(2024, 5)));
    }

    #[test]
    fn rejects_ambiguous_labels() {
        assert_eq!(parse_period(""), PeriodParse::Unparseable);
        assert_eq!(parse_period("enero"), PeriodParse::Unparseable);
        assert_eq!(parse_period("primavera 2024"), PeriodParse::Unparseable);
        assert_eq!(parse_period("enero 24"), PeriodParse::Unparseable);
        assert_eq!(parse_period("2024-13"), PeriodParse::Unparseable);
    }

    #[test]
    fn period_keys_sort_chronologically_then_unknown() {
        let mut keys = vec![
            PeriodKey::new("???", None),
            PeriodKey::new("febrero 2024", None),
            PeriodKey::new("diciembre 2023", None),
            PeriodKey::new("2024-01", None),
        ];
        keys.sort();
        let rendered: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(rendered, vec!["2023-12", "2024-01", "2024-02", "???"]);
    }

    #[test]
    fn year_month_rolls_over_december() {
        assert_eq!(ym(2023, 12).next(), ym(2024, 1));
        assert_eq!(ym(2024, 4).next(), ym(2024, 5));
    }

    #[test]
    fn year_month_serializes_as_string() {
        let v = serde_json::to_value(ym(2024, 2)).unwrap();
        assert_eq!(v, serde_json::json!("2024-02"));
        let back: YearMonth = serde_json::from_value(v).unwrap();
        assert_eq!(back, ym(2024, 2));
    }
}
