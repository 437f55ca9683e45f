use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Cities a sighting can be reported against, with their map coordinates.
pub const CITY_COORDS: [(&str, Coordinates); 9] = [
    ("Manchester", Coordinates::new(53.4808, -2.2426)),
    ("London", Coordinates::new(51.5074, -0.1278)),
    ("Glasgow", Coordinates::new(55.8642, -4.2518)),
    ("Birmingham", Coordinates::new(52.4862, -1.8904)),
    ("Southampton", Coordinates::new(50.9097, -1.4043)),
    ("Nottingham", Coordinates::new(52.9548, -1.1581)),
    ("Sheffield", Coordinates::new(53.3811, -1.4701)),
    ("Edinburgh", Coordinates::new(55.9533, -3.1883)),
    ("Newcastle", Coordinates::new(54.9784, -1.6174)),
];

pub const UNKNOWN_SPECIES: &str = "Unknown";

/// Keys owned by the record or its view; never carried as pass-through columns.
pub const RESERVED_KEYS: [&str; 5] = ["id", "timestamp", "source", "coords", "risk"];

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

pub const SPECIES_OPTIONS: [&str; 4] = [
    "Ixodes ricinus",
    "Dermacentor reticulatus",
    "Haemaphysalis punctata",
    UNKNOWN_SPECIES,
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Looks a city up in the reference table. Matching is exact.
pub fn city_coords(location: &str) -> Option<Coordinates> {
    CITY_COORDS
        .iter()
        .find(|(city, _)| *city == location)
        .map(|(_, coords)| *coords)
}

pub fn is_known_city(location: &str) -> bool {
    city_coords(location).is_some()
}

pub fn is_known_species(species: &str) -> bool {
    SPECIES_OPTIONS.contains(&species)
}

/// Provenance of a record. Never persisted; assigned when records enter memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Bulk,
    User,
}

impl Default for Source {
    fn default() -> Self {
        Source::User
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    High,
    Standard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SightingRecord {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub species: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip)]
    pub source: Source,
    /// Columns or keys beyond the known ones, carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for SightingRecord {
    fn default() -> Self {
        Self {
            date: String::new(),
            time: String::new(),
            location: String::new(),
            species: String::new(),
            id: None,
            timestamp: None,
            image: None,
            source: Source::default(),
            extra: BTreeMap::new(),
        }
    }
}

impl SightingRecord {
    /// Drops pass-through keys that would shadow a field of the record or its view.
    pub fn strip_reserved_extras(&mut self) {
        self.extra.retain(|key, _| !is_reserved_key(key));
    }

    pub fn coords(&self) -> Option<Coordinates> {
        city_coords(&self.location)
    }

    /// Species label with the `Unknown` sentinel standing in for a blank one.
    pub fn species_label(&self) -> &str {
        if self.species.is_empty() {
            UNKNOWN_SPECIES
        } else {
            &self.species
        }
    }

    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_date(&self.date)
    }

    pub fn year(&self) -> Option<i32> {
        self.parsed_date().map(|d| d.year())
    }

    /// Zero-based month index.
    pub fn month0(&self) -> Option<usize> {
        self.parsed_date().map(|d| d.month0() as usize)
    }

    pub fn risk_level(&self) -> RiskLevel {
        let lower = self.species.to_lowercase();
        if lower.contains("ricinus") || lower.contains("sheep") {
            RiskLevel::High
        } else {
            RiskLevel::Standard
        }
    }
}

/// Accepts `YYYY-MM-DD`, an RFC 3339 instant, or `DD/MM/YYYY`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc).date_naive())
        })
        .or_else(|| NaiveDate::parse_from_str(raw, "%d/%m/%Y").ok())
}
