use crate::record::{Coordinates, RiskLevel, SightingRecord, Source};
use chrono::Datelike;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// `All`, or one exact value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Only(String),
}

impl Selection {
    /// `None` and the literal `"All"` both select everything.
    pub fn from_arg(raw: Option<&str>) -> Self {
        match raw {
            None | Some("All") => Selection::All,
            Some(value) => Selection::Only(value.to_string()),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(wanted) => wanted == value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timeline {
    pub active: bool,
    pub year: i32,
}

impl Timeline {
    fn admits(&self, record: &SightingRecord) -> bool {
        if !self.active {
            return true;
        }
        record.year().is_some_and(|year| year <= self.year)
    }
}

/// Secondary scoping applied only to the month chart.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChartScope {
    pub location: Selection,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterState {
    pub location: Selection,
    pub species: Selection,
    pub timeline: Timeline,
    pub chart: ChartScope,
}

impl FilterState {
    pub fn admits(&self, record: &SightingRecord) -> bool {
        self.location.matches(&record.location)
            && self.species.matches(&record.species)
            && self.timeline.admits(record)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisibleSighting {
    #[serde(flatten)]
    pub record: SightingRecord,
    pub source: Source,
    pub coords: Coordinates,
    pub risk: RiskLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthCount {
    pub month: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub visible_records: Vec<VisibleSighting>,
    pub species_summary: BTreeMap<String, usize>,
    pub month_summary: [MonthCount; 12],
    pub available_years: Vec<i32>,
    pub species_options: Vec<String>,
}

impl DashboardView {
    pub fn high_risk_count(&self) -> usize {
        self.visible_records
            .iter()
            .filter(|s| s.risk == RiskLevel::High)
            .count()
    }
}

/// Bulk records followed by user records, minus any whose location has no coordinates.
pub fn merged<'a>(
    bulk: &'a [SightingRecord],
    user: &'a [SightingRecord],
) -> impl Iterator<Item = (&'a SightingRecord, Coordinates)> + 'a {
    bulk.iter()
        .chain(user.iter())
        .filter_map(|record| record.coords().map(|coords| (record, coords)))
}

/// Distinct parseable years across the merged set, ascending.
pub fn available_years(bulk: &[SightingRecord], user: &[SightingRecord]) -> Vec<i32> {
    merged(bulk, user)
        .filter_map(|(record, _)| record.year())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct species labels across the merged set, in first-seen order.
pub fn species_options(bulk: &[SightingRecord], user: &[SightingRecord]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    merged(bulk, user)
        .map(|(record, _)| record.species.as_str())
        .filter(|species| seen.insert(*species))
        .map(str::to_string)
        .collect()
}

pub fn aggregate(
    bulk: &[SightingRecord],
    user: &[SightingRecord],
    filters: &FilterState,
) -> DashboardView {
    let visible_records: Vec<VisibleSighting> = merged(bulk, user)
        .filter(|(record, _)| filters.admits(record))
        .map(|(record, coords)| VisibleSighting {
            record: record.clone(),
            source: record.source,
            coords,
            risk: record.risk_level(),
        })
        .collect();

    let mut species_summary = BTreeMap::new();
    for sighting in &visible_records {
        *species_summary
            .entry(sighting.record.species_label().to_string())
            .or_insert(0) += 1;
    }

    let mut month_summary: [MonthCount; 12] = std::array::from_fn(|i| MonthCount {
        month: MONTH_LABELS[i],
        count: 0,
    });
    for sighting in &visible_records {
        let record = &sighting.record;
        if !filters.chart.location.matches(&record.location) {
            continue;
        }
        let Some(date) = record.parsed_date() else {
            continue;
        };
        if filters.chart.year.is_some_and(|year| date.year() != year) {
            continue;
        }
        month_summary[date.month0() as usize].count += 1;
    }

    DashboardView {
        visible_records,
        species_summary,
        month_summary,
        available_years: available_years(bulk, user),
        species_options: species_options(bulk, user),
    }
}
