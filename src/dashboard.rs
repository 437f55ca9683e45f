//! Session-scoped pipeline: loads both record sources, keeps the merged set current
//! across submissions, and computes views for the presentation layer.

use crate::aggregate::{DashboardView, FilterState, VisibleSighting, aggregate, available_years};
use crate::clock::Clock;
use crate::error::StoreError;
use crate::loader::BulkLoader;
use crate::record::{Coordinates, RiskLevel, SightingRecord, Source};
use crate::store::{RecordStore, SlotBackend};
use crate::validate::{SightingCandidate, SubmissionSession, SubmitOutcome};
use chrono::Datelike;
use csv::Writer;
use log::{error, info};
use serde::Serialize;
use std::fs::File;
use std::path::Path;

pub struct Dashboard<B: SlotBackend> {
    bulk: Vec<SightingRecord>,
    user: Vec<SightingRecord>,
    store: RecordStore<B>,
    session: SubmissionSession,
    notices: Vec<String>,
}

impl<B: SlotBackend> Dashboard<B> {
    /// Waits for both the bulk load and the store read before exposing any records.
    pub async fn load(loader: &BulkLoader, store: RecordStore<B>) -> Self {
        let (bulk, user) = futures::join!(loader.load_or_empty(), async { store.list() });

        let mut dashboard = Self::from_parts(bulk.0, store);
        dashboard.notices.extend(bulk.1);
        dashboard.accept_user_records(user);
        dashboard
    }

    /// A dashboard over an already-loaded bulk set, with no user records read yet.
    pub fn from_parts(bulk: Vec<SightingRecord>, store: RecordStore<B>) -> Self {
        Self {
            bulk,
            user: Vec::new(),
            store,
            session: SubmissionSession::new(),
            notices: Vec::new(),
        }
    }

    /// Re-reads user records from the store.
    pub fn refresh(&mut self) {
        let user = self.store.list();
        self.accept_user_records(user);
    }

    fn accept_user_records(&mut self, user: Result<Vec<SightingRecord>, StoreError>) {
        match user {
            Ok(records) => self.user = records,
            Err(e) => {
                error!("Stored sightings unreadable, showing none: {}", e);
                self.user = Vec::new();
                self.notices
                    .push(format!("Your reported sightings could not be read: {}", e));
            }
        }
    }

    pub fn view(&self, filters: &FilterState) -> DashboardView {
        aggregate(&self.bulk, &self.user, filters)
    }

    pub fn bulk_records(&self) -> &[SightingRecord] {
        &self.bulk
    }

    pub fn user_records(&self) -> &[SightingRecord] {
        &self.user
    }

    /// Non-blocking problems met while loading.
    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    /// Latest year on record, or the current year when there is none.
    pub fn default_timeline_year(&self, clock: &impl Clock) -> i32 {
        available_years(&self.bulk, &self.user)
            .last()
            .copied()
            .unwrap_or_else(|| clock.today().year())
    }

    /// Runs a report through the submission session; a commit joins the merged set immediately.
    pub fn submit(
        &mut self,
        candidate: &SightingCandidate,
        clock: &impl Clock,
    ) -> Result<SubmitOutcome, StoreError> {
        let outcome = self.session.submit(candidate, &mut self.store, clock)?;
        if let SubmitOutcome::Committed(record) = &outcome {
            info!("Sighting {:?} added to dashboard", record.id);
            self.user.push(record.clone());
        }
        Ok(outcome)
    }
}

/// Clipboard-style alert text for one sighting.
pub fn share_text(sighting: &VisibleSighting) -> String {
    let record = &sighting.record;
    let date = record
        .parsed_date()
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| record.date.clone());
    format!(
        "Tick Sighting Alert!\nSpecies: {}\nLocation: {}\nDate: {}",
        record.species_label(),
        record.location,
        date
    )
}

pub fn directions_url(coords: Coordinates) -> String {
    format!(
        "https://www.google.com/maps/dir/?api=1&destination={},{}",
        coords.latitude, coords.longitude
    )
}

#[derive(Serialize)]
struct ExportRow<'a> {
    source: Source,
    id: Option<u64>,
    date: &'a str,
    time: &'a str,
    location: &'a str,
    species: &'a str,
    latitude: f64,
    longitude: f64,
    risk: RiskLevel,
    image: Option<&'a str>,
}

/// Writes visible sightings as flat CSV rows.
pub fn save_to_csv(
    sightings: &[VisibleSighting],
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(path)?;
    let mut writer = Writer::from_writer(file);

    for sighting in sightings {
        let record = &sighting.record;
        writer.serialize(ExportRow {
            source: sighting.source,
            id: record.id,
            date: &record.date,
            time: &record.time,
            location: &record.location,
            species: record.species_label(),
            latitude: sighting.coords.latitude,
            longitude: sighting.coords.longitude,
            risk: sighting.risk,
            image: record.image.as_deref(),
        })?;
    }

    writer.flush()?;
    info!("Visible sightings saved to {}", path.display());
    Ok(())
}
