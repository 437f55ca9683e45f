use crate::clock::Clock;
use crate::error::StoreError;
use crate::record::{
    SightingRecord, Source, UNKNOWN_SPECIES, is_known_city, is_known_species, parse_date,
};
use crate::store::{RecordStore, SlotBackend};
use log::{debug, info};
use std::collections::BTreeMap;

pub const UNKNOWN_SPECIES_WARNING: &str = "You selected 'Unknown'. Please ensure you have a photo \
for verification later. Submit again to confirm.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Field {
    Date,
    Time,
    Location,
    Species,
}

/// Per-field messages. Empty means the candidate is valid.
pub type FieldErrors = BTreeMap<Field, &'static str>;

/// What the report form hands over before anything is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SightingCandidate {
    pub date: String,
    pub time: String,
    pub location: String,
    pub species: String,
    pub image: Option<String>,
}

impl SightingCandidate {
    fn into_record(self) -> SightingRecord {
        SightingRecord {
            date: self.date,
            time: self.time,
            location: self.location,
            species: self.species,
            image: self.image,
            source: Source::User,
            ..SightingRecord::default()
        }
    }
}

/// Checks every field independently and reports all violations at once.
pub fn validate(candidate: &SightingCandidate, clock: &impl Clock) -> FieldErrors {
    let mut errors = FieldErrors::new();

    let date = candidate.date.trim();
    if date.is_empty() {
        errors.insert(Field::Date, "Date is required.");
    } else {
        match parse_date(date) {
            // Neither empty nor comparable with today, so it gets a message of its own.
            None => {
                errors.insert(Field::Date, "Date must be a valid calendar date.");
            }
            Some(day) if day > clock.today() => {
                errors.insert(Field::Date, "Date cannot be in the future.");
            }
            Some(_) => {}
        }
    }

    if candidate.time.trim().is_empty() {
        errors.insert(Field::Time, "Time is required.");
    }
    if !is_known_city(&candidate.location) {
        errors.insert(Field::Location, "Please select a location.");
    }
    if !is_known_species(&candidate.species) {
        errors.insert(Field::Species, "Please identify the species.");
    }

    errors
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum SubmissionState {
    #[default]
    Idle,
    /// The Unknown-species warning was shown for exactly this candidate.
    PendingConfirmation(SightingCandidate),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Invalid(FieldErrors),
    /// Nothing was stored; submitting the same candidate again commits it.
    NeedsConfirmation(&'static str),
    Committed(SightingRecord),
}

/// Drives one report form through validation, the Unknown-species confirmation and the store write.
#[derive(Debug, Default)]
pub struct SubmissionSession {
    state: SubmissionState,
}

impl SubmissionSession {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        matches!(self.state, SubmissionState::PendingConfirmation(_))
    }

    /// Field errors and confirmation requests come back as `Ok`; only store failures are `Err`.
    /// The candidate is borrowed so the caller keeps the form contents on failure.
    pub fn submit<B: SlotBackend>(
        &mut self,
        candidate: &SightingCandidate,
        store: &mut RecordStore<B>,
        clock: &impl Clock,
    ) -> Result<SubmitOutcome, StoreError> {
        let errors = validate(candidate, clock);
        if !errors.is_empty() {
            debug!("Submission rejected on {} field(s)", errors.len());
            self.state = SubmissionState::Idle;
            return Ok(SubmitOutcome::Invalid(errors));
        }

        if candidate.species == UNKNOWN_SPECIES {
            let confirmed = matches!(
                &self.state,
                SubmissionState::PendingConfirmation(pending) if pending == candidate
            );
            if !confirmed {
                info!("Holding Unknown-species sighting for confirmation");
                self.state = SubmissionState::PendingConfirmation(candidate.clone());
                return Ok(SubmitOutcome::NeedsConfirmation(UNKNOWN_SPECIES_WARNING));
            }
        }

        self.state = SubmissionState::Idle;
        let stored = store.append(candidate.clone().into_record(), clock)?;
        Ok(SubmitOutcome::Committed(stored))
    }
}
