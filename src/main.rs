mod aggregate;
mod clock;
mod dashboard;
mod error;
mod loader;
mod parse;
mod record;
mod store;
mod util;
mod validate;

use crate::aggregate::DashboardView;
use crate::clock::{Clock, SystemClock};
use crate::dashboard::{Dashboard, directions_url, save_to_csv, share_text};
use crate::loader::{BulkLoader, BulkSource};
use crate::parse::{Args, Command};
use crate::record::SightingRecord;
use crate::store::{FileSlots, RecordStore};
use crate::util::{confirm, format_hms};
use crate::validate::{SightingCandidate, SubmitOutcome};
use clap::Parser;
use log::{debug, error, info};
use std::time::Instant;

/// Species counts, most frequent first, ties by name.
pub fn ranked_species(view: &DashboardView) -> Vec<(&str, usize)> {
    let mut ranked: Vec<(&str, usize)> = view
        .species_summary
        .iter()
        .map(|(species, count)| (species.as_str(), *count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
}

pub fn print_summary<B: store::SlotBackend>(dashboard: &Dashboard<B>, view: &DashboardView) {
    println!("\nTick Tracker - UK Dashboard");
    println!(
        "Loaded: {} historical, {} reported",
        dashboard.bulk_records().len(),
        dashboard.user_records().len()
    );

    if view.visible_records.is_empty() {
        println!("No sightings match the current filters");
        return;
    }

    println!("Total sightings: {}", view.visible_records.len());
    println!("High risk: {}", view.high_risk_count());

    println!("Species:");
    for (species, count) in ranked_species(view) {
        println!("  {}: {}", species, count);
    }

    println!("Activity:");
    for month in &view.month_summary {
        println!("  {} {:>4} {}", month.month, month.count, "#".repeat(month.count.min(60)));
    }

    if let (Some(first), Some(last)) = (view.available_years.first(), view.available_years.last())
    {
        println!("Years on record: {} to {}", first, last);
    }
}

fn print_record(record: &SightingRecord) {
    let id = record.id.map(|id| id.to_string()).unwrap_or_default();
    let stamped = record
        .timestamp
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    println!(
        "{:>14}  {}  {} {}  {:<12} {}{}",
        id,
        stamped,
        record.date,
        record.time,
        record.location,
        record.species,
        if record.image.is_some() { "  [photo]" } else { "" }
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    // Initialize logger
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let store = RecordStore::new(FileSlots::new(&args.store_dir).with_quota(args.quota));
    debug!("Using sightings store in {}", args.store_dir.display());

    if let Command::List = args.command {
        let records = store.list()?;
        if records.is_empty() {
            println!("No reported sightings yet");
        }
        for record in &records {
            print_record(record);
        }
        return Ok(());
    }

    let loader = BulkLoader::new(BulkSource::parse(&args.bulk))?
        .with_delay(args.delay)
        .with_max_retries(args.retries)
        .with_progress(true);

    let start = Instant::now();
    let mut dashboard = Dashboard::load(&loader, store).await;
    info!("Sightings loaded in {}", format_hms(&start));
    for notice in dashboard.notices() {
        eprintln!("Notice: {}", notice);
    }

    let clock = SystemClock;
    match args.command {
        Command::Dashboard {
            filters,
            json,
            output,
        } => {
            let state = filters.to_filter_state(dashboard.default_timeline_year(&clock));
            let view = dashboard.view(&state);

            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                if state.timeline.active {
                    println!("Showing history up to {}", state.timeline.year);
                }
                print_summary(&dashboard, &view);
            }

            if let Some(path) = output {
                save_to_csv(&view.visible_records, &path)?;
            }
        }
        Command::Report {
            date,
            time,
            location,
            species,
            image,
            yes,
        } => {
            let candidate = SightingCandidate {
                date: date.unwrap_or_default(),
                time: time.unwrap_or_default(),
                location: location.unwrap_or_default(),
                species: species.unwrap_or_default(),
                image,
            };
            report(&mut dashboard, &candidate, yes, &clock)?;
        }
        Command::Share { filters, index } => {
            let state = filters.to_filter_state(dashboard.default_timeline_year(&clock));
            let view = dashboard.view(&state);
            match view.visible_records.get(index) {
                Some(sighting) => {
                    println!("{}", share_text(sighting));
                    println!("Directions: {}", directions_url(sighting.coords));
                }
                None => {
                    return Err(format!(
                        "No visible sighting at index {} ({} visible)",
                        index,
                        view.visible_records.len()
                    )
                    .into());
                }
            }
        }
        Command::List => {}
    }

    Ok(())
}

/// Submits until the report is committed, rejected, or the user declines to confirm.
fn report<B: store::SlotBackend>(
    dashboard: &mut Dashboard<B>,
    candidate: &SightingCandidate,
    auto_confirm: bool,
    clock: &impl Clock,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let outcome = match dashboard.submit(candidate, clock) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Sighting not saved: {}", e);
                if e.is_retryable() {
                    eprintln!("Saving failed. Please try again; your report was not lost.");
                }
                return Err(e.into());
            }
        };

        match outcome {
            SubmitOutcome::Committed(record) => {
                println!(
                    "Sighting submitted successfully (id {})",
                    record.id.unwrap_or_default()
                );
                dashboard.refresh();
                println!("You have reported {} sightings", dashboard.user_records().len());
                return Ok(());
            }
            SubmitOutcome::Invalid(errors) => {
                for (field, message) in &errors {
                    eprintln!("  {:?}: {}", field, message);
                }
                return Err(format!("Report rejected: {} invalid field(s)", errors.len()).into());
            }
            SubmitOutcome::NeedsConfirmation(warning) => {
                println!("Warning: {}", warning);
                let confirmed = auto_confirm
                    || confirm("Confirm submit?", &mut std::io::stdin().lock())?;
                if !confirmed {
                    println!("Report not submitted");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::FilterState;
    use crate::clock::FixedClock;
    use crate::record::Source;
    use crate::store::MemorySlots;

    fn sighting(species: &str) -> SightingRecord {
        SightingRecord {
            location: "Nottingham".to_string(),
            species: species.to_string(),
            date: "2024-04-04".to_string(),
            source: Source::Bulk,
            ..SightingRecord::default()
        }
    }

    #[test]
    fn test_ranked_species() {
        let bulk = vec![
            sighting("Unknown"),
            sighting("Ixodes ricinus"),
            sighting("Ixodes ricinus"),
            sighting("Dermacentor reticulatus"),
        ];
        let dashboard = Dashboard::from_parts(bulk, RecordStore::new(MemorySlots::new()));
        let view = dashboard.view(&FilterState::default());

        assert_eq!(
            ranked_species(&view),
            vec![
                ("Ixodes ricinus", 2),
                ("Dermacentor reticulatus", 1),
                ("Unknown", 1)
            ]
        );
    }

    #[test]
    fn test_report_auto_confirms_unknown_once() {
        let mut dashboard = Dashboard::from_parts(Vec::new(), RecordStore::new(MemorySlots::new()));
        let candidate = SightingCandidate {
            date: "2024-04-04".to_string(),
            time: "07:30".to_string(),
            location: "Southampton".to_string(),
            species: "Unknown".to_string(),
            image: None,
        };
        let clock = FixedClock::at("2024-05-01T00:00:00Z");

        report(&mut dashboard, &candidate, true, &clock).unwrap();
        assert_eq!(dashboard.user_records().len(), 1);
    }

    #[test]
    fn test_report_rejects_invalid() {
        let mut dashboard = Dashboard::from_parts(Vec::new(), RecordStore::new(MemorySlots::new()));
        let clock = FixedClock::at("2024-05-01T00:00:00Z");

        assert!(report(&mut dashboard, &SightingCandidate::default(), true, &clock).is_err());
        assert!(dashboard.user_records().is_empty());
    }
}
