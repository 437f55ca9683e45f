use crate::aggregate::{ChartScope, FilterState, Selection, Timeline};
use crate::store::DEFAULT_QUOTA;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tickwatch")]
#[command(about = "Map-ready summaries of UK tick sightings, plus a local store for new reports")]
#[command(version = "1.0")]
pub(crate) struct Args {
    /// Bulk dataset: a CSV path or an http(s) URL
    #[arg(short, long, env = "TICKWATCH_BULK", default_value = "data/tickdata.csv")]
    pub bulk: String,

    /// Directory holding reported sightings
    #[arg(short, long, env = "TICKWATCH_STORE_DIR", default_value = ".tickwatch")]
    pub store_dir: PathBuf,

    /// Capacity of the sightings store in bytes
    #[arg(short, long, env = "TICKWATCH_QUOTA", default_value_t = DEFAULT_QUOTA)]
    pub quota: usize,

    /// Base delay between retries of a bulk download, in milliseconds
    #[arg(short, long, default_value = "500")]
    pub delay: u64,

    /// Maximum number of retry attempts for a bulk download
    #[arg(short, long, default_value = "3", value_parser = clap::value_parser!(u32).range(0..=16))]
    pub retries: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Show visible sightings with species and monthly summaries
    Dashboard {
        #[command(flatten)]
        filters: FilterArgs,

        /// Print the full view as JSON
        #[arg(long)]
        json: bool,

        /// Also write the visible sightings to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report a new sighting
    Report {
        /// Date found (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// Time found (HH:MM)
        #[arg(long)]
        time: Option<String>,

        /// Nearest city
        #[arg(long)]
        location: Option<String>,

        /// Tick species, or "Unknown"
        #[arg(long)]
        species: Option<String>,

        /// Path to a photo of the tick
        #[arg(long)]
        image: Option<String>,

        /// Confirm an "Unknown" species without prompting
        #[arg(short, long)]
        yes: bool,
    },

    /// List reported sightings
    List,

    /// Print share text and directions for one visible sighting
    Share {
        #[command(flatten)]
        filters: FilterArgs,

        /// Position of the sighting in the visible list
        #[arg(long)]
        index: usize,
    },
}

#[derive(clap::Args, Debug, Default)]
pub(crate) struct FilterArgs {
    /// City to show, or "All"
    #[arg(long)]
    pub location: Option<String>,

    /// Species to show, or "All"
    #[arg(long)]
    pub species: Option<String>,

    /// Only show sightings up to the latest year on record
    #[arg(long)]
    pub timeline: bool,

    /// Only show sightings up to this year (implies --timeline)
    #[arg(long)]
    pub timeline_year: Option<i32>,

    /// City the monthly chart is restricted to, or "All"
    #[arg(long)]
    pub chart_location: Option<String>,

    /// Year the monthly chart is restricted to
    #[arg(long)]
    pub chart_year: Option<i32>,
}

impl FilterArgs {
    /// `default_year` is used when timeline mode is on without an explicit year.
    pub fn to_filter_state(&self, default_year: i32) -> FilterState {
        FilterState {
            location: Selection::from_arg(self.location.as_deref()),
            species: Selection::from_arg(self.species.as_deref()),
            timeline: Timeline {
                active: self.timeline || self.timeline_year.is_some(),
                year: self.timeline_year.unwrap_or(default_year),
            },
            chart: ChartScope {
                location: Selection::from_arg(self.chart_location.as_deref()),
                year: self.chart_year,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["tickwatch", "list"]).unwrap();
        assert_eq!(args.bulk, "data/tickdata.csv");
        assert_eq!(args.store_dir, PathBuf::from(".tickwatch"));
        assert_eq!(args.quota, DEFAULT_QUOTA);
        assert!(matches!(args.command, Command::List));
    }

    #[test]
    fn test_dashboard_filters() {
        let args = Args::try_parse_from([
            "tickwatch",
            "--bulk",
            "https://example.org/ticks.csv",
            "dashboard",
            "--location",
            "London",
            "--timeline-year",
            "2022",
            "--chart-year",
            "2021",
            "--json",
        ])
        .unwrap();

        let Command::Dashboard { filters, json, .. } = args.command else {
            panic!("expected dashboard command");
        };
        assert!(json);
        let state = filters.to_filter_state(2024);
        assert_eq!(state.location, Selection::Only("London".to_string()));
        assert_eq!(state.species, Selection::All);
        assert!(state.timeline.active);
        assert_eq!(state.timeline.year, 2022);
        assert_eq!(state.chart.year, Some(2021));
    }

    #[test]
    fn test_retries_are_capped() {
        assert!(Args::try_parse_from(["tickwatch", "--retries", "64", "list"]).is_err());
        let args = Args::try_parse_from(["tickwatch", "--retries", "16", "list"]).unwrap();
        assert_eq!(args.retries, 16);
    }

    #[test]
    fn test_timeline_flag_uses_default_year() {
        let filters = FilterArgs {
            timeline: true,
            ..FilterArgs::default()
        };
        let state = filters.to_filter_state(2024);
        assert!(state.timeline.active);
        assert_eq!(state.timeline.year, 2024);

        assert!(!FilterArgs::default().to_filter_state(2024).timeline.active);
    }

    #[test]
    fn test_report_args() {
        let args = Args::try_parse_from([
            "tickwatch", "report", "--date", "2024-06-01", "--time", "10:00", "--location",
            "Glasgow", "--species", "Unknown", "--yes",
        ])
        .unwrap();
        match args.command {
            Command::Report {
                species, yes, image, ..
            } => {
                assert_eq!(species.as_deref(), Some("Unknown"));
                assert!(yes);
                assert!(image.is_none());
            }
            _ => panic!("expected report command"),
        }
    }
}
