use crate::error::LoadError;
use crate::record::{SightingRecord, Source, is_known_city, is_reserved_key};
use csv::ReaderBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;

const REQUIRED_COLUMNS: [&str; 3] = ["location", "species", "date"];

/// Where the bulk dataset lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkSource {
    File(PathBuf),
    Url(String),
}

impl BulkSource {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            BulkSource::Url(raw.to_string())
        } else {
            BulkSource::File(PathBuf::from(raw))
        }
    }
}

impl std::fmt::Display for BulkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BulkSource::File(path) => write!(f, "{}", path.display()),
            BulkSource::Url(url) => write!(f, "{}", url),
        }
    }
}

pub struct BulkLoader {
    client: Client,
    source: BulkSource,
    pub(crate) base_delay: Duration,
    pub(crate) max_retries: u32,
    show_progress: bool,
}

impl BulkLoader {
    pub fn new(source: BulkSource) -> Result<Self, LoadError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("tickwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            source,
            base_delay: Duration::from_millis(500),
            max_retries: 3,
            show_progress: false,
        })
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.base_delay = Duration::from_millis(delay_ms);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Reads and parses the dataset. Any failure here is fatal to the bulk set only.
    pub async fn load(&self) -> Result<Vec<SightingRecord>, LoadError> {
        let progress = if self.show_progress {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        } else {
            ProgressBar::hidden()
        };
        progress.set_message(format!("Loading bulk dataset from {}", self.source));

        let bytes = match &self.source {
            BulkSource::File(path) => tokio::fs::read(path).await.map_err(LoadError::from),
            BulkSource::Url(url) => self.fetch(url).await,
        };
        let records = bytes.and_then(|bytes| parse_bulk(bytes.as_slice()));
        progress.finish_and_clear();

        let records = records?;
        info!("Loaded {} bulk sightings from {}", records.len(), self.source);
        Ok(records)
    }

    /// Like `load`, but a failure becomes an empty bulk set plus a notice for the viewer.
    pub async fn load_or_empty(&self) -> (Vec<SightingRecord>, Option<String>) {
        match self.load().await {
            Ok(records) => (records, None),
            Err(e) => {
                warn!("Bulk dataset unavailable, continuing without it: {}", e);
                (
                    Vec::new(),
                    Some(format!("Historical data could not be loaded: {}", e)),
                )
            }
        }
    }

    /// Fetch with exponential backoff and jitter on rate limits, server errors and transport failures.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        let base_ms = self.base_delay.as_millis() as u64;
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let jitter = rand::rng().random_range(0..base_ms.max(1));
                let backoff_delay = Duration::from_millis(backoff_ms(attempt, base_ms, jitter));
                info!(
                    "Retrying {} (attempt {}) after {}ms delay",
                    url,
                    attempt + 1,
                    backoff_delay.as_millis()
                );
                sleep(backoff_delay).await;
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    match status {
                        200..=299 => return Ok(response.bytes().await?.to_vec()),
                        429 | 500..=599 => {
                            warn!("HTTP {} fetching {}", status, url);
                            last_error = Some(LoadError::Status {
                                url: url.to_string(),
                                status,
                            });
                        }
                        _ => {
                            return Err(LoadError::Status {
                                url: url.to_string(),
                                status,
                            });
                        }
                    }
                }
                Err(e) => {
                    warn!("Request for {} failed: {}", url, e);
                    last_error = Some(LoadError::Http(e));
                }
            }
        }

        Err(last_error.unwrap_or(LoadError::Status {
            url: url.to_string(),
            status: 0,
        }))
    }
}

/// `2^attempt * base + jitter`, saturating instead of overflowing.
fn backoff_ms(attempt: u32, base_ms: u64, jitter_ms: u64) -> u64 {
    2_u64
        .checked_pow(attempt)
        .unwrap_or(u64::MAX)
        .saturating_mul(base_ms)
        .saturating_add(jitter_ms)
}

/// Parses a header-first CSV into bulk records, dropping rows whose location is not a known city.
pub fn parse_bulk<R: Read>(reader: R) -> Result<Vec<SightingRecord>, LoadError> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();

    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(LoadError::MissingColumn(column));
        }
    }

    let mut records = Vec::new();
    let mut dropped = 0usize;

    for row in rdr.records() {
        let row = row?;
        let mut record = SightingRecord {
            source: Source::Bulk,
            ..SightingRecord::default()
        };

        for (column, value) in headers.iter().zip(row.iter()) {
            match column {
                "date" => record.date = value.to_string(),
                "time" => record.time = value.to_string(),
                "location" => record.location = value.to_string(),
                "species" => record.species = value.to_string(),
                "image" if !value.is_empty() => record.image = Some(value.to_string()),
                "image" => {}
                other if is_reserved_key(other) => {}
                other => {
                    record
                        .extra
                        .insert(other.to_string(), Value::String(value.to_string()));
                }
            }
        }

        if is_known_city(&record.location) {
            records.push(record);
        } else {
            dropped += 1;
        }
    }

    if dropped > 0 {
        debug!("Dropped {} bulk rows with unresolvable locations", dropped);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
date,location,species,habitat
2024-05-01,London,Ixodes ricinus,woodland
2023-07-14,Atlantis,Ixodes ricinus,sea
2022-03-09,,Unknown,
2021-09-30,Glasgow,Haemaphysalis punctata,moor
";

    #[test]
    fn test_parse_drops_unresolvable_locations() {
        let records = parse_bulk(SAMPLE.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.source == Source::Bulk));
        assert!(records.iter().all(|r| r.id.is_none()));
        assert_eq!(records[0].location, "London");
        assert_eq!(records[1].location, "Glasgow");
    }

    #[test]
    fn test_parse_passes_extra_columns_through() {
        let records = parse_bulk(SAMPLE.as_bytes()).unwrap();
        assert_eq!(records[0].extra.get("habitat"), Some(&Value::from("woodland")));
        assert!(records[0].time.is_empty());
    }

    #[test]
    fn test_reserved_columns_are_not_passed_through() {
        let csv = "location,species,date,id,source,notes\nLondon,Ixodes ricinus,2024-05-01,77,user,x\n";
        let records = parse_bulk(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, None);
        assert_eq!(records[0].source, Source::Bulk);
        assert!(!records[0].extra.contains_key("id"));
        assert!(!records[0].extra.contains_key("source"));
        assert!(records[0].extra.contains_key("notes"));

        let view = crate::aggregate::aggregate(&records, &[], &Default::default());
        let json = serde_json::to_string(&view.visible_records[0]).unwrap();
        assert_eq!(json.matches("\"source\"").count(), 1);
        assert!(json.contains("\"source\":\"bulk\""));
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn test_parse_requires_columns() {
        let err = parse_bulk("date,species\n2024-01-01,Unknown\n".as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn("location")));
    }

    #[test]
    fn test_parse_tolerates_short_rows() {
        let records = parse_bulk("location,species,date,notes\nLondon,Unknown\n".as_bytes())
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].date.is_empty());
    }

    #[test]
    fn test_backoff_saturates() {
        assert_eq!(backoff_ms(1, 500, 10), 1_010);
        assert_eq!(backoff_ms(3, 500, 0), 4_000);
        assert_eq!(backoff_ms(64, 500, 0), u64::MAX);
        assert_eq!(backoff_ms(10, u64::MAX / 2, 7), u64::MAX);
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(
            BulkSource::parse("https://example.org/ticks.csv"),
            BulkSource::Url("https://example.org/ticks.csv".to_string())
        );
        assert_eq!(
            BulkSource::parse("data/tickdata.csv"),
            BulkSource::File(PathBuf::from("data/tickdata.csv"))
        );
    }

    #[test]
    fn test_loader_configuration() {
        let loader = BulkLoader::new(BulkSource::parse("tickdata.csv"))
            .unwrap()
            .with_delay(2000)
            .with_max_retries(5);
        assert_eq!(loader.base_delay, Duration::from_millis(2000));
        assert_eq!(loader.max_retries, 5);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticks.csv");
        std::fs::write(&path, SAMPLE).unwrap();

        let loader = BulkLoader::new(BulkSource::File(path)).unwrap();
        let records = loader.load().await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loader = BulkLoader::new(BulkSource::File(dir.path().join("absent.csv"))).unwrap();

        assert!(matches!(loader.load().await, Err(LoadError::Io(_))));
        let (records, notice) = loader.load_or_empty().await;
        assert!(records.is_empty());
        assert!(notice.is_some());
    }

    #[tokio::test]
    async fn test_bundled_dataset() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/tickdata.csv");
        let records = BulkLoader::new(BulkSource::File(path)).unwrap().load().await.unwrap();

        assert_eq!(records.len(), 18);
        assert!(records.iter().all(|r| r.coords().is_some()));
        assert!(records.iter().all(|r| !r.time.is_empty()));
    }
}
