use crate::clock::Clock;
use crate::error::StoreError;
use crate::record::{SightingRecord, Source};
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;

/// Name of the slot holding user-submitted sightings.
pub const SIGHTINGS_SLOT: &str = "reportedSightings";

/// Default capacity of a slot backend, in bytes.
pub const DEFAULT_QUOTA: usize = 5 * 1024 * 1024;

/// A named-slot key-value medium. Each slot holds one string value.
pub trait SlotBackend {
    /// Returns `None` when the slot has never been written.
    fn read(&self, slot: &str) -> io::Result<Option<String>>;

    /// Replaces the slot contents as a whole. On error the previous value must survive.
    fn write(&mut self, slot: &str, contents: &str) -> io::Result<()>;
}

/// Slots stored as `<dir>/<slot>.json`, replaced atomically through a temp file.
pub struct FileSlots {
    dir: PathBuf,
    quota: usize,
}

impl FileSlots {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quota: DEFAULT_QUOTA,
        }
    }

    pub fn with_quota(mut self, quota: usize) -> Self {
        self.quota = quota;
        self
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slot))
    }
}

impl SlotBackend for FileSlots {
    fn read(&self, slot: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.slot_path(slot)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, slot: &str, contents: &str) -> io::Result<()> {
        if contents.len() > self.quota {
            return Err(quota_exceeded(contents.len(), self.quota));
        }
        fs::create_dir_all(&self.dir)?;

        let target = self.slot_path(slot);
        let tmp = self.dir.join(format!("{}.json.tmp", slot));
        let result = (|| {
            let mut file = File::create(&tmp)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &target)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}

/// Volatile slots for tests and dry runs.
#[cfg(test)]
pub struct MemorySlots {
    slots: std::collections::HashMap<String, String>,
    quota: usize,
    pub fail_writes: bool,
}

#[cfg(test)]
impl MemorySlots {
    pub fn new() -> Self {
        Self {
            slots: std::collections::HashMap::new(),
            quota: DEFAULT_QUOTA,
            fail_writes: false,
        }
    }

    pub fn with_quota(mut self, quota: usize) -> Self {
        self.quota = quota;
        self
    }

    pub fn with_slot(mut self, slot: &str, contents: &str) -> Self {
        self.slots.insert(slot.to_string(), contents.to_string());
        self
    }

    pub fn raw(&self, slot: &str) -> Option<&str> {
        self.slots.get(slot).map(String::as_str)
    }
}

#[cfg(test)]
impl SlotBackend for MemorySlots {
    fn read(&self, slot: &str) -> io::Result<Option<String>> {
        Ok(self.slots.get(slot).cloned())
    }

    fn write(&mut self, slot: &str, contents: &str) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::other("medium unavailable"));
        }
        if contents.len() > self.quota {
            return Err(quota_exceeded(contents.len(), self.quota));
        }
        self.slots.insert(slot.to_string(), contents.to_string());
        Ok(())
    }
}

fn quota_exceeded(needed: usize, quota: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::StorageFull,
        format!("{} bytes needed, quota is {} bytes", needed, quota),
    )
}

/// Append-only list of user-submitted sightings, persisted as a JSON array in one slot.
pub struct RecordStore<B: SlotBackend> {
    backend: B,
    slot: String,
}

impl<B: SlotBackend> RecordStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            slot: SIGHTINGS_SLOT.to_string(),
        }
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[cfg(test)]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// All stored records, tagged as user records. An absent slot is an empty list.
    pub fn list(&self) -> Result<Vec<SightingRecord>, StoreError> {
        let raw = self
            .backend
            .read(&self.slot)
            .map_err(|e| StoreError::StoreReadFailure(e.to_string()))?;

        let mut records: Vec<SightingRecord> = match raw {
            Some(contents) if !contents.trim().is_empty() => serde_json::from_str(&contents)?,
            _ => Vec::new(),
        };
        for record in records.iter_mut() {
            record.source = Source::User;
            record.strip_reserved_extras();
        }

        debug!("Read {} stored sightings from slot {}", records.len(), self.slot);
        Ok(records)
    }

    /// Stamps `id` and `timestamp` onto the record and persists it after the existing ones.
    pub fn append(
        &mut self,
        record: SightingRecord,
        clock: &impl Clock,
    ) -> Result<SightingRecord, StoreError> {
        let mut missing = Vec::new();
        if record.location.trim().is_empty() {
            missing.push("location");
        }
        if record.species.trim().is_empty() {
            missing.push("species");
        }
        if !missing.is_empty() {
            warn!("Rejected sighting with missing fields: {}", missing.join(", "));
            return Err(StoreError::ValidationFailed(missing));
        }

        let mut records = self.list()?;
        let now = clock.now();
        let last_id = records.iter().filter_map(|r| r.id).max();
        let id = next_id(now.timestamp_millis(), last_id).ok_or_else(|| {
            warn!("No sighting id left after {:?}", last_id);
            StoreError::IdExhausted(last_id.unwrap_or_default())
        })?;

        let mut entry = record;
        entry.id = Some(id);
        entry.timestamp = Some(now);
        entry.source = Source::User;
        records.push(entry.clone());

        let encoded = serde_json::to_string(&records)
            .map_err(|e| StoreError::WriteFailure(io::Error::other(e)))?;
        self.backend
            .write(&self.slot, &encoded)
            .map_err(|e| match e.kind() {
                io::ErrorKind::StorageFull => StoreError::StorageFull(e.to_string()),
                _ => StoreError::WriteFailure(e),
            })?;

        info!(
            "Stored sighting {} ({} at {})",
            id, entry.species, entry.location
        );
        Ok(entry)
    }
}

/// Millisecond commit instant, bumped past the previous id when the clock has not advanced.
/// `None` once the previous id is `u64::MAX`.
fn next_id(now_millis: i64, last_id: Option<u64>) -> Option<u64> {
    let candidate = now_millis.max(0) as u64;
    match last_id {
        Some(last) if candidate <= last => last.checked_add(1),
        _ => Some(candidate),
    }
}
