//! Sensor registry: discovery, binding and the latest-value cache.
//!
//! Every lsid seen on the wire is recorded in a discovery table that
//! persists across restarts, so operators can bind sensors that only
//! broadcast occasionally. Bound sensors get their normalized readings
//! delivered to a sink and cached for the upload senders; unbound ones
//! are remembered and otherwise dropped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use wxlive::SensorType;

use crate::normalize::{ReadingEntry, StateValue};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// A sensor seen on the network, bound or not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnownSensor {
    pub lsid: u32,
    #[serde(rename = "type")]
    pub type_code: u8,
}

/// On-disk shape of the discovery table.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct KnownSensorsFile {
    sensors: Vec<KnownSensor>,
}

/// Where normalized readings for a bound sensor land.
pub trait ReadingSink: Send + Sync {
    /// Stable name used in logs and listings.
    fn name(&self) -> &str;

    /// Apply one batch of normalized entries.
    fn update_states(&mut self, entries: &[ReadingEntry]);
}

/// Sink that surfaces readings in the log, used for sensors that have
/// no other consumer wired up.
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl ReadingSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn update_states(&mut self, entries: &[ReadingEntry]) {
        for entry in entries {
            if let Some(display) = &entry.display {
                log::debug!("{}: {} = {}", self.name, entry.key, display);
            }
        }
    }
}

struct BoundSensor {
    kind: SensorType,
    sink: Box<dyn ReadingSink>,
}

/// Get the wxbridge state directory.
pub fn get_wxbridge_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".wxbridge")
}

/// Default location of the persisted discovery table.
pub fn default_state_file() -> PathBuf {
    get_wxbridge_home().join("known_sensors.json")
}

/// The sensor registry. Single-owner: the dispatcher loop mutates it,
/// nothing else holds a reference.
pub struct SensorRegistry {
    path: PathBuf,
    /// Discovery table: every lsid ever seen, with its type code.
    known: BTreeMap<u32, u8>,
    bound: BTreeMap<u32, BoundSensor>,
    /// Latest normalized values per bound lsid.
    cache: BTreeMap<u32, BTreeMap<String, StateValue>>,
    dirty: bool,
}

impl SensorRegistry {
    /// Empty registry persisting to `path`.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            known: BTreeMap::new(),
            bound: BTreeMap::new(),
            cache: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load the discovery table from `path`; a missing file is an empty
    /// registry, not an error.
    pub fn load(path: PathBuf) -> Result<Self> {
        let mut registry = Self::new(path);
        if !registry.path.exists() {
            return Ok(registry);
        }
        let content = fs::read_to_string(&registry.path)?;
        let file: KnownSensorsFile = serde_json::from_str(&content)?;
        for sensor in file.sensors {
            registry.known.insert(sensor.lsid, sensor.type_code);
        }
        Ok(registry)
    }

    /// Write the discovery table back to disk.
    pub fn save(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = KnownSensorsFile {
            sensors: self
                .known
                .iter()
                .map(|(&lsid, &type_code)| KnownSensor { lsid, type_code })
                .collect(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        fs::write(&self.path, content)?;
        self.dirty = false;
        Ok(())
    }

    /// Save only when discoveries happened since the last save.
    pub fn save_if_dirty(&mut self) -> Result<()> {
        if self.dirty {
            self.save()?;
        }
        Ok(())
    }

    /// Attach a sink to an lsid. Replaces any previous binding.
    pub fn bind(&mut self, lsid: u32, kind: SensorType, sink: Box<dyn ReadingSink>) {
        log::info!("bound sensor {} ({}) to '{}'", lsid, kind.label(), sink.name());
        self.bound.insert(lsid, BoundSensor { kind, sink });
    }

    /// Record a sighting. First sighting of an lsid adds it to the
    /// discovery table; later ones are no-ops.
    pub fn observe(&mut self, lsid: u32, type_code: u8) {
        if self.known.insert(lsid, type_code).is_none() {
            let label = SensorType::from_code(type_code)
                .map(|t| t.label())
                .unwrap_or("unknown type");
            log::info!("discovered sensor {} ({})", lsid, label);
            self.dirty = true;
        }
    }

    /// Deliver a normalized reading to the sensor bound to `lsid`.
    ///
    /// Updates the latest-value cache and the sink; unbound lsids are
    /// dropped. Returns whether a delivery happened.
    pub fn dispatch(&mut self, lsid: u32, entries: &[ReadingEntry]) -> bool {
        let sensor = match self.bound.get_mut(&lsid) {
            Some(sensor) => sensor,
            None => return false,
        };
        let states = self.cache.entry(lsid).or_default();
        for entry in entries {
            states.insert(entry.key.clone(), entry.value.clone());
        }
        sensor.sink.update_states(entries);
        true
    }

    pub fn is_bound(&self, lsid: u32) -> bool {
        self.bound.contains_key(&lsid)
    }

    /// Whether any reading has been cached for `lsid`.
    pub fn has_states(&self, lsid: u32) -> bool {
        self.cache.get(&lsid).is_some_and(|states| !states.is_empty())
    }

    pub fn state(&self, lsid: u32, key: &str) -> Option<&StateValue> {
        self.cache.get(&lsid).and_then(|states| states.get(key))
    }

    /// Numeric view of a cached value; text values return `None`.
    pub fn state_f64(&self, lsid: u32, key: &str) -> Option<f64> {
        self.state(lsid, key).and_then(StateValue::as_f64)
    }

    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// Discovered-but-unbound sensors as sorted `lsid: label` lines.
    pub fn list_available(&self, kind: Option<SensorType>) -> Vec<String> {
        let mut lines: Vec<String> = self
            .known
            .iter()
            .filter(|(lsid, _)| !self.bound.contains_key(lsid))
            .filter(|(_, &code)| match kind {
                Some(want) => SensorType::from_code(code) == Some(want),
                None => true,
            })
            .map(|(lsid, &code)| {
                let label = SensorType::from_code(code)
                    .map(|t| t.label().to_string())
                    .unwrap_or_else(|| format!("type {}", code));
                format!("{}: {}", lsid, label)
            })
            .collect();
        lines.sort();
        lines
    }

    /// Bound sensors as sorted `lsid: label (sink)` lines.
    pub fn list_bound(&self, kind: Option<SensorType>) -> Vec<String> {
        let mut lines: Vec<String> = self
            .bound
            .iter()
            .filter(|(_, sensor)| match kind {
                Some(want) => sensor.kind == want,
                None => true,
            })
            .map(|(lsid, sensor)| {
                format!("{}: {} ({})", lsid, sensor.kind.label(), sensor.sink.name())
            })
            .collect();
        lines.sort();
        lines
    }

    /// Forget discovered sensors that are not bound. Returns how many
    /// entries were dropped.
    pub fn purge_available(&mut self) -> usize {
        let before = self.known.len();
        let bound = &self.bound;
        self.known.retain(|lsid, _| bound.contains_key(lsid));
        let removed = before - self.known.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }
}
