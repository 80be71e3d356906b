//! Disk-spooled payload view.
//!
//! Streams the request body token-by-token exactly once, re-serializing
//! each top-level field to its own file under a private temporary
//! directory as it is encountered. At no point is more than one field's
//! parsed value held in memory, which bounds memory use for arbitrarily
//! large bodies. Accessors re-read and re-parse the relevant file on
//! demand.
//!
//! Layout (private, removed recursively when the view drops):
//!
//! ```text
//! payload-XXXX/
//!   desired.json
//!   always.json
//!   firstMatch/<n>.json
//!   metadata/<n>.json
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::Value;
use tempfile::TempDir;
use tracing::debug;

use crate::capabilities::{as_capability_map, CapabilitySet};
use crate::error::{Error, Result};

// ============================================================================
// DiskBackedView
// ============================================================================

/// Payload view backed by per-field temporary files.
///
/// The temporary directory lives as long as the view and is removed
/// recursively on drop, whatever the exit path.
#[derive(Debug)]
pub(crate) struct DiskBackedView {
    store: TempDir,
    keys: Vec<String>,
    metadata: BTreeMap<String, PathBuf>,
    desired: Option<PathBuf>,
    always: Option<PathBuf>,
    first_matches: Vec<PathBuf>,
    first_match_read: bool,
}

impl DiskBackedView {
    /// Spools the body from `reader` in a single streaming pass.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the body is not valid JSON
    /// - [`Error::Structural`] if the top level is not a JSON object or a
    ///   capability-bearing field has the wrong shape
    /// - [`Error::Io`] if a temporary file cannot be written
    pub(crate) fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let store = tempfile::Builder::new().prefix("payload").tempdir()?;
        Self::spool_into(reader, store)
    }

    /// Spools into a temporary directory under `parent`, for tests that
    /// need to observe cleanup.
    #[cfg(test)]
    fn from_reader_in<R: Read>(reader: R, parent: &Path) -> Result<Self> {
        let store = tempfile::Builder::new()
            .prefix("payload")
            .tempdir_in(parent)?;
        Self::spool_into(reader, store)
    }

    fn spool_into<R: Read>(reader: R, store: TempDir) -> Result<Self> {
        let mut state = SpoolState::new(store.path());

        let mut deserializer = serde_json::Deserializer::from_reader(reader);
        let spooled = PayloadSpooler { state: &mut state }.deserialize(&mut deserializer);

        if let Err(err) = spooled {
            if let Some(io_err) = state.io_error.take() {
                return Err(Error::Io(io_err));
            }
            return Err(classify(err));
        }
        deserializer.end().map_err(classify)?;

        debug!(
            fields = state.keys.len(),
            first_matches = state.first_matches.len(),
            store = %store.path().display(),
            "spooled new session payload to disk"
        );

        Ok(Self {
            store,
            keys: state.keys,
            metadata: state.metadata,
            desired: state.desired,
            always: state.always,
            first_matches: state.first_matches,
            first_match_read: state.first_match_read,
        })
    }

    /// Top-level field names, in body order.
    pub(crate) fn keys(&self) -> Vec<String> {
        self.keys.clone()
    }

    /// Returns `true` if the top-level field exists.
    pub(crate) fn contains_key(&self, key: &str) -> bool {
        self.keys.iter().any(|name| name == key)
    }

    /// Re-reads a metadata field from its spool file, if present.
    pub(crate) fn metadata_entry(&self, key: &str) -> Result<Option<Value>> {
        match self.metadata.get(key) {
            None => Ok(None),
            Some(path) => read_value(path).map(Some),
        }
    }

    /// Re-reads the legacy `desiredCapabilities` map, if present.
    pub(crate) fn desired_capabilities(&self) -> Result<Option<CapabilitySet>> {
        match &self.desired {
            None => Ok(None),
            Some(path) => {
                let value = read_value(path)?;
                as_capability_map(&value).map(Some)
            }
        }
    }

    /// Re-reads the `capabilities.alwaysMatch` map, empty if absent.
    pub(crate) fn always_match(&self) -> Result<CapabilitySet> {
        match &self.always {
            None => Ok(CapabilitySet::new()),
            Some(path) => {
                let value = read_value(path)?;
                as_capability_map(&value)
            }
        }
    }

    /// Re-reads the `capabilities.firstMatch` entries, in body order.
    pub(crate) fn first_matches(&self) -> Result<Vec<CapabilitySet>> {
        if !self.first_match_read {
            return Ok(vec![CapabilitySet::new()]);
        }
        if self.first_matches.is_empty() {
            return Err(Error::structural(
                "Expected firstMatch to have at least one value",
            ));
        }

        self.first_matches
            .iter()
            .map(|path| {
                let value = read_value(path)?;
                as_capability_map(&value)
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn store_path(&self) -> &Path {
        self.store.path()
    }
}

/// Maps a spool-stage JSON error: shape violations raised by the visitors
/// surface as data errors, real syntax problems stay JSON errors.
fn classify(err: serde_json::Error) -> Error {
    if err.classify() == serde_json::error::Category::Data {
        Error::structural(err.to_string())
    } else {
        Error::Json(err)
    }
}

fn read_value(path: &Path) -> Result<Value> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

// ============================================================================
// SpoolState
// ============================================================================

/// Mutable bookkeeping shared by the spooling visitors.
struct SpoolState {
    dir: PathBuf,
    keys: Vec<String>,
    metadata: BTreeMap<String, PathBuf>,
    desired: Option<PathBuf>,
    always: Option<PathBuf>,
    first_matches: Vec<PathBuf>,
    first_match_read: bool,
    metadata_count: usize,
    io_error: Option<io::Error>,
}

impl SpoolState {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            keys: Vec::new(),
            metadata: BTreeMap::new(),
            desired: None,
            always: None,
            first_matches: Vec::new(),
            first_match_read: false,
            metadata_count: 0,
            io_error: None,
        }
    }

    /// Writes one field's value to its spool file. On IO failure the
    /// error is stashed so the caller can surface it as [`Error::Io`]
    /// instead of a mislabeled JSON error.
    fn write_value(&mut self, path: &Path, value: &Value) -> std::result::Result<(), String> {
        match try_write(path, value) {
            Ok(()) => Ok(()),
            Err(err) => {
                let message = format!("failed to spool payload field: {err}");
                self.io_error = Some(err);
                Err(message)
            }
        }
    }
}

fn try_write(path: &Path, value: &Value) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, value).map_err(io::Error::other)?;
    writer.flush()
}

// ============================================================================
// Spooling Visitors
// ============================================================================

/// Seed for the top-level payload object.
struct PayloadSpooler<'a> {
    state: &'a mut SpoolState,
}

impl<'de> DeserializeSeed<'de> for PayloadSpooler<'_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for PayloadSpooler<'_> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a new session payload object")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        while let Some(name) = map.next_key::<String>()? {
            self.state.keys.push(name.clone());

            match name.as_str() {
                "desiredCapabilities" => {
                    let value: Value = map.next_value()?;
                    let path = self.state.dir.join("desired.json");
                    self.state
                        .write_value(&path, &value)
                        .map_err(de::Error::custom)?;
                    self.state.desired = Some(path);
                }

                "capabilities" => {
                    map.next_value_seed(CapabilitiesSpooler {
                        state: &mut *self.state,
                    })?;
                }

                // Older clients still send this; recognized and dropped.
                "requiredCapabilities" => {
                    let _ = map.next_value::<IgnoredAny>()?;
                }

                _ => {
                    let value: Value = map.next_value()?;
                    let path = self
                        .state
                        .dir
                        .join("metadata")
                        .join(format!("{}.json", self.state.metadata_count));
                    self.state.metadata_count += 1;
                    self.state
                        .write_value(&path, &value)
                        .map_err(de::Error::custom)?;
                    self.state.metadata.insert(name, path);
                }
            }
        }
        Ok(())
    }
}

/// Seed for the `capabilities` object.
struct CapabilitiesSpooler<'a> {
    state: &'a mut SpoolState,
}

impl<'de> DeserializeSeed<'de> for CapabilitiesSpooler<'_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for CapabilitiesSpooler<'_> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a capabilities object")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        while let Some(name) = map.next_key::<String>()? {
            match name.as_str() {
                "alwaysMatch" => {
                    let value: Value = map.next_value()?;
                    let path = self.state.dir.join("always.json");
                    self.state
                        .write_value(&path, &value)
                        .map_err(de::Error::custom)?;
                    self.state.always = Some(path);
                }

                "firstMatch" => {
                    map.next_value_seed(FirstMatchSpooler {
                        state: &mut *self.state,
                    })?;
                }

                _ => {
                    let _ = map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(())
    }
}

/// Seed for the `firstMatch` value: a list of entries, each spooled to
/// its own indexed file, or null (treated as absent).
struct FirstMatchSpooler<'a> {
    state: &'a mut SpoolState,
}

impl<'de> DeserializeSeed<'de> for FirstMatchSpooler<'_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for FirstMatchSpooler<'_> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a list of capability maps")
    }

    fn visit_unit<E>(self) -> std::result::Result<(), E>
    where
        E: de::Error,
    {
        // Explicit null is treated like an absent firstMatch.
        Ok(())
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        self.state.first_match_read = true;

        let mut index = 0usize;
        while let Some(value) = seq.next_element::<Value>()? {
            let path = self
                .state
                .dir
                .join("firstMatch")
                .join(format!("{index}.json"));
            index += 1;
            self.state
                .write_value(&path, &value)
                .map_err(de::Error::custom)?;
            self.state.first_matches.push(path);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
