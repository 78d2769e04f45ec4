//! Persisted registry of provisioned devices.
//!
//! The registry is an ordered sequence of device records kept as one
//! pretty-printed JSON file. It is loaded once per run, mutated in memory (at
//! most one record added or updated) and written back wholesale. The JSON
//! field names are a stable contract; other tooling reads this file.

use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hwid_adb::props::SerialCandidate;
use hwid_util::write_json_atomic;

/// Number assigned to the first device when the registry starts out empty.
/// Devices provisioned before this tool existed occupy the lower range.
pub const DEFAULT_FIRST_NUMBER: i64 = 344;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read registry {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse registry {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write registry {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// One provisioned physical device. `number` is chosen by the operator at
/// creation time and never changes afterwards; matching identity is
/// `serial.value` alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub number: i64,
    pub serial: SerialCandidate,
    #[serde(default)]
    pub secondary_id: String,
    pub added_at_unix_millis: i64,
}

#[derive(Debug, Default)]
pub struct Registry {
    records: Vec<DeviceRecord>,
}

impl Registry {
    /// Loads the registry from `path`. A missing file is an empty registry,
    /// not an error; unreadable or malformed content is fatal.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(RegistryError::Read {
                    path: path.display().to_string(),
                    source: err,
                });
            }
        };
        let records =
            serde_json::from_str::<Vec<DeviceRecord>>(&data).map_err(|err| RegistryError::Parse {
                path: path.display().to_string(),
                source: err,
            })?;
        Ok(Self { records })
    }

    /// Writes the full ordered sequence back to `path`. Called at most once
    /// per run, after the in-memory mutation is fully decided.
    pub fn store(&self, path: &Path) -> Result<(), RegistryError> {
        write_json_atomic(path, &self.records).map_err(|err| RegistryError::Write {
            path: path.display().to_string(),
            source: err,
        })
    }

    pub fn records(&self) -> &[DeviceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record whose `serial.value` equals `value`, by exact string
    /// equality. The serial key plays no part in matching.
    pub fn find_by_serial_value(&self, value: &str) -> Option<&DeviceRecord> {
        self.records
            .iter()
            .find(|record| record.serial.value == value)
    }

    /// Suggested number for the next new device: the last record's number
    /// plus one, or [`DEFAULT_FIRST_NUMBER`] when the registry is empty. The
    /// operator may override the suggestion.
    pub fn next_suggested_number(&self) -> i64 {
        match self.records.last() {
            Some(record) => record.number + 1,
            None => DEFAULT_FIRST_NUMBER,
        }
    }

    /// Matches `serial` against the registry and applies the run's mutation.
    /// An existing record keeps its number and creation time, and picks up
    /// `secondary_id` only when a non-empty one was supplied. A new record is
    /// appended with the operator-confirmed `number` and the current time.
    pub fn upsert(
        &mut self,
        number: i64,
        serial: SerialCandidate,
        secondary_id: &str,
    ) -> &DeviceRecord {
        if let Some(index) = self
            .records
            .iter()
            .position(|record| record.serial.value == serial.value)
        {
            if !secondary_id.is_empty() {
                self.records[index].secondary_id = secondary_id.to_string();
            }
            return &self.records[index];
        }

        self.records.push(DeviceRecord {
            number,
            serial,
            secondary_id: secondary_id.to_string(),
            added_at_unix_millis: hwid_util::now_millis(),
        });
        let last = self.records.len() - 1;
        &self.records[last]
    }
}
