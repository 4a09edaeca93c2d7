use std::{collections::HashMap, fs, io, path::Path};

use thiserror::Error;
use tracing::{debug, info, warn};

/// What to do with a config line that isn't `address,id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// Log the line and keep going.
    #[default]
    Skip,
    /// Refuse the whole file.
    FailFast,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    #[error("expected `address,id`, found {0} field(s)")]
    FieldCount(usize),
    #[error("address is empty")]
    EmptyAddress,
    #[error("invalid device id {0:?}")]
    InvalidId(String),
}

#[derive(Debug, Error)]
pub enum AddressTableError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: LineError,
    },
}

/// Parses one `address,id` line. Blank lines carry no entry.
pub fn parse_line(line: &str) -> Result<Option<(String, u32)>, LineError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [address, id] = fields[..] else {
        return Err(LineError::FieldCount(fields.len()));
    };
    if address.is_empty() {
        return Err(LineError::EmptyAddress);
    }
    let id = id
        .parse()
        .map_err(|_| LineError::InvalidId(id.to_owned()))?;

    Ok(Some((address.to_owned(), id)))
}

/// Device id to network address, loaded once at startup and read-only after.
#[derive(Debug, Clone, Default)]
pub struct AddressTable {
    addresses: HashMap<u32, String>,
}

impl AddressTable {
    /// Later lines win when an id appears more than once.
    pub fn load<I, S>(lines: I, policy: LoadPolicy) -> Result<Self, AddressTableError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut addresses = HashMap::new();
        for (index, line) in lines.into_iter().enumerate() {
            let line_no = index + 1;
            match parse_line(line.as_ref()) {
                Ok(Some((address, id))) => {
                    if let Some(old) = addresses.insert(id, address) {
                        debug!("device {id}: {old} replaced by line {line_no}");
                    }
                }
                Ok(None) => {}
                Err(source) => match policy {
                    LoadPolicy::Skip => warn!("skipping address line {line_no}: {source}"),
                    LoadPolicy::FailFast => {
                        return Err(AddressTableError::Line {
                            line: line_no,
                            source,
                        })
                    }
                },
            }
        }
        Ok(Self { addresses })
    }

    pub fn from_file(
        path: impl AsRef<Path>,
        policy: LoadPolicy,
    ) -> Result<Self, AddressTableError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| AddressTableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load(contents.lines(), policy)
    }

    /// Like [`AddressTable::from_file`], but a missing or unreadable file
    /// only costs device resolution, so it yields an empty table.
    pub fn load_or_empty(
        path: impl AsRef<Path>,
        policy: LoadPolicy,
    ) -> Result<Self, AddressTableError> {
        match Self::from_file(path, policy) {
            Ok(table) => {
                info!("{} device addresses loaded", table.len());
                Ok(table)
            }
            Err(err @ AddressTableError::Io { .. }) => {
                warn!("{err}; device status relay has no addresses");
                Ok(Self::default())
            }
            Err(err) => Err(err),
        }
    }

    pub fn resolve(&self, id: u32) -> Option<&str> {
        self.addresses.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.addresses.iter().map(|(id, address)| (*id, address.as_str()))
    }
}
