use crate::types::{ConfigFlag, LayerId};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by a persistence driver. Always recovered locally with
/// built-in defaults; never reaches the input-handling path.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Backing store for the default-layer selection and the flags blob.
/// Hardware (EEPROM) implementations live outside this crate; the two
/// drivers here cover tests and host-side use.
pub trait PersistenceDriver {
    fn read_default_layer(&mut self) -> Result<LayerId, StoreError>;
    fn write_default_layer(&mut self, layer: LayerId) -> Result<(), StoreError>;
    fn read_flags(&mut self) -> Result<Vec<u8>, StoreError>;
    fn write_flags(&mut self, blob: &[u8]) -> Result<(), StoreError>;
}

/// Configuration bitfield carried in the flags blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigFlags {
    bits: u8,
}

impl ConfigFlags {
    pub fn get(self, flag: ConfigFlag) -> bool {
        self.bits & flag.bit() != 0
    }

    pub fn set(&mut self, flag: ConfigFlag, on: bool) {
        if on {
            self.bits |= flag.bit();
        } else {
            self.bits &= !flag.bit();
        }
    }

    pub fn toggle(&mut self, flag: ConfigFlag) -> bool {
        self.bits ^= flag.bit();
        self.get(flag)
    }

    pub fn to_blob(self) -> Vec<u8> {
        vec![self.bits]
    }

    /// Unknown bits in a longer blob are ignored, an empty blob decodes to
    /// the defaults.
    pub fn from_blob(blob: &[u8]) -> Self {
        Self {
            bits: blob.first().copied().unwrap_or(0),
        }
    }
}

/// Volatile driver for tests and simulations. `fail_writes` makes every
/// write report an error so non-fatal handling can be exercised.
#[derive(Debug, Default)]
pub struct MemoryStore {
    default_layer: Option<LayerId>,
    flags: Option<Vec<u8>>,
    pub fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_layer(layer: LayerId) -> Self {
        Self {
            default_layer: Some(layer),
            flags: None,
            fail_writes: false,
        }
    }
}

impl PersistenceDriver for MemoryStore {
    fn read_default_layer(&mut self) -> Result<LayerId, StoreError> {
        self.default_layer
            .ok_or_else(|| StoreError::Unavailable("no record".into()))
    }

    fn write_default_layer(&mut self, layer: LayerId) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Unavailable("write disabled".into()));
        }
        self.default_layer = Some(layer);
        Ok(())
    }

    fn read_flags(&mut self) -> Result<Vec<u8>, StoreError> {
        self.flags
            .clone()
            .ok_or_else(|| StoreError::Unavailable("no record".into()))
    }

    fn write_flags(&mut self, blob: &[u8]) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Unavailable("write disabled".into()));
        }
        self.flags = Some(blob.to_vec());
        Ok(())
    }
}

const RECORD_VERSION: u8 = 1;

/// Host-side driver persisting a single small record:
/// `[version, default_layer, flags_len, flags...]`.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_record(&self) -> Result<(LayerId, Vec<u8>), StoreError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::Unavailable("no record file".into()))
            }
            Err(e) => return Err(e.into()),
        };
        if raw.len() < 3 {
            return Err(StoreError::Corrupt(format!("record of {} bytes", raw.len())));
        }
        if raw[0] != RECORD_VERSION {
            return Err(StoreError::Corrupt(format!("unknown version {}", raw[0])));
        }
        let flags_len = raw[2] as usize;
        if raw.len() < 3 + flags_len {
            return Err(StoreError::Corrupt("truncated flags blob".into()));
        }
        Ok((raw[1], raw[3..3 + flags_len].to_vec()))
    }

    fn write_record(&self, layer: LayerId, flags: &[u8]) -> Result<(), StoreError> {
        let mut raw = Vec::with_capacity(3 + flags.len());
        raw.push(RECORD_VERSION);
        raw.push(layer);
        raw.push(flags.len() as u8);
        raw.extend_from_slice(flags);
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl PersistenceDriver for FileStore {
    fn read_default_layer(&mut self) -> Result<LayerId, StoreError> {
        self.read_record().map(|(layer, _)| layer)
    }

    fn write_default_layer(&mut self, layer: LayerId) -> Result<(), StoreError> {
        let flags = self.read_record().map(|(_, f)| f).unwrap_or_default();
        self.write_record(layer, &flags)
    }

    fn read_flags(&mut self) -> Result<Vec<u8>, StoreError> {
        self.read_record().map(|(_, flags)| flags)
    }

    fn write_flags(&mut self, blob: &[u8]) -> Result<(), StoreError> {
        let layer = self.read_record().map(|(l, _)| l).unwrap_or(0);
        self.write_record(layer, blob)
    }
}
