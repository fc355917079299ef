//! ## swen-link::generic_cmd
//! **Learned raw-command log in non-volatile storage**
//!
//! Lets small RF remotes teach arbitrary raw codes to a receiver without any
//! protocol awareness. The log is a magic-guarded, append-only sequence of
//! `{length:1B, cmd:1B, payload[length-2]}` records in byte-addressed
//! non-volatile storage. Recording rejects byte-exact duplicate payloads;
//! deletion tombstones a record in place and wipes the whole log once every
//! record is a tombstone; replay returns the exact stored bytes.

use thiserror::Error;
use tracing::{debug, info};

/// First byte of an initialized log.
pub const LOG_MAGIC: u8 = 0xA7;

/// Erased-storage value; also the in-place tombstone command id.
pub const CMD_TOMBSTONE: u8 = 0xFF;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CmdError {
    #[error("payload already recorded")]
    Duplicate,
    #[error("command log full")]
    Full,
    #[error("no such command")]
    NotFound,
    #[error("payload length unsupported")]
    BadLength,
}

/// Byte-addressed non-volatile storage. EEPROM on the original target; an
/// in-memory buffer in tests and simulation.
pub trait NvStore {
    fn size(&self) -> usize;
    fn read(&self, offset: usize, buf: &mut [u8]);
    fn write(&mut self, offset: usize, data: &[u8]);
}

impl<T: NvStore + ?Sized> NvStore for Box<T> {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) {
        (**self).read(offset, buf)
    }

    fn write(&mut self, offset: usize, data: &[u8]) {
        (**self).write(offset, data)
    }
}

/// In-memory store, erased to 0xFF like EEPROM.
pub struct MemNvStore {
    bytes: Vec<u8>,
}

impl MemNvStore {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0xFF; size],
        }
    }
}

impl NvStore for MemNvStore {
    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) {
        buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
    }

    fn write(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }
}

struct Record {
    offset: usize,
    len: u8,
    cmd: u8,
}

impl Record {
    fn payload_len(&self) -> usize {
        self.len as usize - 2
    }

    fn is_tombstone(&self) -> bool {
        self.cmd == CMD_TOMBSTONE
    }
}

/// The generic-command log over some non-volatile store.
pub struct CommandLog<S: NvStore> {
    store: S,
}

impl<S: NvStore> CommandLog<S> {
    /// Opens the log, formatting the store if the magic byte is absent.
    pub fn open(store: S) -> Self {
        let mut log = Self { store };
        let mut magic = [0u8; 1];
        log.store.read(0, &mut magic);
        if magic[0] != LOG_MAGIC {
            log.wipe();
        }
        log
    }

    fn wipe(&mut self) {
        let fill = vec![0xFF; self.store.size()];
        self.store.write(0, &fill);
        self.store.write(0, &[LOG_MAGIC]);
        info!("command log formatted");
    }

    fn records(&self) -> Vec<Record> {
        let mut records = Vec::new();
        let mut offset = 1;
        loop {
            if offset + 2 > self.store.size() {
                break;
            }
            let mut hdr = [0u8; 2];
            self.store.read(offset, &mut hdr);
            let (len, cmd) = (hdr[0], hdr[1]);
            if len == 0xFF || len < 2 || offset + len as usize > self.store.size() {
                break;
            }
            records.push(Record { offset, len, cmd });
            offset += len as usize;
        }
        records
    }

    fn payload_of(&self, rec: &Record) -> Vec<u8> {
        let mut payload = vec![0u8; rec.payload_len()];
        self.store.read(rec.offset + 2, &mut payload);
        payload
    }

    /// Appends a learned payload under command id `cmd`. Byte-exact
    /// duplicate payloads are rejected.
    pub fn record(&mut self, cmd: u8, payload: &[u8]) -> Result<u8, CmdError> {
        if payload.is_empty() || payload.len() > 253 {
            return Err(CmdError::BadLength);
        }
        if cmd == CMD_TOMBSTONE {
            return Err(CmdError::BadLength);
        }

        let records = self.records();
        for rec in &records {
            if !rec.is_tombstone() && self.payload_of(rec) == payload {
                return Err(CmdError::Duplicate);
            }
        }

        let end = records
            .last()
            .map_or(1, |rec| rec.offset + rec.len as usize);
        let record_len = payload.len() + 2;
        if end + record_len > self.store.size() {
            return Err(CmdError::Full);
        }

        self.store.write(end, &[record_len as u8, cmd]);
        self.store.write(end + 2, payload);
        debug!(cmd, len = payload.len(), "generic command recorded");
        Ok(records.len() as u8)
    }

    /// Tombstones the record carrying command id `cmd`. When every record is
    /// a tombstone the log is wiped back to just its magic byte.
    pub fn delete(&mut self, cmd: u8) -> Result<(), CmdError> {
        let records = self.records();
        let rec = records
            .iter()
            .find(|r| !r.is_tombstone() && r.cmd == cmd)
            .ok_or(CmdError::NotFound)?;
        self.store.write(rec.offset + 1, &[CMD_TOMBSTONE]);

        if self
            .records()
            .iter()
            .all(|r| r.is_tombstone())
        {
            self.wipe();
        }
        Ok(())
    }

    /// Index of the live record carrying command id `cmd`.
    pub fn lookup(&self, cmd: u8) -> Option<u8> {
        self.records()
            .iter()
            .position(|r| !r.is_tombstone() && r.cmd == cmd)
            .map(|i| i as u8)
    }

    /// The exact stored payload of record `index`, tombstones excluded.
    pub fn replay(&self, index: u8) -> Option<Vec<u8>> {
        let records = self.records();
        let rec = records.get(index as usize)?;
        if rec.is_tombstone() {
            return None;
        }
        Some(self.payload_of(rec))
    }

    /// Matches raw received bytes against the stored payloads; returns the
    /// command id on a byte-exact hit. This is the secondary matcher frames
    /// too short for SWEN framing are offered to.
    pub fn match_payload(&self, bytes: &[u8]) -> Option<u8> {
        self.records()
            .iter()
            .find(|r| !r.is_tombstone() && self.payload_of(r) == bytes)
            .map(|r| r.cmd)
    }

    /// Number of live records.
    pub fn live_count(&self) -> usize {
        self.records().iter().filter(|r| !r.is_tombstone()).count()
    }
}
