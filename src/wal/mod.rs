mod record;

pub use record::{ReplayHandler, WalSample};
pub(crate) use record::WalRecord;

use crate::error::{HeadError, HeadResult};
use crate::labels::LabelSet;
use log::warn;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

const OP_BATCH: u8 = 1;

/// Ordered, append-only, replayable log of series-declaration and
/// sample-batch records backing a `HeadBlock`'s durability.
///
/// On-disk framing per record: `[op: u8][len: u32 LE][payload: len
/// bytes][crc32: u32 LE]`, where `payload` is the bincode encoding of a
/// `WalRecord`. The file format and fsync cadence are an implementation
/// detail of this particular durability backend, not something
/// `HeadBlock`'s correctness depends on structurally.
pub struct Wal {
    path: PathBuf,
    file: Mutex<File>,
    #[allow(dead_code)]
    flush_interval: Duration,
}

impl Wal {
    /// Opens (creating if absent) the WAL file under `dir`. `flush_interval`
    /// is accepted in the signature but unused for now: every `log` call
    /// fsyncs before returning, which gives the strongest possible
    /// durability guarantee (samples are acknowledged to the caller only
    /// after they've been logged to disk) and is the simplest way to get
    /// that right without a background flush thread.
    pub fn open(dir: impl AsRef<Path>, flush_interval: Duration) -> HeadResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(wal_write_err)?;
        let path = dir.join("wal.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(wal_write_err)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            flush_interval,
        })
    }

    /// Atomically appends a record of newly declared label sets followed by
    /// the sample batch that references them. A no-op (no disk I/O at all)
    /// when both are empty.
    pub fn log(&self, new_series: &[LabelSet], samples: &[WalSample]) -> HeadResult<()> {
        if new_series.is_empty() && samples.is_empty() {
            return Ok(());
        }
        let record = WalRecord {
            series: new_series.to_vec(),
            samples: samples.to_vec(),
        };
        let payload = bincode::serde::encode_to_vec(&record, bincode::config::standard())
            .map_err(|e| HeadError::WalWrite(e.to_string()))?;
        let crc = crc32fast::hash(&payload);

        let mut file = self.file.lock().expect("wal file mutex poisoned");
        file.write_all(&[OP_BATCH]).map_err(wal_write_err)?;
        file.write_all(&(payload.len() as u32).to_le_bytes())
            .map_err(wal_write_err)?;
        file.write_all(&payload).map_err(wal_write_err)?;
        file.write_all(&crc.to_le_bytes()).map_err(wal_write_err)?;
        file.sync_data().map_err(wal_write_err)?;
        Ok(())
    }

    /// Replays every record in file order, invoking `handler.series` for
    /// each declaration and `handler.sample` for each sample in the order
    /// they were originally logged. Stops cleanly, without error, on a
    /// truncated trailing record (the one write a crash mid-append can
    /// leave behind), but treats any other structural mismatch as a
    /// genuine read failure.
    pub fn read_all(&self, handler: &mut impl ReplayHandler) -> HeadResult<()> {
        let mut file = File::open(&self.path).map_err(|e| HeadError::WalRead(e.to_string()))?;
        loop {
            let mut op = [0u8; 1];
            match file.read_exact(&mut op) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(HeadError::WalRead(e.to_string())),
            }
            if op[0] != OP_BATCH {
                return Err(HeadError::WalRead(format!(
                    "unknown WAL record op {}",
                    op[0]
                )));
            }

            let mut len_buf = [0u8; 4];
            if read_or_break(&mut file, &mut len_buf)? {
                warn!("wal: truncated record length at tail, stopping replay");
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            if read_or_break(&mut file, &mut payload)? {
                warn!("wal: truncated record payload at tail, stopping replay");
                break;
            }

            let mut crc_buf = [0u8; 4];
            if read_or_break(&mut file, &mut crc_buf)? {
                warn!("wal: truncated record checksum at tail, stopping replay");
                break;
            }
            let expected_crc = u32::from_le_bytes(crc_buf);
            if crc32fast::hash(&payload) != expected_crc {
                warn!("wal: checksum mismatch on trailing record, stopping replay");
                break;
            }

            let (record, _): (WalRecord, usize) =
                bincode::serde::decode_from_slice(&payload, bincode::config::standard())
                    .map_err(|e| HeadError::WalRead(e.to_string()))?;

            for labels in record.series {
                handler.series(labels)?;
            }
            for sample in record.samples {
                handler.sample(sample)?;
            }
        }
        Ok(())
    }

    /// Flushes and releases the underlying file handle.
    pub fn close(self) -> HeadResult<()> {
        let file = self.file.lock().expect("wal file mutex poisoned");
        file.sync_all().map_err(wal_write_err)
    }
}

/// Reads exactly `buf.len()` bytes, reporting `Ok(true)` if the stream hit
/// EOF partway through (a torn trailing write) rather than erroring.
fn read_or_break(file: &mut File, buf: &mut [u8]) -> HeadResult<bool> {
    match file.read_exact(buf) {
        Ok(()) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(true),
        Err(e) => Err(HeadError::WalRead(e.to_string())),
    }
}

fn wal_write_err(e: io::Error) -> HeadError {
    HeadError::WalWrite(e.to_string())
}
