//! Write-ahead log: an append-only record of page images, replayed on open
//! to recover from a crash that happened between a mutation and its
//! checkpoint.
//!
//! Layout on disk: a [`WalHeader`] followed by zero or more frames, each a
//! [`FrameHeader`] immediately followed by one raw 4096-byte page image.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bincode::{Decode, Encode};
use tracing::{info, warn};

use crate::errors::Error;
use crate::storage::btree::PAGE_SIZE;
use crate::storage::pager::Pager;

pub const WAL_MAGIC: u32 = 0x377F_0682;
pub const WAL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct WalHeader {
    pub magic: u32,
    pub version: u32,
    pub page_size: u32,
    pub checkpoint_seq: u32,
    pub salt1: u32,
    pub salt2: u32,
    pub checksum1: u32,
    pub checksum2: u32,
}

const WAL_HEADER_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct FrameHeader {
    pub page_number: u32,
    pub db_size: u32,
    pub salt1: u32,
    pub salt2: u32,
    pub checksum1: u32,
    pub checksum2: u32,
}

const FRAME_HEADER_SIZE: usize = 24;

pub struct Wal {
    file: File,
    path: PathBuf,
    pub header: WalHeader,
    pub frame_count: u32,
}

/// Cumulative checksum over 32-bit little-endian words, seeded by `(s1, s2)`.
/// Matches the scheme used to checksum both a frame's page image and its
/// header prefix; two running sums diffuse every word into both accumulators
/// so a single flipped bit anywhere changes both outputs.
fn wal_checksum(data: &[u8], mut s1: u32, mut s2: u32) -> (u32, u32) {
    for chunk in data.chunks(4) {
        let mut word_bytes = [0u8; 4];
        word_bytes[..chunk.len()].copy_from_slice(chunk);
        let word = u32::from_le_bytes(word_bytes);
        s1 = s1.wrapping_add(word).wrapping_add(s2);
        s2 = s2.wrapping_add(word).wrapping_add(s1);
    }
    (s1, s2)
}

fn encode_header<T: Encode, const N: usize>(value: &T) -> Result<[u8; N], Error> {
    let mut buf = [0u8; N];
    let written = bincode::encode_into_slice(value, &mut buf, bincode::config::standard())?;
    if written > N {
        return Err(crate::err!(IOFatal, "header encodes to {} bytes, expected <= {}", written, N));
    }
    Ok(buf)
}

fn decode_header<T: Decode<()>>(buf: &[u8]) -> Result<T, Error> {
    let (value, _) = bincode::decode_from_slice(buf, bincode::config::standard())?;
    Ok(value)
}

impl Wal {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, Error> {
        let mut path = db_path.as_ref().as_os_str().to_owned();
        path.push("-wal");
        let path = PathBuf::from(path);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let len = file.seek(SeekFrom::End(0))?;

        let header = if len >= WAL_HEADER_SIZE as u64 {
            let mut buf = [0u8; WAL_HEADER_SIZE];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut buf)?;
            match decode_header::<WalHeader>(&buf) {
                Ok(h) if h.magic == WAL_MAGIC => h,
                _ => {
                    warn!("WAL header invalid, reinitializing {:?}", path);
                    fresh_header()
                }
            }
        } else {
            fresh_header()
        };

        let frame_count = if len > WAL_HEADER_SIZE as u64 {
            ((len - WAL_HEADER_SIZE as u64) / (FRAME_HEADER_SIZE + PAGE_SIZE) as u64) as u32
        } else {
            0
        };

        let mut wal = Wal {
            file,
            path,
            header,
            frame_count,
        };
        if len < WAL_HEADER_SIZE as u64 {
            wal.write_header()?;
        }
        Ok(wal)
    }

    fn write_header(&mut self) -> Result<(), Error> {
        let buf: [u8; WAL_HEADER_SIZE] = encode_header(&self.header)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&buf)?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn write_frame(&mut self, page_num: u32, page: &[u8; PAGE_SIZE], db_size: u32) -> Result<(), Error> {
        let (c1a, c1b) = wal_checksum(page, self.header.salt1, self.header.salt2);
        let checksum1 = c1a ^ c1b;

        let mut prefix = Vec::with_capacity(8);
        prefix.extend_from_slice(&page_num.to_le_bytes());
        prefix.extend_from_slice(&db_size.to_le_bytes());
        prefix.extend_from_slice(&self.header.salt1.to_le_bytes());
        prefix.extend_from_slice(&self.header.salt2.to_le_bytes());
        let (c2a, c2b) = wal_checksum(&prefix, checksum1, checksum1);
        let checksum2 = c2a ^ c2b;

        let frame_header = FrameHeader {
            page_number: page_num,
            db_size,
            salt1: self.header.salt1,
            salt2: self.header.salt2,
            checksum1,
            checksum2,
        };
        let header_buf: [u8; FRAME_HEADER_SIZE] = encode_header(&frame_header)?;

        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&header_buf)?;
        self.file.write_all(page)?;
        self.file.sync_all()?;
        self.frame_count += 1;
        Ok(())
    }

    /// Replays frames in append order, applying each to `pager` as long as
    /// its checksum validates against the header's salts. The first mismatch
    /// ends replay without error -- a torn tail from a crash mid-append is
    /// expected, not corruption.
    pub fn recover(&mut self, pager: &mut Pager) -> Result<(), Error> {
        if self.frame_count == 0 {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(WAL_HEADER_SIZE as u64))?;
        let mut applied = 0;
        for _ in 0..self.frame_count {
            let mut header_buf = [0u8; FRAME_HEADER_SIZE];
            if self.file.read_exact(&mut header_buf).is_err() {
                break;
            }
            let frame_header: FrameHeader = match decode_header(&header_buf) {
                Ok(h) => h,
                Err(_) => break,
            };
            let mut page = [0u8; PAGE_SIZE];
            if self.file.read_exact(&mut page).is_err() {
                break;
            }
            let (c1a, c1b) = wal_checksum(&page, frame_header.salt1, frame_header.salt2);
            if (c1a ^ c1b) != frame_header.checksum1 {
                warn!(
                    page = frame_header.page_number,
                    "WAL checksum mismatch, stopping replay (torn tail)"
                );
                break;
            }
            let node = pager.get_mut(frame_header.page_number)?;
            node.data.copy_from_slice(&page);
            applied += 1;
        }
        info!(frames = applied, "replayed WAL frames");
        self.checkpoint(pager)?;
        Ok(())
    }

    /// Flushes every resident page, truncates the log back to just its
    /// header, and bumps `checkpoint_seq`.
    pub fn checkpoint(&mut self, pager: &mut Pager) -> Result<(), Error> {
        pager.flush_all()?;
        self.file.set_len(WAL_HEADER_SIZE as u64)?;
        self.header.checkpoint_seq += 1;
        self.frame_count = 0;
        self.write_header()?;
        Ok(())
    }

    pub fn begin_transaction(&mut self) -> Result<(), Error> {
        Ok(())
    }

    pub fn commit_transaction(&mut self) -> Result<(), Error> {
        self.file.sync_all()?;
        Ok(())
    }

    pub fn rollback_transaction(&self) {
        warn!("rollback requested; write-ahead log has no undo support, no-op");
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn fresh_header() -> WalHeader {
    let salt1 = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);
    let salt2 = std::process::id();
    WalHeader {
        magic: WAL_MAGIC,
        version: WAL_VERSION,
        page_size: PAGE_SIZE as u32,
        checkpoint_seq: 0,
        salt1,
        salt2,
        checksum1: 0,
        checksum2: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::btree::{initialize_leaf_node, Node};
    use tempfile::NamedTempFile;

    #[test]
    fn fresh_wal_has_valid_header() {
        let tmp = NamedTempFile::new().unwrap();
        let wal = Wal::open(tmp.path()).unwrap();
        assert_eq!(wal.header.magic, WAL_MAGIC);
        assert_eq!(wal.frame_count, 0);
    }

    #[test]
    fn write_and_recover_frame() {
        let db = NamedTempFile::new().unwrap();
        let mut page = [0u8; PAGE_SIZE];
        page[100] = 0xAB;

        {
            let mut wal = Wal::open(db.path()).unwrap();
            wal.write_frame(0, &page, 1).unwrap();
        }

        let mut wal = Wal::open(db.path()).unwrap();
        assert_eq!(wal.frame_count, 1);
        let mut pager = Pager::open(db.path(), 291, 100).unwrap();
        let mut fresh = Node::new([0u8; PAGE_SIZE], 291);
        initialize_leaf_node(&mut fresh);
        pager.put(0, fresh).unwrap();
        wal.recover(&mut pager).unwrap();
        assert_eq!(pager.get(0).unwrap().as_slice()[100], 0xAB);
        // checkpoint truncated the log
        assert_eq!(wal.frame_count, 0);
    }

    #[test]
    fn torn_tail_is_tolerated() {
        let db = NamedTempFile::new().unwrap();
        let good = [0u8; PAGE_SIZE];
        {
            let mut wal = Wal::open(db.path()).unwrap();
            wal.write_frame(0, &good, 1).unwrap();
            // Corrupt the just-written frame's checksum by truncating mid-page,
            // simulating a crash during append.
            let wal_path = wal.path().to_path_buf();
            drop(wal);
            let f = OpenOptions::new().write(true).open(&wal_path).unwrap();
            f.set_len(WAL_HEADER_SIZE as u64 + FRAME_HEADER_SIZE as u64 + 10).unwrap();
        }
        let mut wal = Wal::open(db.path()).unwrap();
        let mut pager = Pager::open(db.path(), 291, 100).unwrap();
        let mut fresh = Node::new([0u8; PAGE_SIZE], 291);
        initialize_leaf_node(&mut fresh);
        pager.put(0, fresh).unwrap();
        assert!(wal.recover(&mut pager).is_ok());
    }
}
