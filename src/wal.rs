//! Commit log for the store.
//!
//! Every committed transaction becomes one frame:
//!
//! ```text
//! [u32 le: payload length][bincode Vec<Change>][u32 le: crc32 of payload]
//! ```
//!
//! A frame is replayed whole or not at all. Replay stops at the first frame
//! that is short, fails its checksum or does not decode; everything before it
//! is the durable state.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Change;

fn encode_commit(out: &mut impl Write, changes: &[Change]) -> io::Result<()> {
    let payload =
        bincode::serialize(changes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut frame = Vec::with_capacity(payload.len() + 8);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    out.write_all(&frame)
}

/// Fill `buf` completely, or report `false` if the log ends first.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Next intact commit, or `None` at the end of the usable log.
fn read_commit(reader: &mut impl Read) -> io::Result<Option<Vec<Change>>> {
    let mut word = [0u8; 4];
    if !read_or_eof(reader, &mut word)? {
        return Ok(None);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(word) as usize];
    if !read_or_eof(reader, &mut payload)? || !read_or_eof(reader, &mut word)? {
        return Ok(None);
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize(&payload).ok())
}

fn open_for_append(path: &Path) -> io::Result<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            writer: open_for_append(path)?,
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    #[cfg(test)]
    pub fn append(&mut self, changes: &[Change]) -> io::Result<()> {
        self.append_buffered(changes)?;
        self.flush_sync()
    }

    /// Buffer one commit. Nothing is durable until [`Wal::flush_sync`].
    pub fn append_buffered(&mut self, changes: &[Change]) -> io::Result<()> {
        encode_commit(&mut self.writer, changes)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write a snapshot commit next to the log. The live log is untouched
    /// until [`Wal::swap_compact_file`].
    pub fn write_compact_file(path: &Path, changes: &[Change]) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(Self::compact_path(path))?);
        if !changes.is_empty() {
            encode_commit(&mut out, changes)?;
        }
        out.flush()?;
        out.get_ref().sync_all()
    }

    /// Rename the snapshot over the log and continue appending to it.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_path(&self.path), &self.path)?;
        self.writer = open_for_append(&self.path)?;
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, changes: &[Change]) -> io::Result<()> {
        Self::write_compact_file(&self.path, changes)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// All intact commits in log order. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Vec<Change>>> {
        let mut reader = match File::open(path) {
            Ok(file) => BufReader::new(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut commits = Vec::new();
        while let Some(changes) = read_commit(&mut reader)? {
            commits.push(changes);
        }
        Ok(commits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Genre;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("boxoffice_test_wal");
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn genre(name: &str) -> Change {
        Change::GenreAdded {
            genre: Genre {
                id: Ulid::new(),
                name: name.into(),
            },
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let _ = fs::remove_file(&path);

        let event_id = Ulid::new();
        let commits = vec![
            vec![genre("Jazz")],
            vec![
                Change::SeatsIncremented { event_id, seats: 2 },
                Change::BookingDeleted { id: Ulid::new(), event_id },
            ],
        ];

        {
            let mut wal = Wal::open(&path).unwrap();
            for c in &commits {
                wal.append(c).unwrap();
            }
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, commits);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_drops_torn_commit_whole() {
        let path = tmp_path("torn_commit.wal");
        let _ = fs::remove_file(&path);

        let first = vec![genre("Rock")];
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
        }

        // Write a two-change commit, then chop its tail off.
        let event_id = Ulid::new();
        let second = vec![
            Change::SeatsDecremented { event_id, seats: 1 },
            Change::BookingDeleted { id: Ulid::new(), event_id },
        ];
        let mut buf = Vec::new();
        encode_commit(&mut buf, &second).unwrap();
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&buf[..buf.len() - 3]).unwrap();
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, vec![first]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = tmp_path("nonexistent.wal");
        let _ = fs::remove_file(&path);
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_corrupt_crc() {
        let path = tmp_path("corrupt_crc.wal");
        let _ = fs::remove_file(&path);

        {
            let payload = bincode::serialize(&vec![Change::EventDeleted { id: Ulid::new(), title: "gone".into() }]).unwrap();
            let len = payload.len() as u32;
            let bad_crc: u32 = 0xDEADBEEF;

            let mut f = File::create(&path).unwrap();
            f.write_all(&len.to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&bad_crc.to_le_bytes()).unwrap();
        }

        assert!(Wal::replay(&path).unwrap().is_empty());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_stops_at_undecodable_payload() {
        let path = tmp_path("undecodable.wal");
        let _ = fs::remove_file(&path);

        let first = vec![genre("Soul")];
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
        }
        {
            // Checksum matches but the bytes are not a commit.
            let junk = [0xFFu8; 6];
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&(junk.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&junk).unwrap();
            f.write_all(&crc32fast::hash(&junk).to_le_bytes()).unwrap();
        }
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&[genre("after junk")]).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![first]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_then_append() {
        let path = tmp_path("compact_append.wal");
        let _ = fs::remove_file(&path);

        let snapshot = vec![genre("Pop"), genre("Folk")];
        let later = vec![genre("Blues")];

        {
            let mut wal = Wal::open(&path).unwrap();
            for _ in 0..10 {
                wal.append(&[genre("churn")]).unwrap();
            }
            let before = fs::metadata(&path).unwrap().len();
            wal.compact(&snapshot).unwrap();
            assert_eq!(wal.appends_since_compact(), 0);
            let after = fs::metadata(&path).unwrap().len();
            assert!(after < before, "compacted WAL should be smaller: {after} < {before}");
            wal.append(&later).unwrap();
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, vec![snapshot, later]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_to_empty_state() {
        let path = tmp_path("compact_empty.wal");
        let _ = fs::remove_file(&path);

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&[genre("gone")]).unwrap();
            wal.compact(&[]).unwrap();
        }

        assert!(Wal::replay(&path).unwrap().is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn append_buffered_then_flush_sync() {
        let path = tmp_path("buffered_flush.wal");
        let _ = fs::remove_file(&path);

        let commits: Vec<Vec<Change>> = (0..5).map(|i| vec![genre(&format!("g{i}"))]).collect();

        {
            let mut wal = Wal::open(&path).unwrap();
            for c in &commits {
                wal.append_buffered(c).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 5);
            wal.flush_sync().unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), commits);

        let _ = fs::remove_file(&path);
    }
}
