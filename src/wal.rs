use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::Event;

/// Bytes of framing around each payload: length prefix and checksum.
const FRAME_OVERHEAD: u64 = 8;

/// Frame one event as `[u32 le: len][bincode][u32 le: crc32]`. Returns the
/// number of bytes written.
fn write_frame(writer: &mut impl Write, event: &Event) -> io::Result<u64> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(FRAME_OVERHEAD + u64::from(len))
}

/// Outcome of reading one frame during replay.
enum Frame {
    /// A decoded event and the frame's size on disk.
    Event(Event, u64),
    /// Clean end of file.
    End,
    /// Short read, CRC mismatch or undecodable payload.
    Torn(&'static str),
}

/// `Ok(false)` on EOF before the buffer is filled.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_frame(reader: &mut impl Read) -> io::Result<Frame> {
    let mut word = [0u8; 4];
    // Zero bytes read and a partial length prefix are both reported as
    // UnexpectedEof; peek one byte to tell them apart.
    let mut first = [0u8; 1];
    if reader.read(&mut first)? == 0 {
        return Ok(Frame::End);
    }
    word[0] = first[0];
    if !read_full(reader, &mut word[1..])? {
        return Ok(Frame::Torn("truncated length"));
    }
    let len = u32::from_le_bytes(word);
    let mut payload = vec![0u8; len as usize];
    if !read_full(reader, &mut payload)? {
        return Ok(Frame::Torn("truncated payload"));
    }
    if !read_full(reader, &mut word)? {
        return Ok(Frame::Torn("truncated checksum"));
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        return Ok(Frame::Torn("checksum mismatch"));
    }
    Ok(match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Frame::Event(event, FRAME_OVERHEAD + u64::from(len)),
        Err(_) => Frame::Torn("undecodable event"),
    })
}

/// Intact events of a log and the byte length they occupy.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut valid_len = 0;
    loop {
        match read_frame(&mut reader)? {
            Frame::Event(event, size) => {
                events.push(event);
                valid_len += size;
            }
            Frame::End => break,
            Frame::Torn(reason) => {
                warn!(path = %path.display(), kept = events.len(), reason, "discarding WAL tail");
                break;
            }
        }
    }
    Ok((events, valid_len))
}

/// Append-only event log backing the engine.
///
/// The engine's writer task is the only owner. Appends are buffered and made
/// durable together by `flush_sync`. The file never holds bytes past the
/// last intact frame when new appends start: `open` cuts a torn tail left by
/// a crash, and `discard_unsynced` cuts a batch that failed to commit.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    /// File length covered by frames that were flushed and synced.
    durable_len: u64,
    /// Bytes and events buffered since the last successful `flush_sync`.
    pending_len: u64,
    pending_appends: u64,
    appends_since_compact: u64,
    #[cfg(test)]
    fail_appends: u64,
}

impl Wal {
    /// Replay the log at `path` and open it for appends, truncating anything
    /// after the last intact frame. A missing file is an empty log.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, valid_len) = scan(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let file_len = file.metadata()?.len();
        if file_len > valid_len {
            warn!(path = %path.display(), file_len, valid_len, "truncating WAL to last intact frame");
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        let wal = Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            durable_len: valid_len,
            pending_len: 0,
            pending_appends: 0,
            appends_since_compact: 0,
            #[cfg(test)]
            fail_appends: 0,
        };
        Ok((wal, events))
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one event. Not durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        #[cfg(test)]
        if self.fail_appends > 0 {
            self.fail_appends -= 1;
            // Leave a partial frame behind, as a failed disk write would.
            self.writer.write_all(&[0xFF, 0xFF])?;
            self.pending_len += 2;
            return Err(io::Error::other("simulated write failure"));
        }
        self.pending_len += write_frame(&mut self.writer, event)?;
        self.pending_appends += 1;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.durable_len += self.pending_len;
        self.pending_len = 0;
        self.pending_appends = 0;
        Ok(())
    }

    /// Drop everything written since the last successful `flush_sync`, both
    /// buffered and already on disk.
    pub fn discard_unsynced(&mut self) -> io::Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // into_parts hands back the buffer without writing it out.
        let _ = stale.into_parts();
        let file = self.writer.get_ref();
        file.set_len(self.durable_len)?;
        file.sync_all()?;
        self.appends_since_compact -= self.pending_appends;
        self.pending_len = 0;
        self.pending_appends = 0;
        Ok(())
    }

    /// Make the next `n` appends fail after writing a partial frame.
    #[cfg(test)]
    pub fn fail_next_appends(&mut self, n: u64) {
        self.fail_appends = n;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("wal.compact")
    }

    /// Write `events` to the side file next to `path` and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_path(path))?);
        for event in events {
            write_frame(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the side file over the log and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        // Pending buffered bytes belong to the old file.
        self.flush_sync()?;
        fs::rename(Self::compact_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.durable_len = file.metadata()?.len();
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Read every intact event from `path` without modifying it. Replay
    /// stops at the first torn or corrupt frame.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Ok(scan(path)?.0)
    }
}
