//! Log follower -- line reader over one open log file.
//!
//! A follower always starts at end of file, so content written before the
//! open is never read. Reads never block waiting for data: at end of file
//! [`LogFollower::next_line`] returns `Ok(None)` and the caller decides when
//! to poll again. Bytes after the last newline are kept until the rest of
//! the line is written, but never more than `max_line_length` of them.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

/// State of the watched path compared to the open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCheck {
    /// Same file, not shrunk
    Present,
    /// Path no longer exists
    Vanished,
    /// Path now names a different file
    Replaced,
    /// File is shorter than what was already read
    Truncated,
}

/// (device, inode) of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(metadata: &std::fs::Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    fn of(_metadata: &std::fs::Metadata) -> Option<Self> {
        None
    }
}

/// Follows one log file line by line.
pub struct LogFollower {
    path: PathBuf,
    reader: BufReader<File>,
    identity: Option<FileIdentity>,
    /// Bytes consumed from the file, including the pending partial line
    position: u64,
    /// Start of the current line, at most `max_line_length` bytes
    pending: Vec<u8>,
    /// The current line lost bytes past `max_line_length`
    overflowed: bool,
    max_line_length: usize,
}

impl LogFollower {
    /// Opens `path` positioned at its end.
    pub async fn open(path: impl AsRef<Path>, max_line_length: usize) -> io::Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).await?;
        let metadata = file.metadata().await?;
        if metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            ));
        }
        let position = file.seek(SeekFrom::End(0)).await?;

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            identity: FileIdentity::of(&metadata),
            position,
            pending: Vec::new(),
            overflowed: false,
            max_line_length,
        })
    }

    /// Followed path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset read so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Next complete line without its terminator, or `None` when no full
    /// line is available yet.
    ///
    /// Only the first `max_line_length` bytes of a line are kept; the rest is
    /// skipped up to the newline. Invalid UTF-8 is replaced after the cut.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(None);
            }

            let newline = buf.iter().position(|&b| b == b'\n');
            let (content, used) = match newline {
                Some(at) => (&buf[..at], at + 1),
                None => (buf, buf.len()),
            };
            let room = self.max_line_length.saturating_sub(self.pending.len());
            if content.len() > room {
                self.overflowed = true;
            }
            self.pending.extend_from_slice(&content[..content.len().min(room)]);

            self.reader.consume(used);
            self.position += used as u64;

            if newline.is_some() {
                return Ok(Some(self.take_line()));
            }
        }
    }

    fn take_line(&mut self) -> String {
        let mut raw = std::mem::take(&mut self.pending);
        if std::mem::take(&mut self.overflowed) {
            drop_split_char(&mut raw);
        } else if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        String::from_utf8_lossy(&raw).into_owned()
    }

    /// Compares the path on disk with the open file.
    ///
    /// # Errors
    /// Any `stat` failure other than "not found".
    pub async fn check(&self) -> io::Result<FileCheck> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileCheck::Vanished),
            Err(e) => return Err(e),
        };

        if self.identity.is_some() && FileIdentity::of(&metadata) != self.identity {
            return Ok(FileCheck::Replaced);
        }
        if metadata.len() < self.position {
            return Ok(FileCheck::Truncated);
        }
        Ok(FileCheck::Present)
    }
}

/// Removes a trailing UTF-8 sequence that the length cap cut in two.
fn drop_split_char(raw: &mut Vec<u8>) {
    let len = raw.len();
    for back in 1..=len.min(3) {
        let byte = raw[len - back];
        // continuation byte, keep looking for the lead
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        if width > back {
            raw.truncate(len - back);
        }
        return;
    }
}
