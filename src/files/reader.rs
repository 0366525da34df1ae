// The files-API reader, per spec §4.3.
//
// Unlike `journal::JournalReader`, which wraps a local handle that already
// understands "entries", the upstream files API only understands byte
// ranges: `GET offset,length -> {data, offset}`. Everything here exists to
// turn that into the same "pull one Line at a time" interface the streaming
// handler drives both readers through.
//
// Two read directions share the module but not an algorithm:
//
// - Forward range / streaming: fetch chunks starting at the current offset,
//   split on `\n`, buffer complete lines in a FIFO, carry the trailing
//   partial segment ("delta") forward to prepend to the next chunk.
// - Reverse / tail range: fetch backward from the end (or from `tail`
//   lines before a requested offset), reversing each chunk's raw bytes so
//   that splitting on `\n` still finds line boundaries, then re-reversing
//   each extracted line before it's handed to the caller. Reversing twice
//   is an identity operation at the byte level, so this never has to
//   understand UTF-8 to stay correct - it only ever looks for a single
//   ASCII byte (`\n`) and moves whole byte spans around it.

use std::collections::VecDeque;

use crate::error::{GatewayError, Result};
use crate::model::Line;

use super::upstream::{is_eof_data, FilesApiClient};

/// Bytes requested per upstream fetch, per §4.3 ("fetch C = 65536 bytes at
/// a time").
const CHUNK_SIZE: usize = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

pub struct FilesReaderBuilder {
    path: String,
    offset: i64,
    read_from_end: bool,
    skip: i64,
    limit: Option<u64>,
    direction: Direction,
}

impl FilesReaderBuilder {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            read_from_end: false,
            skip: 0,
            limit: None,
            direction: Direction::Forward,
        }
    }

    /// Start reading from this byte offset, per the files-API cursor's `s`
    /// field once decoded. Ignored if `read_from_end` is also set.
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// `BEG`/`END` cursor aliases and the `OptReadFromEnd` option resolve
    /// to this: the starting offset is the file's current length, found by
    /// an `offset = -1` probe at build time.
    pub fn read_from_end(mut self, from_end: bool) -> Self {
        self.read_from_end = from_end;
        self
    }

    /// Signed line count to skip past the starting position before the
    /// first line is yielded. Negative values move backward (used for
    /// "last N lines", §4.3 scenario S3).
    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn read_reverse(mut self, reverse: bool) -> Self {
        self.direction = if reverse {
            Direction::Reverse
        } else {
            Direction::Forward
        };
        self
    }

    pub async fn build(self, client: FilesApiClient) -> Result<FilesReader> {
        if !self.read_from_end && self.offset < 0 {
            return Err(GatewayError::ClientInput(format!(
                "offset must be non-negative, got {}",
                self.offset
            )));
        }

        let start_offset = if self.read_from_end || self.skip < 0 {
            client.file_length(&self.path).await?
        } else {
            self.offset
        };

        let mut reader = FilesReader {
            client,
            path: self.path,
            direction: self.direction,
            next_fetch_offset: start_offset,
            buffer: VecDeque::new(),
            delta: Vec::new(),
            reverse_cursor: start_offset,
            remaining: self.limit,
            at_eof: false,
        };

        if self.skip != 0 {
            reader.apply_skip(self.skip).await?;
        }

        Ok(reader)
    }
}

/// Pull-based reader over one sandbox file's lines.
///
/// `.next_line()` returns `Ok(None)` both when a bounded range has been
/// fully consumed and when a streaming read has no new data yet; per the
/// design note in §9, it is the caller (the streaming handler) that knows
/// which of those two meanings applies, not this reader.
pub struct FilesReader {
    client: FilesApiClient,
    path: String,
    direction: Direction,
    /// Next byte offset to request from the upstream, forward mode only.
    next_fetch_offset: i64,
    buffer: VecDeque<Line>,
    /// Trailing partial line carried from the previous chunk (forward
    /// mode), stored as raw bytes since a multi-byte UTF-8 sequence can
    /// legitimately straddle a chunk boundary.
    delta: Vec<u8>,
    /// Byte offset to fetch backward from next, reverse mode only.
    reverse_cursor: i64,
    remaining: Option<u64>,
    at_eof: bool,
}

impl FilesReader {
    pub async fn next_line(&mut self) -> Result<Option<Line>> {
        if let Some(0) = self.remaining {
            return Ok(None);
        }

        if self.buffer.is_empty() {
            match self.direction {
                Direction::Forward => self.fill_forward().await?,
                Direction::Reverse => self.fill_reverse().await?,
            }
        }

        let line = match self.buffer.pop_front() {
            Some(line) => line,
            None => return Ok(None),
        };

        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }

        Ok(Some(line))
    }

    /// The offset the next streaming fetch will resume from - exposed so
    /// the streaming handler can re-anchor a long-lived reader on an
    /// upstream restart, per §4.6.
    pub fn cursor_offset(&self) -> i64 {
        self.next_fetch_offset
    }

    async fn fill_forward(&mut self) -> Result<()> {
        let chunk = self
            .client
            .fetch_chunk(&self.path, self.next_fetch_offset, CHUNK_SIZE)
            .await?;

        if is_eof_data(&chunk.data) {
            // Unlike reverse mode, forward EOF is never permanent: a
            // followed file can grow past this point later (§4.3,
            // "Streaming (follow) mode"). Leave `next_fetch_offset`
            // where it is and report no new lines; the next pump tick
            // re-fetches from the same offset and picks up anything
            // appended since.
            return Ok(());
        }

        let chunk_start = self.next_fetch_offset;
        let prepended_delta = std::mem::take(&mut self.delta);
        let delta_len_before = prepended_delta.len() as i64;

        let mut data = prepended_delta;
        data.extend_from_slice(chunk.data.as_bytes());

        // The first byte of `data` is the start of whatever delta we
        // carried over, which sits `delta_len_before` bytes before
        // `chunk_start` in the file.
        let (lines, delta) = split_lines(&data, chunk_start - delta_len_before);

        let fetched_len = chunk.data.len() as i64;

        self.buffer.extend(lines);
        self.delta = delta;

        // Advance past every byte we just fetched. The trailing partial
        // line is kept in `self.delta` (already in memory, not re-read
        // from the upstream), so the next fetch resumes immediately after
        // the fetched bytes rather than re-requesting any of them - per
        // the forward-range algorithm in §4.3.
        self.next_fetch_offset = chunk_start + fetched_len;

        Ok(())
    }

    async fn fill_reverse(&mut self) -> Result<()> {
        if self.at_eof {
            return Ok(());
        }

        if self.reverse_cursor <= 0 {
            self.at_eof = true;
            return Ok(());
        }

        let fetch_len = CHUNK_SIZE.min(self.reverse_cursor as usize);
        let fetch_offset = self.reverse_cursor - fetch_len as i64;

        let chunk = self
            .client
            .fetch_chunk(&self.path, fetch_offset, fetch_len)
            .await?;

        if is_eof_data(&chunk.data) {
            self.at_eof = true;
            return Ok(());
        }

        // The leftover from the previous (later-in-file) chunk sits
        // immediately to the right of what we just fetched, so in this
        // reversed-order view it comes first.
        let delta_was_empty = self.delta.is_empty();
        let right_edge = self.reverse_cursor + self.delta.len() as i64;

        let mut bytes = std::mem::take(&mut self.delta);
        let mut reversed_chunk = chunk.data.into_bytes();
        reversed_chunk.reverse();
        bytes.extend_from_slice(&reversed_chunk);

        let (mut lines, mut delta) = split_lines_reverse(&bytes, right_edge);

        // The byte immediately left of `right_edge` is always itself a
        // `\n` whenever no leftover carried in - either this is the very
        // first fetch and `right_edge` is the caller's (line-aligned)
        // starting position, or a previous fetch's split consumed right up
        // to a boundary. Either way the resulting leading token is an
        // artifact of that boundary, not a real line, and has to go.
        if delta_was_empty && !lines.is_empty() {
            lines.remove(0);
        }

        // Reached the true start of the file: any bytes still waiting in
        // `delta` can never be completed by an earlier chunk, so they are
        // the file's first line exactly as they stand.
        if fetch_offset == 0 && !delta.is_empty() {
            let mut raw = std::mem::take(&mut delta);
            raw.reverse();
            lines.push(Line {
                message: String::from_utf8_lossy(&raw).into_owned(),
                offset: 0,
                size: raw.len() as i64,
            });
        }

        // `split_lines_reverse` yields lines in reverse file order (last
        // line of the chunk first); reverse again so the buffer stays in
        // forward file order like the forward-mode path, keeping
        // `next_line()` direction-agnostic for the caller.
        lines.reverse();

        self.buffer.extend(lines);
        self.delta = delta;
        self.reverse_cursor = fetch_offset;

        Ok(())
    }

    /// Reposition the reader by `n` lines (positive: forward from the
    /// current position; negative: the last `|n|` lines before it, the
    /// `tail -N` shape used when the reader was built starting at
    /// end-of-file). Per §4.3, skipping past either end of the file is not
    /// an error - the reader just starts from whichever end it overshot.
    async fn apply_skip(&mut self, n: i64) -> Result<()> {
        if n > 0 {
            for _ in 0..n {
                if self.next_line().await?.is_none() {
                    break;
                }
            }
        } else if n < 0 {
            let target = self.offset_n_lines_before_current((-n) as u64).await?;
            self.next_fetch_offset = target;
            self.reverse_cursor = target;
            self.buffer.clear();
            self.delta.clear();
            self.at_eof = false;
            // `target` is where a *forward* read must resume to yield the
            // last `|n|` lines in file order (§4.3); the backward walk that
            // found it was only a seek, not the read direction itself.
            self.direction = Direction::Forward;
        }

        Ok(())
    }

    /// Walk backward from the reader's current position, collecting lines
    /// until `n` have been seen or the start of the file is reached, and
    /// return the offset a forward read must resume from to yield exactly
    /// the last `n` of them.
    async fn offset_n_lines_before_current(&mut self, n: u64) -> Result<i64> {
        self.reverse_cursor = self.next_fetch_offset;
        self.buffer.clear();
        self.delta.clear();
        self.at_eof = false;

        // Each `fill_reverse` call covers a strictly lower byte range than
        // everything collected so far, so each batch is pushed onto the
        // *front* (in reverse of its own ascending order) to keep `offsets`
        // ascending by file offset overall, even when the requested tail
        // spans more than one `CHUNK_SIZE` fetch.
        let mut offsets: VecDeque<i64> = VecDeque::new();

        while (offsets.len() as u64) < n && !self.at_eof {
            self.fill_reverse().await?;

            if self.buffer.is_empty() {
                break;
            }

            let batch: Vec<i64> = self.buffer.drain(..).map(|line| line.offset).collect();
            for offset in batch.into_iter().rev() {
                offsets.push_front(offset);
            }
        }

        let skip_from_front = offsets.len().saturating_sub(n as usize);
        Ok(offsets.get(skip_from_front).copied().unwrap_or(0))
    }
}

/// Split `\n`-terminated lines out of `data`, whose first byte sits at
/// file offset `base_offset`. Returns the complete lines found and the
/// trailing partial segment (possibly empty) to carry forward.
fn split_lines(data: &[u8], base_offset: i64) -> (Vec<Line>, Vec<u8>) {
    let mut lines = Vec::new();
    let mut start = 0usize;

    for (i, &b) in data.iter().enumerate() {
        if b == b'\n' {
            let raw = &data[start..i];
            lines.push(Line {
                message: String::from_utf8_lossy(raw).into_owned(),
                offset: base_offset + start as i64,
                size: (i - start) as i64,
            });
            start = i + 1;
        }
    }

    (lines, data[start..].to_vec())
}

/// Same idea as `split_lines`, but `data` is already in reversed-byte
/// order: index 0 is the last byte the file positions it covers, and
/// `right_edge` is the file offset one past the rightmost (highest) byte
/// `data` represents, so that file offset `right_edge - 1 - k` is the byte
/// at `data[k]`.
///
/// Lines are returned in reverse file order (the line nearest `right_edge`
/// comes first), with `message` already un-reversed back to normal reading
/// order. The returned delta is reversed-order bytes representing the
/// earliest (lowest-offset) partial line `data` ends on, to be prepended to
/// the next, earlier chunk's reversed bytes by the caller.
fn split_lines_reverse(data: &[u8], right_edge: i64) -> (Vec<Line>, Vec<u8>) {
    let mut lines = Vec::new();
    let mut start = 0usize;

    for (i, &b) in data.iter().enumerate() {
        if b == b'\n' {
            let mut raw = data[start..i].to_vec();
            raw.reverse();

            // The token at indices `[start, i)` covers file offsets
            // `[right_edge - i, right_edge - start)`; its line offset is
            // the lower (earlier) bound.
            let offset = right_edge - i as i64;

            lines.push(Line {
                message: String::from_utf8_lossy(&raw).into_owned(),
                offset,
                size: (i - start) as i64,
            });
            start = i + 1;
        }
    }

    (lines, data[start..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_lines_keeps_delta() {
        let (lines, delta) = split_lines(b"one\ntwo\nthre", 0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].message, "one");
        assert_eq!(lines[0].offset, 0);
        assert_eq!(lines[0].size, 3);
        assert_eq!(lines[1].message, "two");
        assert_eq!(lines[1].offset, 4);
        assert_eq!(delta, b"thre");
    }

    #[test]
    fn split_lines_reverse_recovers_forward_order() {
        // No trailing newline, so there is no leading-boundary artifact to
        // strip and the leftover "one" cleanly becomes the delta - this
        // isolates the offset math from the phantom-token handling that
        // `FilesReader::fill_reverse` layers on top.
        let original: &[u8] = b"one\ntwo\nthree";
        let mut reversed = original.to_vec();
        reversed.reverse();

        let (mut lines, delta) = split_lines_reverse(&reversed, original.len() as i64);
        lines.reverse();

        let messages: Vec<_> = lines.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["two", "three"]);
        assert_eq!(lines[0].offset, 4);
        assert_eq!(lines[1].offset, 8);

        let mut recovered = delta.clone();
        recovered.reverse();
        assert_eq!(recovered, b"one");
    }
}
