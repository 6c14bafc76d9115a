//! The journal: a wire-encoded byte buffer plus the replayable log of
//! length-changing mutations applied to it.
//!
//! Every mutation that grows or shrinks the buffer appends an entry
//! `{origin, offset, delta}`. The journal version is the entry count;
//! handles stamped with an older version replay the missing entries to
//! re-project their offsets (see [`Journal::align`]). A mutation inside a
//! nested message also rewrites the length prefix of every enclosing
//! message, which may itself change sizes and append further entries.

use log::{debug, trace};

use crate::buffer::Buffer;
use crate::error::Error;
use crate::part::Offset;
use crate::wire::{self, WireType};

/// Journal version: the number of entries recorded so far.
pub type Version = usize;

/// A single length-changing mutation.
///
/// At position `offset`, bytes grew (positive `delta`) or shrank
/// (negative `delta`) within the subtree rooted at `origin`. The origin
/// distinguishes mutations inside sibling subtrees, so that an entry at a
/// shared boundary does not shift an unrelated part.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Payload start of the part the mutation was scoped to.
    pub origin: usize,
    /// Absolute position the mutation happened at.
    pub offset: usize,
    /// Signed byte-count difference.
    pub delta: isize,
}

/// An enclosing length-delimited frame of a mutation, outermost first.
struct Frame {
    len_pos: usize,
    prefix_width: usize,
    payload_start: usize,
    payload_len: usize,
}

/// A planned length-prefix rewrite.
struct PrefixPatch {
    pos: usize,
    width: usize,
    origin: usize,
    bytes: Vec<u8>,
}

/// Owning container of a wire-format buffer and its mutation log.
#[derive(Debug)]
pub struct Journal<'a> {
    buffer: Buffer<'a>,
    entries: Vec<JournalEntry>,
}

impl<'a> Journal<'a> {
    /// Creates an empty journal with a growable buffer.
    pub fn new() -> Self {
        Journal {
            buffer: Buffer::new(),
            entries: Vec::new(),
        }
    }

    /// Creates a journal holding a copy of an existing wire-encoded
    /// message.
    pub fn from_bytes(data: &[u8]) -> Self {
        Journal {
            buffer: Buffer::from_bytes(data),
            entries: Vec::new(),
        }
    }

    /// Creates a journal over caller-owned bytes without copying. The
    /// buffer cannot change size; every length-changing mutation fails
    /// with [`Error::Alloc`].
    pub fn zero_copy(data: &'a mut [u8]) -> Self {
        Journal {
            buffer: Buffer::zero_copy(data),
            entries: Vec::new(),
        }
    }

    /// The current version, equal to the number of recorded entries.
    pub fn version(&self) -> Version {
        self.entries.len()
    }

    /// The raw buffer bytes.
    pub fn data(&self) -> &[u8] {
        self.buffer.data()
    }

    /// Number of bytes in the buffer.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The underlying buffer, e.g. for [`Buffer::dump`].
    pub fn buffer(&self) -> &Buffer<'a> {
        &self.buffer
    }

    /// The recorded entries.
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Replaces `[start, end)` with `data`, scoped to the part whose
    /// payload starts at `origin`.
    ///
    /// An equal-length write mutates the buffer in place and records
    /// nothing. Otherwise an entry is appended and the length prefixes of
    /// all enclosing messages are rewritten, each rewrite appending its
    /// own entry.
    pub fn write(
        &mut self,
        origin: usize,
        start: usize,
        end: usize,
        data: &[u8],
    ) -> Result<(), Error> {
        if start > end || end > self.buffer.len() {
            return Err(Error::Offset);
        }
        let delta = data.len() as isize - (end - start) as isize;
        if delta == 0 {
            return self.buffer.write(start, end, data);
        }
        if self.buffer.is_zero_copy() {
            return Err(Error::Alloc);
        }

        let patches = self.plan_cascade(origin, start, end, delta)?;
        self.entries.push(JournalEntry { origin, offset: start, delta });
        if let Err(error) = self.buffer.write(start, end, data) {
            self.revert();
            return Err(error);
        }
        trace!(
            "journal write [{}, {}) delta {:+} origin {}",
            start, end, delta, origin
        );
        self.apply_cascade(patches)
    }

    /// Removes `[start, end)`, scoped like [`Journal::write`].
    pub fn clear(&mut self, origin: usize, start: usize, end: usize) -> Result<(), Error> {
        if start > end || end > self.buffer.len() {
            return Err(Error::Offset);
        }
        if start == end {
            return Ok(());
        }
        if self.buffer.is_zero_copy() {
            return Err(Error::Alloc);
        }
        let delta = -((end - start) as isize);

        let patches = self.plan_cascade(origin, start, end, delta)?;
        self.entries.push(JournalEntry { origin, offset: start, delta });
        if let Err(error) = self.buffer.clear(start, end) {
            self.revert();
            return Err(error);
        }
        trace!("journal clear [{}, {}) origin {}", start, end, origin);
        self.apply_cascade(patches)
    }

    /// Drops the most recent entry without touching the buffer. Used to
    /// undo the entry of a mutation whose buffer write did not take
    /// effect; the caller guarantees the byte state matches.
    pub fn revert(&mut self) {
        self.entries.pop();
    }

    /// Replays all entries recorded at or after `version` onto the given
    /// offsets, bringing them current.
    ///
    /// Fails with [`Error::Offset`] when the offsets point at bytes that
    /// were erased; such offsets cannot be repaired.
    pub fn align(&self, version: &mut Version, offset: &mut Offset) -> Result<(), Error> {
        while *version < self.entries.len() {
            let entry = self.entries[*version];
            *version += 1;
            apply_entry(offset, entry)?;
        }
        Ok(())
    }

    /// Finds the chain of length-delimited frames enclosing the mutation,
    /// outermost first, by scanning the self-describing wire format from
    /// the buffer root. Descent stops at the frame whose payload starts at
    /// `origin`, so string and packed payloads are never parsed as fields.
    fn frame_chain(&self, origin: usize, start: usize, end: usize) -> Result<Vec<Frame>, Error> {
        let mut frames = Vec::new();
        if origin == 0 {
            return Ok(frames);
        }
        let data = self.buffer.data();
        let mut pos = 0;
        let mut window_end = data.len();
        'descend: loop {
            while pos < window_end {
                let (key, key_len) = wire::read_varint32(&data[pos..window_end])?;
                let (_, wire_type) = wire::split_key(key)?;
                let value_pos = pos + key_len;
                let span = wire::value_span(&data[value_pos..window_end], wire_type)?;
                if wire_type == WireType::LengthDelimited {
                    let (payload_len, prefix_width) =
                        wire::read_varint32(&data[value_pos..window_end])?;
                    let payload_start = value_pos + prefix_width;
                    let payload_end = payload_start + payload_len as usize;
                    if payload_start <= origin && payload_start <= start && end <= payload_end {
                        frames.push(Frame {
                            len_pos: value_pos,
                            prefix_width,
                            payload_start,
                            payload_len: payload_len as usize,
                        });
                        if payload_start == origin {
                            break 'descend;
                        }
                        pos = payload_start;
                        window_end = payload_end;
                        continue 'descend;
                    }
                }
                pos = value_pos + span;
            }
            break;
        }
        Ok(frames)
    }

    /// Computes the prefix rewrites a mutation entails, innermost first,
    /// before any byte moves. A prefix that would not fit ten varint
    /// bytes fails with [`Error::Varint`].
    fn plan_cascade(
        &self,
        origin: usize,
        start: usize,
        end: usize,
        delta: isize,
    ) -> Result<Vec<PrefixPatch>, Error> {
        let frames = self.frame_chain(origin, start, end)?;
        let mut patches = Vec::with_capacity(frames.len());
        let mut acc = delta;
        for frame in frames.iter().rev() {
            let length = frame.payload_len as isize + acc;
            if length < 0 {
                return Err(Error::Offset);
            }
            if wire::size_varint64(length as u64) > wire::VARINT_MAX_BYTES {
                return Err(Error::Varint);
            }
            let mut bytes = Vec::new();
            wire::write_varint64(&mut bytes, length as u64);
            acc += bytes.len() as isize - frame.prefix_width as isize;
            patches.push(PrefixPatch {
                pos: frame.len_pos,
                width: frame.prefix_width,
                origin: frame.payload_start,
                bytes,
            });
        }
        Ok(patches)
    }

    /// Applies planned prefix rewrites in decreasing position order, so
    /// that no patch moves the position of one still to come.
    fn apply_cascade(&mut self, patches: Vec<PrefixPatch>) -> Result<(), Error> {
        for patch in patches {
            let delta = patch.bytes.len() as isize - patch.width as isize;
            if delta != 0 {
                self.entries.push(JournalEntry {
                    origin: patch.origin,
                    offset: patch.pos,
                    delta,
                });
            }
            let end = patch.pos + patch.width;
            if let Err(error) = self.buffer.write(patch.pos, end, &patch.bytes) {
                if delta != 0 {
                    self.revert();
                }
                return Err(error);
            }
            if delta != 0 {
                debug!("length prefix at {} resized by {:+}", patch.pos, delta);
            }
        }
        Ok(())
    }
}

impl Default for Journal<'_> {
    fn default() -> Self {
        Journal::new()
    }
}

/// Applies one entry to a stale offset triple.
///
/// The branches, in order: a removal covering the whole field kills the
/// part; a mutation at-or-before the tag shifts the part wholesale; a
/// mutation inside the framing (a length prefix rewrite) shifts the part
/// while its framing bytes stay put; a mutation at the start or inside
/// the window moves only the end; a mutation at the end belongs to the
/// part only when its origin lies within the part; anything later does
/// not apply.
fn apply_entry(offset: &mut Offset, entry: JournalEntry) -> Result<(), Error> {
    let root = offset.start == 0 && offset.diff.tag == 0 && offset.diff.origin == 0;
    let start = offset.start as isize;
    let end = offset.end as isize;
    let tag = start + offset.diff.tag;
    let origin_pos = start + offset.diff.origin;
    let off = entry.offset as isize;
    let org = entry.origin as isize;
    let delta = entry.delta;

    // A framed part has its own tag byte; a container (the root, or any
    // length-delimited part) is the only kind that growth at its end can
    // belong to.
    let framed = offset.diff.tag < 0;
    let container = root || offset.diff.length < 0;

    if delta > 0 {
        if !root && (off < tag || (off == tag && framed)) {
            offset.start = (start + delta) as usize;
            offset.end = (end + delta) as usize;
            if off >= origin_pos {
                // The enclosing payload start stays put.
                offset.diff.origin -= delta;
            }
        } else if !root && off < start {
            offset.start = (start + delta) as usize;
            offset.end = (end + delta) as usize;
            offset.diff.origin -= delta;
            offset.diff.tag -= delta;
            offset.diff.length -= delta;
        } else if off < end || (off == end && container && org >= start) {
            offset.end = (end + delta) as usize;
        }
        return Ok(());
    }

    let removed_end = off - delta;
    if !root && off <= tag && removed_end >= end {
        return Err(Error::Offset);
    }
    if removed_end <= tag {
        offset.start = (start + delta) as usize;
        offset.end = (end + delta) as usize;
        if removed_end > origin_pos {
            offset.diff.origin -= delta;
        }
        Ok(())
    } else if !root && off > tag && removed_end <= start {
        offset.start = (start + delta) as usize;
        offset.end = (end + delta) as usize;
        offset.diff.origin -= delta;
        offset.diff.tag -= delta;
        offset.diff.length -= delta;
        Ok(())
    } else if off >= start && off < end {
        if removed_end > end {
            return Err(Error::Offset);
        }
        offset.end = (end + delta) as usize;
        Ok(())
    } else if off >= end {
        Ok(())
    } else {
        Err(Error::Offset)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::part::Diff;

    // A message with one nested submessage: field 1 is a varint, field 3
    // holds a submessage whose field 1 is the string "hi".
    fn nested_bytes() -> Vec<u8> {
        vec![8, 150, 1, 26, 4, 10, 2, b'h', b'i']
    }

    #[test]
    fn equal_length_write_records_nothing() {
        let mut journal = Journal::from_bytes(&[8, 5]);
        journal.write(0, 1, 2, &[9]).unwrap();
        assert_eq!(journal.version(), 0);
        assert_eq!(journal.data(), &[8, 9]);
    }

    #[test]
    fn resize_records_entry() {
        let mut journal = Journal::from_bytes(&[8, 150, 1]);
        journal.write(0, 1, 3, &[5]).unwrap();
        assert_eq!(journal.version(), 1);
        assert_eq!(journal.entries(), &[JournalEntry { origin: 0, offset: 1, delta: -1 }]);
        assert_eq!(journal.data(), &[8, 5]);
    }

    #[test_log::test]
    fn nested_write_updates_length_prefix() {
        let mut journal = Journal::from_bytes(&nested_bytes());

        // Replace "hi" (payload at 7..9, scoped to itself) with "hello".
        journal.write(7, 7, 9, b"hello").unwrap();
        assert_eq!(
            journal.data(),
            &[8, 150, 1, 26, 7, 10, 5, b'h', b'e', b'l', b'l', b'o']
        );
        // One entry for the payload; the prefix rewrites kept their width
        // and record nothing.
        assert_eq!(journal.version(), 1);
    }

    #[test]
    fn nested_clear_shrinks_length_prefix() {
        let mut journal = Journal::from_bytes(&nested_bytes());

        // Erase the string field (tag at 5) from the submessage (payload
        // starts at 5).
        journal.clear(5, 5, 9).unwrap();
        assert_eq!(journal.data(), &[8, 150, 1, 26, 0]);
    }

    #[test_log::test]
    fn prefix_widens_when_payload_crosses_128_bytes() {
        // Submessage at tag 1 with a 126-byte string payload.
        let mut bytes = vec![10, 127, 10, 125];
        bytes.extend(std::iter::repeat(b'x').take(125));
        let mut journal = Journal::from_bytes(&bytes);

        // Grow the string by four bytes; both prefixes widen to two bytes.
        let payload = [b'y'; 129];
        journal.write(4, 4, 129, &payload).unwrap();

        assert_eq!(&journal.data()[..6], &[10, 132, 1, 10, 129, 1]);
        assert_eq!(journal.len(), 1 + 2 + 1 + 2 + 129);
        // Payload entry plus two widening prefix rewrites.
        assert_eq!(journal.version(), 3);
    }

    #[test]
    fn zero_copy_rejects_resize_and_allows_in_place() {
        let mut bytes = [8, 5, 16, 7];
        let mut journal = Journal::zero_copy(&mut bytes);

        journal.write(0, 1, 2, &[9]).unwrap();
        assert_eq!(journal.data(), &[8, 9, 16, 7]);

        assert_matches!(journal.write(0, 1, 2, &[150, 1]), Err(Error::Alloc));
        assert_matches!(journal.clear(0, 0, 2), Err(Error::Alloc));
        assert_eq!(journal.data(), &[8, 9, 16, 7]);
        assert_eq!(journal.version(), 0);
    }

    #[test]
    fn revert_drops_latest_entry() {
        let mut journal = Journal::from_bytes(&[8, 150, 1]);
        journal.write(0, 1, 3, &[5]).unwrap();
        assert_eq!(journal.version(), 1);
        journal.revert();
        assert_eq!(journal.version(), 0);
    }

    #[test]
    fn align_shifts_following_offsets() {
        let mut journal = Journal::from_bytes(&[8, 1, 16, 2]);
        let mut version = journal.version();
        let mut offset = Offset {
            start: 3,
            end: 4,
            diff: Diff { origin: -3, tag: -1, length: 0 },
        };

        journal.write(0, 1, 2, &[172, 2]).unwrap();
        journal.align(&mut version, &mut offset).unwrap();
        assert_eq!(version, journal.version());
        assert_eq!((offset.start, offset.end), (4, 5));
        assert_eq!(offset.diff.tag, -1);
    }

    #[test]
    fn align_detects_erased_offsets() {
        let mut journal = Journal::from_bytes(&[8, 1, 16, 2]);
        let mut version = journal.version();
        let mut offset = Offset {
            start: 1,
            end: 2,
            diff: Diff { origin: -1, tag: -1, length: 0 },
        };

        journal.clear(0, 0, 2).unwrap();
        assert_matches!(
            journal.align(&mut version, &mut offset),
            Err(Error::Offset)
        );
    }

    #[test]
    fn align_keeps_sibling_boundaries_apart() {
        // Two submessages: growth appended inside the first must not move
        // the second's start, and vice versa.
        let mut journal = Journal::from_bytes(&[10, 2, 8, 1, 18, 2, 8, 2]);
        let mut version = journal.version();
        let mut second = Offset {
            start: 6,
            end: 8,
            diff: Diff { origin: -6, tag: -2, length: -1 },
        };

        // Append a field to the first submessage (payload 2..4).
        journal.write(2, 4, 4, &[16, 1]).unwrap();
        journal.align(&mut version, &mut second).unwrap();
        assert_eq!((second.start, second.end), (8, 10));
        assert_eq!(journal.data(), &[10, 4, 8, 1, 16, 1, 18, 2, 8, 2]);
    }
}
