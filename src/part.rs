//! Versioned windows into a journal's bytes.
//!
//! A part remembers the absolute byte range of a field's value or payload,
//! plus relative distances back to its framing: the tag byte, the length
//! prefix and the start of the enclosing message payload. Parts created
//! before a mutation re-project their offsets by replaying journal entries
//! the next time they are used.

use crate::error::Error;
use crate::journal::{Journal, Version};

/// Relative distances from a part's start back to its framing bytes.
///
/// All three are zero or negative. A top-level message part has all three
/// equal to zero; a length-delimited field part has `tag < length < 0`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Distance back to the start of the enclosing message payload.
    pub origin: isize,
    /// Distance back to the field's tag byte.
    pub tag: isize,
    /// Distance back to the first byte of the length prefix, or zero when
    /// the field has none.
    pub length: isize,
}

/// Absolute byte range of a part plus its framing distances.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Offset {
    /// First byte of the value or payload.
    pub start: usize,
    /// One past the last byte of the value or payload.
    pub end: usize,
    /// Framing distances.
    pub diff: Diff,
}

/// A self-healing window into a journal.
///
/// The recorded version tells how many journal entries the offsets already
/// account for; any later entries are replayed on the next use. A part
/// whose bytes were erased from under it enters a permanent
/// [`Error::Offset`] state.
#[derive(Debug, Copy, Clone)]
pub struct Part {
    version: Version,
    offset: Offset,
    error: Option<Error>,
}

impl Part {
    /// Creates a part spanning the whole journal buffer.
    pub fn from_journal(journal: &Journal<'_>) -> Self {
        Part {
            version: journal.version(),
            offset: Offset {
                start: 0,
                end: journal.len(),
                diff: Diff::default(),
            },
            error: None,
        }
    }

    /// Creates a part over the given offsets, stamped with the journal's
    /// current version.
    pub(crate) fn with_offset(journal: &Journal<'_>, offset: Offset) -> Self {
        Part {
            version: journal.version(),
            offset,
            error: None,
        }
    }

    /// Creates a part over the given offsets as they stood at an explicit
    /// journal version; aligning replays anything recorded since.
    pub(crate) fn with_version(version: Version, offset: Offset) -> Self {
        Part {
            version,
            offset,
            error: None,
        }
    }

    /// The canonical invalid part.
    pub(crate) fn invalid() -> Self {
        Part {
            version: 0,
            offset: Offset::default(),
            error: Some(Error::Invalid),
        }
    }

    /// Whether the part is usable.
    pub fn valid(&self) -> bool {
        self.error.is_none()
    }

    /// The sticky error state, if any.
    pub fn error(&self) -> Option<Error> {
        self.error
    }

    /// The journal version the offsets are aligned to.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The current offsets. Exact only while the part is aligned.
    pub(crate) fn offset(&self) -> Offset {
        self.offset
    }

    /// Whether the part accounts for every journal entry.
    pub fn aligned(&self, journal: &Journal<'_>) -> bool {
        self.version == journal.version()
    }

    /// Replays journal entries recorded since this part's version onto its
    /// offsets. Errors are sticky.
    pub(crate) fn align(&mut self, journal: &Journal<'_>) -> Result<(), Error> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if let Err(error) = journal.align(&mut self.version, &mut self.offset) {
            self.error = Some(error);
            return Err(error);
        }
        Ok(())
    }

    /// Number of bytes in the part's window.
    pub fn size(&mut self, journal: &Journal<'_>) -> Result<usize, Error> {
        self.align(journal)?;
        Ok(self.offset.end - self.offset.start)
    }

    /// The window's bytes.
    pub(crate) fn read<'j>(&mut self, journal: &'j Journal<'_>) -> Result<&'j [u8], Error> {
        self.align(journal)?;
        let data = journal.data();
        if self.offset.end > data.len() {
            self.error = Some(Error::Offset);
            return Err(Error::Offset);
        }
        Ok(&data[self.offset.start..self.offset.end])
    }

    /// Replaces the window's bytes. A changed length cascades through the
    /// enclosing length prefixes.
    pub(crate) fn write(&mut self, journal: &mut Journal<'_>, data: &[u8]) -> Result<(), Error> {
        self.align(journal)?;
        let Offset { start, end, .. } = self.offset;
        journal.write(self.write_origin(), start, end, data)?;
        self.align(journal)
    }

    /// Removes the window's content, leaving the field present but empty.
    pub(crate) fn clear(&mut self, journal: &mut Journal<'_>) -> Result<(), Error> {
        self.align(journal)?;
        let Offset { start, end, .. } = self.offset;
        journal.clear(self.write_origin(), start, end)?;
        self.align(journal)
    }

    /// Removes the whole field, framing included. The part is dead
    /// afterwards.
    pub(crate) fn erase(&mut self, journal: &mut Journal<'_>) -> Result<(), Error> {
        self.align(journal)?;
        let Offset { start, end, diff } = self.offset;
        let tag = (start as isize + diff.tag) as usize;
        let origin = (start as isize + diff.origin) as usize;
        journal.clear(origin, tag, end)?;
        self.version = journal.version();
        self.error = Some(Error::Offset);
        Ok(())
    }

    /// The origin to record for mutations scoped to this part: its own
    /// start when it carries a length prefix, the enclosing payload start
    /// otherwise.
    fn write_origin(&self) -> usize {
        if self.offset.diff.length < 0 {
            self.offset.start
        } else {
            (self.offset.start as isize + self.offset.diff.origin) as usize
        }
    }
}
