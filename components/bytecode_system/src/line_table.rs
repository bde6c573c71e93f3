//! Mapping from instruction offsets to source lines.

/// One run of instructions attributed to a single source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    /// First instruction offset of the run
    pub start: u32,
    /// Source line of every instruction in the run
    pub line: u32,
}

/// Offset-to-line table.
///
/// Entries are sorted by `start` with strictly increasing offsets. An entry
/// covers instructions from its `start` up to the next entry's `start`.
/// Instructions before the first entry belong to the code's first line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTable {
    first_line: u32,
    entries: Vec<LineEntry>,
}

/// Bounds of the line run containing an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineBounds {
    /// Source line of the run
    pub line: u32,
    /// First offset of the run (inclusive)
    pub lower: u32,
    /// First offset past the run (exclusive)
    pub upper: u32,
}

impl LineTable {
    /// Build a table. Callers guarantee ordering; see
    /// [`CodeBuilder`](crate::CodeBuilder), which validates it.
    pub fn new(first_line: u32, entries: Vec<LineEntry>) -> Self {
        Self {
            first_line,
            entries,
        }
    }

    /// Line attributed to the code object before any instruction runs.
    pub fn first_line(&self) -> u32 {
        self.first_line
    }

    /// The raw entries.
    pub fn entries(&self) -> &[LineEntry] {
        &self.entries
    }

    /// Source line of the instruction at `offset`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bytecode_system::{LineEntry, LineTable};
    ///
    /// let table = LineTable::new(1, vec![
    ///     LineEntry { start: 0, line: 2 },
    ///     LineEntry { start: 3, line: 4 },
    /// ]);
    /// assert_eq!(table.line_for(0), 2);
    /// assert_eq!(table.line_for(2), 2);
    /// assert_eq!(table.line_for(3), 4);
    /// ```
    pub fn line_for(&self, offset: u32) -> u32 {
        self.bounds(offset).line
    }

    /// The run containing `offset`. The last run extends to `u32::MAX`.
    pub fn bounds(&self, offset: u32) -> LineBounds {
        let idx = self.entries.partition_point(|e| e.start <= offset);
        let upper = self
            .entries
            .get(idx)
            .map(|e| e.start)
            .unwrap_or(u32::MAX);
        match idx.checked_sub(1).map(|i| self.entries[i]) {
            Some(entry) => LineBounds {
                line: entry.line,
                lower: entry.start,
                upper,
            },
            None => LineBounds {
                line: self.first_line,
                lower: 0,
                upper,
            },
        }
    }

    /// Returns whether `offset` is the first instruction of a run.
    pub fn is_line_start(&self, offset: u32) -> bool {
        self.entries
            .binary_search_by_key(&offset, |e| e.start)
            .is_ok()
    }

    /// The first offset whose run is attributed to `line`, if any.
    pub fn first_offset_of(&self, line: u32) -> Option<u32> {
        self.entries.iter().find(|e| e.line == line).map(|e| e.start)
    }

    /// Index of the first entry whose offsets are not strictly increasing.
    pub(crate) fn first_disorder(&self) -> Option<usize> {
        self.entries
            .windows(2)
            .position(|pair| pair[0].start >= pair[1].start)
            .map(|i| i + 1)
    }
}
