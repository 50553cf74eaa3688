//! Mapping between instructions and the text they were compiled from.
//!
//! A [`SourceMap`] belongs to exactly one projection of one compiled unit. It
//! is rebuilt wholesale every time that projection is compiled and never
//! mutated afterwards, so it can be shared freely behind an `Arc`.

use crate::{
    error::SourceMapError,
    position::{BytecodePosition, TextPosition},
};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SourceMapEntry {
    pub position: BytecodePosition,
    pub text: TextPosition,
}
impl SourceMapEntry {
    pub fn new(position: BytecodePosition, text: TextPosition) -> Self {
        Self { position, text }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SourceMap {
    entries: Vec<SourceMapEntry>,
    by_position: FxHashMap<BytecodePosition, TextPosition>,
    /// Sorted by column within each line.
    by_line: BTreeMap<usize, Vec<(usize, BytecodePosition)>>,
}

impl SourceMap {
    pub fn new(entries: Vec<SourceMapEntry>) -> Result<Self, SourceMapError> {
        let mut by_position = FxHashMap::default();
        let mut by_line: BTreeMap<usize, Vec<(usize, BytecodePosition)>> = BTreeMap::new();
        for entry in &entries {
            if by_position.insert(entry.position, entry.text).is_some() {
                return Err(SourceMapError::DuplicatePosition {
                    position: entry.position,
                });
            }
            by_line
                .entry(entry.text.line)
                .or_default()
                .push((entry.text.column, entry.position));
        }
        for positions in by_line.values_mut() {
            positions.sort();
        }
        Ok(Self {
            entries,
            by_position,
            by_line,
        })
    }

    pub fn entries(&self) -> &[SourceMapEntry] {
        &self.entries
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn text_position_of(&self, position: BytecodePosition) -> Option<TextPosition> {
        self.by_position.get(&position).copied()
    }
    pub fn contains(&self, position: BytecodePosition) -> bool {
        self.by_position.contains_key(&position)
    }

    /// The instruction a breakpoint on `line` stops at: the leftmost one.
    pub fn first_on_line(&self, line: usize) -> Option<BytecodePosition> {
        self.by_line
            .get(&line)
            .and_then(|positions| positions.first())
            .map(|(_, position)| *position)
    }
    pub fn positions_on_line(&self, line: usize) -> impl Iterator<Item = BytecodePosition> + '_ {
        self.by_line
            .get(&line)
            .into_iter()
            .flatten()
            .map(|(_, position)| *position)
    }
}

/// Two maps are equal when they map the same positions to the same text,
/// regardless of entry order.
impl PartialEq for SourceMap {
    fn eq(&self, other: &Self) -> bool {
        self.by_position == other.by_position
    }
}
impl Eq for SourceMap {}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(routine: usize, opcode: usize, line: usize, column: usize) -> SourceMapEntry {
        SourceMapEntry::new(
            BytecodePosition::new(routine, opcode),
            TextPosition::new(line, column),
        )
    }

    #[test]
    fn several_instructions_may_share_a_line() {
        let map = SourceMap::new(vec![
            entry(0, 1, 3, 10),
            entry(0, 0, 3, 4),
            entry(1, 0, 7, 0),
        ])
        .unwrap();

        assert_eq!(map.first_on_line(3), Some(BytecodePosition::new(0, 0)));
        assert_eq!(map.positions_on_line(3).count(), 2);
        assert_eq!(map.first_on_line(4), None);
        assert_eq!(
            map.text_position_of(BytecodePosition::new(1, 0)),
            Some(TextPosition::new(7, 0)),
        );
    }

    #[test]
    fn duplicate_positions_are_rejected() {
        let error = SourceMap::new(vec![entry(2, 5, 1, 0), entry(2, 5, 9, 0)]).unwrap_err();
        assert_eq!(
            error,
            SourceMapError::DuplicatePosition {
                position: BytecodePosition::new(2, 5),
            },
        );
    }

    #[test]
    fn equality_ignores_entry_order() {
        let a = SourceMap::new(vec![entry(0, 0, 0, 0), entry(0, 1, 1, 0)]).unwrap();
        let b = SourceMap::new(vec![entry(0, 1, 1, 0), entry(0, 0, 0, 0)]).unwrap();
        let c = SourceMap::new(vec![entry(0, 0, 0, 0), entry(0, 1, 2, 0)]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
