//! Marks pin bytecode positions to live text positions inside an editor
//! buffer. Unlike a [`SourceMap`], which describes the text at compile time,
//! marks follow the text while the user keeps editing it.
//!
//! A buffer carries up to two mark namespaces: the active one, built from the
//! map of the unit the engine executes, and a provisional one, built from the
//! map of the last save. When the reload for that save arrives, the
//! provisional namespace replaces the active one.

use crate::{
    position::{BytecodePosition, TextPosition},
    source_map::SourceMap,
};
use itertools::Itertools;
use rustc_hash::FxHashMap;
use std::{collections::BTreeSet, ops::Range};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MarkTable {
    marks: FxHashMap<BytecodePosition, TextPosition>,
}

impl MarkTable {
    pub fn from_source_map(source_map: &SourceMap) -> Self {
        Self {
            marks: source_map
                .entries()
                .iter()
                .map(|entry| (entry.position, entry.text))
                .collect(),
        }
    }

    pub fn position_of(&self, position: BytecodePosition) -> Option<TextPosition> {
        self.marks.get(&position).copied()
    }

    /// The leftmost mark on `line`.
    pub fn first_on_line(&self, line: usize) -> Option<BytecodePosition> {
        self.marks
            .iter()
            .filter(|(_, text)| text.line == line)
            .min_by_key(|(position, text)| (text.column, **position))
            .map(|(position, _)| *position)
    }

    /// Text was inserted so that the old line `at` now starts `count` lines
    /// further down.
    pub fn insert_lines(&mut self, at: usize, count: usize) {
        for text in self.marks.values_mut() {
            if text.line >= at {
                text.line += count;
            }
        }
    }

    /// Lines in `range` were removed. Marks inside it collapse onto the line
    /// that now follows the deletion, like marks in a text buffer do.
    pub fn delete_lines(&mut self, range: Range<usize>) {
        let count = range.len();
        for text in self.marks.values_mut() {
            if range.contains(&text.line) {
                *text = TextPosition::new(range.start, 0);
            } else if text.line >= range.end {
                text.line -= count;
            }
        }
    }
}

/// Computes breakpoint keys from line markers.
pub struct MarkTranslator;

impl MarkTranslator {
    /// The breakpoint set implied by markers on `lines` once the text is
    /// compiled into `provisional`. Lines without any instruction lose their
    /// breakpoint.
    pub fn breakpoints_for_lines(
        provisional: &SourceMap,
        lines: &BTreeSet<usize>,
    ) -> Vec<BytecodePosition> {
        lines
            .iter()
            .filter_map(|line| provisional.first_on_line(*line))
            .unique()
            .collect()
    }

    /// Resolve `positions` against the marks of several buffers. Returns the
    /// line each position lands on per buffer, and the positions no buffer
    /// knows about.
    pub fn materialize<'a, K: Copy>(
        positions: &[BytecodePosition],
        tables: impl IntoIterator<Item = (K, &'a MarkTable)>,
    ) -> (Vec<(K, BytecodePosition, usize)>, Vec<BytecodePosition>) {
        let tables = tables.into_iter().collect_vec();
        let mut placed = vec![];
        let mut lost = vec![];
        for position in positions {
            let mut found = false;
            for (key, table) in &tables {
                if let Some(text) = table.position_of(*position) {
                    placed.push((*key, *position, text.line));
                    found = true;
                }
            }
            if !found {
                lost.push(*position);
            }
        }
        (placed, lost)
    }
}
