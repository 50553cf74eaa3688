use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Formatter};

#[derive(
    Clone, Copy, Default, Deref, Deserialize, Eq, From, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct RoutineId(pub usize);
impl Debug for RoutineId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "routine-{}", self.0)
    }
}

/// Offset of an instruction inside its routine, counted in instructions.
#[derive(
    Clone, Copy, Default, Deref, Deserialize, Eq, From, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct OpcodeOffset(pub usize);
impl Debug for OpcodeOffset {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "opcode-{}", self.0)
    }
}

/// The key the engine's debugger uses to break: a single instruction.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "camelCase")]
pub struct BytecodePosition {
    pub routine_id: RoutineId,
    pub opcode_offset: OpcodeOffset,
}
impl BytecodePosition {
    pub fn new(routine_id: impl Into<RoutineId>, opcode_offset: impl Into<OpcodeOffset>) -> Self {
        Self {
            routine_id: routine_id.into(),
            opcode_offset: opcode_offset.into(),
        }
    }
}
impl Display for BytecodePosition {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "routine {} opcode {}",
            *self.routine_id, *self.opcode_offset
        )
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TextPosition {
    /// Zero-based line index (`\n`-separated)
    pub line: usize,
    /// Zero-based character index inside the line
    pub column: usize,
}
impl TextPosition {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}
impl Display for TextPosition {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}
