//! A tiny line-based compiler and registry fixtures for tests.
//!
//! Scripts consist of `routine <id>` headers followed by indented
//! instructions, one per line. Blank lines and `//` comments compile to
//! nothing. The bytecode is the canonical text itself, so the primary
//! projection decompiles to exactly what is stored. The derived projection is
//! the same text below a generated header line.

use crate::{
    archive::{ArchiveStore, MemoryArchive},
    breakpoints::{BreakpointManager, BreakpointStore},
    compiler::{Compilation, Compiler},
    error::{CompileError, StorageError},
    position::{BytecodePosition, TextPosition},
    projection::{Projection, ProjectionView},
    registry::FileRegistry,
    source_map::{SourceMap, SourceMapEntry},
    unit::CompiledUnit,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{io, sync::Arc};

pub const DERIVED_HEADER: &str = "// derived view";

/// Line 10 holds `routine 2`, `opcode 5`.
pub const SCRIPT: &str = "routine 0
    a0
    a1
    a2
routine 2
    b0
    b1
    b2
    b3
    b4
    b5
    b6
routine 3
    c0
";

pub struct LineCompiler;

impl LineCompiler {
    fn parse(text: &str) -> Result<(String, SourceMap), CompileError> {
        let mut canonical = String::new();
        let mut entries = vec![];
        let mut routine: Option<(usize, usize)> = None;
        for (line, content) in text.split('\n').enumerate() {
            let trimmed = content.trim();
            let column = content.len() - content.trim_start().len();
            let here = TextPosition::new(line, column);
            if trimmed.is_empty() || trimmed.starts_with("//") {
                continue;
            }
            if trimmed.contains('!') {
                return Err(CompileError::new("Unexpected `!`.", here));
            }
            if let Some(id) = trimmed.strip_prefix("routine ") {
                let id: usize = id
                    .trim()
                    .parse()
                    .map_err(|_| CompileError::new("Invalid routine id.", here))?;
                routine = Some((id, 0));
                canonical.push_str(&format!("routine {id}\n"));
                continue;
            }
            let Some((id, opcode)) = routine.as_mut() else {
                return Err(CompileError::new("Instruction outside of a routine.", here));
            };
            entries.push(SourceMapEntry::new(BytecodePosition::new(*id, *opcode), here));
            *opcode += 1;
            canonical.push_str(&format!("    {trimmed}\n"));
        }
        let source_map = SourceMap::new(entries)
            .map_err(|error| CompileError::new(error.to_string(), TextPosition::default()))?;
        Ok((canonical, source_map))
    }
}

#[async_trait]
impl Compiler for LineCompiler {
    async fn compile(
        &self,
        _projection: Projection,
        text: &str,
    ) -> Result<Compilation, CompileError> {
        let (canonical, source_map) = Self::parse(text)?;
        Ok(Compilation {
            unit: CompiledUnit::new(canonical.into_bytes()),
            source_map,
        })
    }

    async fn decompile(
        &self,
        projection: Projection,
        unit: &CompiledUnit,
    ) -> Result<ProjectionView, CompileError> {
        let canonical = std::str::from_utf8(unit.bytes())
            .map_err(|_| CompileError::new("Not a unit.", TextPosition::default()))?;
        let text = match projection {
            Projection::Primary => canonical.to_string(),
            Projection::Derived => format!("{DERIVED_HEADER}\n{canonical}"),
        };
        let (_, source_map) = Self::parse(&text)?;
        Ok(ProjectionView::new(text, source_map))
    }
}

pub fn registry_with(files: &[(&str, &str)]) -> (FileRegistry, Arc<BreakpointManager>) {
    registry_with_store(files, Arc::new(BreakpointManager::in_memory()))
}

pub fn registry_with_store(
    files: &[(&str, &str)],
    store: Arc<BreakpointManager>,
) -> (FileRegistry, Arc<BreakpointManager>) {
    let registry = FileRegistry::new(
        Arc::new(archive_with(files)),
        Arc::new(LineCompiler),
        store.clone(),
    );
    (registry, store)
}

pub fn archive_with(files: &[(&str, &str)]) -> MemoryArchive {
    MemoryArchive::with_entries(
        files
            .iter()
            .map(|(name, text)| (name.to_string(), text.as_bytes().to_vec())),
    )
}

fn refused() -> StorageError {
    io::Error::new(io::ErrorKind::PermissionDenied, "refused").into()
}

/// Can be read, but every write fails.
pub struct ReadOnlyArchive(pub MemoryArchive);

#[async_trait]
impl ArchiveStore for ReadOnlyArchive {
    async fn read(&self, filename: &str) -> Result<Bytes, StorageError> {
        self.0.read(filename).await
    }
    async fn write(&self, _filename: &str, _bytes: Bytes) -> Result<(), StorageError> {
        Err(refused())
    }
}

/// Works like [`BreakpointManager`], except that resyncing always fails.
#[derive(Default)]
pub struct BrokenResyncStore(pub BreakpointManager);

#[async_trait]
impl BreakpointStore for BrokenResyncStore {
    async fn add(&self, filename: &str, position: BytecodePosition) -> Result<(), StorageError> {
        self.0.add(filename, position).await
    }
    async fn remove(
        &self,
        filename: &str,
        position: BytecodePosition,
    ) -> Result<(), StorageError> {
        self.0.remove(filename, position).await
    }
    async fn resync(
        &self,
        _filename: &str,
        _positions: Vec<BytecodePosition>,
    ) -> Result<(), StorageError> {
        Err(refused())
    }
    async fn list(&self, filename: &str) -> Result<Vec<BytecodePosition>, StorageError> {
        self.0.list(filename).await
    }
}
