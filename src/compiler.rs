use crate::{
    error::CompileError, projection::Projection, projection::ProjectionView,
    source_map::SourceMap, unit::CompiledUnit,
};
use async_trait::async_trait;

/// Result of compiling one projection's text.
#[derive(Clone, Debug)]
pub struct Compilation {
    pub unit: CompiledUnit,
    pub source_map: SourceMap,
}

/// Turns projection text into bytecode and back.
///
/// Compiling may be slow; implementations are expected to do the actual work
/// off the calling task (for example with `tokio::task::spawn_blocking`) so the
/// editor context stays responsive.
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compile `text` written in the syntax of `projection`. A derived
    /// projection compiles through whatever path generates the primary one.
    async fn compile(&self, projection: Projection, text: &str)
        -> Result<Compilation, CompileError>;

    /// Regenerate the text of `projection` (and its map) from `unit`.
    async fn decompile(
        &self,
        projection: Projection,
        unit: &CompiledUnit,
    ) -> Result<ProjectionView, CompileError>;
}
