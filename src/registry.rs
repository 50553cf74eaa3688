//! The registry of tracked script files and their lifecycle.
//!
//! Every file is tracked in three forms: the text of its two projections, the
//! unit persisted in the archive and the copy the engine executes. The engine
//! can't be patched while it runs a file, so after a save the persisted unit
//! and the executed one may differ until the engine unloads the file. The
//! flags on [`TrackedFile`] record which of these forms agree and whether the
//! marks used to translate breakpoints can still be trusted.
//!
//! All lifecycle operations on one file are serialized through a per-file
//! async mutex. Operations on different files never wait on each other.

use crate::{
    archive::ArchiveStore,
    breakpoints::BreakpointStore,
    compiler::{Compilation, Compiler},
    editor::{EditorContext, EditorMessage, ReloadEvent},
    error::{CompileError, StorageError, SyncError, SyncResult},
    marks::MarkTranslator,
    position::BytecodePosition,
    projection::{PerProjection, Projection, ProjectionView},
    source_map::SourceMap,
    unit::{CompiledUnit, ContentHash},
};
use rustc_hash::FxHashMap;
use std::{collections::BTreeSet, sync::Arc};
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, instrument, warn};

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct FileFlags {
    pub opened_in_editor: bool,
    pub opened_in_ground_engine: bool,
    /// Whether the engine executes (or would load next) the persisted unit.
    pub ram_state_up_to_date: bool,
    /// Whether marks are untrustworthy, so breakpoints can't be added.
    pub not_breakable: bool,
}

/// What a user should be told about debugging a file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DebugStatus {
    UpToDate,
    /// An old version is still executed; breakpoints use its old positions.
    Outdated,
    NotBreakable,
}
impl DebugStatus {
    pub fn message(&self) -> Option<&'static str> {
        match self {
            DebugStatus::UpToDate => None,
            DebugStatus::Outdated => Some(
                "An old version of this script is still loaded, old breakpoints are still used \
                 until the file is reloaded.",
            ),
            DebugStatus::NotBreakable => Some(
                "An old version of this script is still loaded, but breakpoints are not \
                 available. Debugging is disabled for this file until it is reloaded.",
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReloadReadiness {
    /// The engine doesn't hold the file; call [`FileRegistry::force_reload`]
    /// once ready.
    Ready,
    /// The engine still holds the old unit. The reload happens when the
    /// engine unloads it.
    Deferred,
}

#[derive(Clone, Debug)]
pub struct Saved {
    pub readiness: ReloadReadiness,
    /// The map of the saved text. It becomes active with the next reload.
    pub provisional: Arc<SourceMap>,
    /// The breakpoint set submitted to the store.
    pub breakpoints: Vec<BytecodePosition>,
}

#[derive(Clone, Debug)]
struct ProjectionState {
    /// Matches the unit the engine executes.
    active: ProjectionView,
    /// Produced by the last save, waiting for a reload.
    pending: Option<ProjectionView>,
}

#[derive(Clone, Debug)]
pub struct TrackedFile {
    filename: String,
    unit: CompiledUnit,
    projections: PerProjection<ProjectionState>,
    authority: Projection,
    flags: FileFlags,
    reload_ready: bool,
}

impl TrackedFile {
    pub fn new(
        filename: impl Into<String>,
        unit: CompiledUnit,
        views: PerProjection<ProjectionView>,
    ) -> Self {
        let PerProjection { primary, derived } = views;
        Self {
            filename: filename.into(),
            unit,
            projections: PerProjection::new(
                ProjectionState {
                    active: primary,
                    pending: None,
                },
                ProjectionState {
                    active: derived,
                    pending: None,
                },
            ),
            authority: Projection::Primary,
            flags: FileFlags {
                ram_state_up_to_date: true,
                ..FileFlags::default()
            },
            reload_ready: false,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
    pub fn unit(&self) -> &CompiledUnit {
        &self.unit
    }
    pub fn authority(&self) -> Projection {
        self.authority
    }
    pub fn flags(&self) -> FileFlags {
        self.flags
    }

    pub fn active_view(&self, projection: Projection) -> &ProjectionView {
        &self.projections.get(projection).active
    }
    pub fn pending_view(&self, projection: Projection) -> Option<&ProjectionView> {
        self.projections.get(projection).pending.as_ref()
    }
    pub fn has_pending(&self) -> bool {
        self.projections.iter().any(|(_, it)| it.pending.is_some())
    }

    pub fn status(&self) -> DebugStatus {
        if self.flags.not_breakable {
            DebugStatus::NotBreakable
        } else if !self.flags.ram_state_up_to_date {
            DebugStatus::Outdated
        } else {
            DebugStatus::UpToDate
        }
    }

    fn ensure_breakable(&self) -> SyncResult<()> {
        if self.flags.not_breakable {
            return Err(SyncError::FileNotBreakable {
                filename: self.filename.clone(),
            });
        }
        Ok(())
    }

    /// Promote pending views and describe the result for the editors.
    fn reload(&mut self) -> ReloadEvent {
        self.reload_ready = false;
        for (_, state) in self.projections.iter_mut() {
            if let Some(pending) = state.pending.take() {
                state.active = pending;
            }
        }
        ReloadEvent {
            filename: self.filename.clone(),
            authority: self.authority,
            views: PerProjection::from_fn(|projection| self.active_view(projection).clone()),
        }
    }

    fn open_in_ground_engine(&mut self) -> Option<ReloadEvent> {
        self.flags.opened_in_ground_engine = true;
        if self.flags.ram_state_up_to_date {
            return None;
        }
        // The engine just loaded the most recent persisted unit.
        self.flags.ram_state_up_to_date = true;
        self.flags.not_breakable = false;
        Some(self.reload())
    }

    fn close_in_ground_engine(&mut self) -> Option<ReloadEvent> {
        self.flags.opened_in_ground_engine = false;
        self.flags.not_breakable = false;
        if self.flags.ram_state_up_to_date {
            return None;
        }
        let event = self.reload();
        self.flags.ram_state_up_to_date = true;
        Some(event)
    }

    fn close_in_editor(&mut self, confirm: impl FnOnce() -> bool) -> bool {
        if !self.flags.ram_state_up_to_date {
            // The editor's marks for the executed unit are about to vanish.
            if !confirm() {
                return false;
            }
            self.flags.not_breakable = true;
        }
        self.flags.opened_in_editor = false;
        true
    }

    fn mark_invalid(&mut self) {
        self.flags.ram_state_up_to_date = false;
        self.flags.not_breakable = true;
    }

    fn apply_save(
        &mut self,
        projection: Projection,
        unit: CompiledUnit,
        compiled: ProjectionView,
        regenerated: ProjectionView,
    ) -> ReloadReadiness {
        self.unit = unit;
        self.projections.get_mut(projection).pending = Some(compiled);
        self.projections.get_mut(projection.other()).pending = Some(regenerated);

        self.flags.ram_state_up_to_date = false;
        if self.flags.opened_in_ground_engine {
            self.reload_ready = false;
            return ReloadReadiness::Deferred;
        }
        self.flags.ram_state_up_to_date = true;
        self.reload_ready = true;
        ReloadReadiness::Ready
    }
}

/// Something the engine reports about the files it executes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EngineEvent {
    /// `hash` is the hash of the binary the engine loaded, if it knows it.
    Loaded {
        filename: String,
        hash: Option<ContentHash>,
    },
    Unloaded {
        filename: String,
    },
}

/// Handle for the engine's notification thread. Sending never blocks.
#[derive(Clone, Debug)]
pub struct EngineNotifier {
    sender: mpsc::UnboundedSender<EngineEvent>,
}
impl EngineNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn loaded(&self, filename: impl Into<String>, hash: Option<ContentHash>) -> bool {
        self.send(EngineEvent::Loaded {
            filename: filename.into(),
            hash,
        })
    }
    pub fn unloaded(&self, filename: impl Into<String>) -> bool {
        self.send(EngineEvent::Unloaded {
            filename: filename.into(),
        })
    }
    fn send(&self, event: EngineEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

pub struct FileRegistry {
    archive: Arc<dyn ArchiveStore>,
    compiler: Arc<dyn Compiler>,
    breakpoints: Arc<dyn BreakpointStore>,
    files: Mutex<FxHashMap<String, Arc<Mutex<TrackedFile>>>>,
    reload_listeners: RwLock<FxHashMap<String, Vec<EditorContext>>>,
}

impl FileRegistry {
    pub fn new(
        archive: Arc<dyn ArchiveStore>,
        compiler: Arc<dyn Compiler>,
        breakpoints: Arc<dyn BreakpointStore>,
    ) -> Self {
        Self {
            archive,
            compiler,
            breakpoints,
            files: Mutex::default(),
            reload_listeners: RwLock::default(),
        }
    }

    /// Enter the exclusive section of `filename`, loading the file first if
    /// it isn't tracked yet.
    async fn section(&self, filename: &str) -> Result<OwnedMutexGuard<TrackedFile>, StorageError> {
        let existing = self.files.lock().await.get(filename).cloned();
        let slot = match existing {
            Some(slot) => slot,
            None => {
                // Loading happens outside the map lock so other files aren't
                // blocked. If we race another loader, the first insert wins.
                let file = self.load(filename).await?;
                self.files
                    .lock()
                    .await
                    .entry(filename.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(file)))
                    .clone()
            }
        };
        Ok(slot.lock_owned().await)
    }

    async fn load(&self, filename: &str) -> Result<TrackedFile, StorageError> {
        let unit = CompiledUnit::new(self.archive.read(filename).await?);
        let corrupt = |error: CompileError| StorageError::Corrupt {
            filename: filename.to_string(),
            reason: error.to_string(),
        };
        let primary = self
            .compiler
            .decompile(Projection::Primary, &unit)
            .await
            .map_err(corrupt)?;
        let derived = self
            .compiler
            .decompile(Projection::Derived, &unit)
            .await
            .map_err(corrupt)?;
        debug!("{filename}: Loaded unit {:?}.", unit.hash());
        Ok(TrackedFile::new(
            filename,
            unit,
            PerProjection::new(primary, derived),
        ))
    }

    /// Post a message to every editor listening on `filename`.
    async fn broadcast(&self, filename: &str, message: impl Fn() -> EditorMessage) {
        let listeners = self.reload_listeners.read().await;
        let Some(contexts) = listeners.get(filename) else {
            debug!("{filename}: No editor is listening.");
            return;
        };
        for context in contexts {
            if !context.post(message()) {
                warn!("{filename}: An editor went away before it got notified.");
            }
        }
    }
    async fn emit_reload(&self, event: ReloadEvent) {
        let filename = event.filename.clone();
        self.broadcast(&filename, || EditorMessage::Reload(event.clone()))
            .await;
    }

    /// Deliver reload events and breakpoint changes for `filename` to
    /// `context`.
    pub async fn on_reload(&self, filename: &str, context: EditorContext) {
        let mut listeners = self.reload_listeners.write().await;
        let contexts = listeners.entry(filename.to_string()).or_default();
        if !contexts.iter().any(|it| it.is_same(&context)) {
            contexts.push(context);
        }
    }
    pub async fn remove_reload_listener(&self, filename: &str, context: &EditorContext) {
        let mut listeners = self.reload_listeners.write().await;
        if let Some(contexts) = listeners.get_mut(filename) {
            contexts.retain(|it| !it.is_same(context));
            if contexts.is_empty() {
                listeners.remove(filename);
            }
        }
    }

    pub async fn get(&self, filename: &str) -> SyncResult<TrackedFile> {
        Ok(self.section(filename).await?.clone())
    }

    pub async fn hash_for(&self, filename: &str) -> SyncResult<ContentHash> {
        Ok(self.section(filename).await?.unit.hash())
    }

    pub async fn status(&self, filename: &str) -> SyncResult<DebugStatus> {
        Ok(self.section(filename).await?.status())
    }

    /// Choose which projection is edited and compiled.
    pub async fn set_authority(&self, filename: &str, projection: Projection) -> SyncResult<()> {
        let mut file = self.section(filename).await?;
        if file.authority != projection {
            info!("{filename}: The {projection} projection is now editable.");
            file.authority = projection;
        }
        Ok(())
    }

    pub async fn open_in_editor(&self, filename: &str) -> SyncResult<TrackedFile> {
        let mut file = self.section(filename).await?;
        file.flags.opened_in_editor = true;
        info!("{filename}: Opened in editor.");
        Ok(file.clone())
    }

    pub async fn open_in_ground_engine(&self, filename: &str) -> SyncResult<()> {
        let mut file = self.section(filename).await?;
        info!("{filename}: Opened in ground engine.");
        if let Some(event) = file.open_in_ground_engine() {
            self.emit_reload(event).await;
        }
        Ok(())
    }

    /// Returns `false` without changing anything if closing would destroy
    /// the marks of a still executed old version and `confirm` declines.
    pub async fn close_in_editor(
        &self,
        filename: &str,
        confirm: impl FnOnce() -> bool + Send,
    ) -> SyncResult<bool> {
        let mut file = self.section(filename).await?;
        let closed = file.close_in_editor(confirm);
        if closed {
            info!("{filename}: Closed in editor.");
            if file.flags.not_breakable {
                warn!("{filename}: Debugging is disabled until the file is reloaded.");
            }
        } else {
            debug!("{filename}: Closing in editor was declined.");
        }
        Ok(closed)
    }

    /// Usually called from the engine's notification context. The reload is
    /// only posted to the editor contexts, never run here.
    pub async fn close_in_ground_engine(&self, filename: &str) -> SyncResult<()> {
        let mut file = self.section(filename).await?;
        info!("{filename}: Closed in ground engine.");
        if let Some(event) = file.close_in_ground_engine() {
            self.emit_reload(event).await;
        }
        Ok(())
    }

    /// Compile `text`, resync the breakpoints on `marked_lines` against the
    /// new map and persist the unit. Nothing changes if any step fails.
    #[instrument(level = "debug", skip(self, text, marked_lines))]
    pub async fn save(
        &self,
        filename: &str,
        projection: Projection,
        text: &str,
        marked_lines: &BTreeSet<usize>,
    ) -> SyncResult<Saved> {
        let mut file = self.section(filename).await?;
        if projection != file.authority {
            return Err(SyncError::ProjectionNotEditable {
                filename: filename.to_string(),
                projection,
            });
        }

        let Compilation { unit, source_map } = self
            .compiler
            .compile(projection, text)
            .await
            .map_err(|error| {
                warn!("{filename}: Compiling failed: {error}");
                error
            })?;
        let regenerated = self.compiler.decompile(projection.other(), &unit).await?;

        let breakpoints = MarkTranslator::breakpoints_for_lines(&source_map, marked_lines);
        let previous = self.breakpoints.list(filename).await?;
        self.breakpoints
            .resync(filename, breakpoints.clone())
            .await?;
        if let Err(error) = self.archive.write(filename, unit.bytes().clone()).await {
            warn!("{filename}: Writing the unit failed, restoring breakpoints: {error}");
            if let Err(restore_error) = self.breakpoints.resync(filename, previous).await {
                error!("{filename}: Restoring breakpoints failed: {restore_error}");
            }
            return Err(error.into());
        }

        let provisional = ProjectionView::new(text, source_map);
        let source_map = provisional.source_map.clone();
        let readiness = file.apply_save(projection, unit, provisional, regenerated);
        match readiness {
            ReloadReadiness::Ready => info!("{filename}: Saved, can be reloaded."),
            ReloadReadiness::Deferred => {
                info!("{filename}: Saved, can NOT be reloaded while the engine holds it.")
            }
        }
        Ok(Saved {
            readiness,
            provisional: source_map,
            breakpoints,
        })
    }

    /// Only valid right after [`save`](Self::save) returned
    /// [`ReloadReadiness::Ready`]. The reload is posted before this returns.
    #[instrument(level = "debug", skip(self))]
    pub async fn force_reload(&self, filename: &str) -> SyncResult<()> {
        let mut file = self.section(filename).await?;
        if !file.reload_ready {
            error!("{filename}: Reload forced without a save that allows it.");
            return Err(SyncError::InvalidReloadRequest {
                filename: filename.to_string(),
            });
        }
        info!("{filename}: Force reload.");
        let event = file.reload();
        self.emit_reload(event).await;
        Ok(())
    }

    /// The engine executes something we have no source mapping for.
    pub async fn mark_invalid(&self, filename: &str) -> SyncResult<()> {
        let mut file = self.section(filename).await?;
        warn!("{filename}: Marked invalid, breakpoints are disabled.");
        file.mark_invalid();
        Ok(())
    }

    /// Resolve `line` through the active map of `projection` and arm a
    /// breakpoint there. Lines without instructions are ignored.
    pub async fn add_breakpoint(
        &self,
        filename: &str,
        line: usize,
        projection: Projection,
    ) -> SyncResult<Option<BytecodePosition>> {
        let file = self.section(filename).await?;
        let Some(position) = file.active_view(projection).source_map.first_on_line(line) else {
            debug!("{filename}: No instruction on line {line}.");
            return Ok(None);
        };
        file.ensure_breakable()?;
        self.breakpoints.add(filename, position).await?;
        self.notify_added(filename, position).await;
        Ok(Some(position))
    }

    /// Arm a breakpoint at a position resolved by the caller, e.g. through
    /// live marks.
    pub async fn add_breakpoint_at(
        &self,
        filename: &str,
        position: BytecodePosition,
    ) -> SyncResult<()> {
        let file = self.section(filename).await?;
        file.ensure_breakable()?;
        self.breakpoints.add(filename, position).await?;
        self.notify_added(filename, position).await;
        Ok(())
    }

    /// Removing is always safe, even while the file is not breakable.
    pub async fn remove_breakpoint(
        &self,
        filename: &str,
        position: BytecodePosition,
    ) -> SyncResult<()> {
        let _file = self.section(filename).await?;
        self.breakpoints.remove(filename, position).await?;
        self.broadcast(filename, || EditorMessage::BreakpointRemoved {
            filename: filename.to_string(),
            position,
        })
        .await;
        Ok(())
    }

    async fn notify_added(&self, filename: &str, position: BytecodePosition) {
        self.broadcast(filename, || EditorMessage::BreakpointAdded {
            filename: filename.to_string(),
            position,
        })
        .await;
    }

    pub async fn list_breakpoints(&self, filename: &str) -> SyncResult<Vec<BytecodePosition>> {
        let _file = self.section(filename).await?;
        Ok(self.breakpoints.list(filename).await?)
    }

    /// The hash check and the resulting transition happen in one exclusive
    /// section, so no save can slip in between.
    #[instrument(level = "debug", skip(self))]
    pub async fn handle_engine_event(&self, event: EngineEvent) -> SyncResult<()> {
        match event {
            EngineEvent::Loaded { filename, hash } => {
                let mut file = self.section(&filename).await?;
                match hash {
                    Some(hash) if hash != file.unit.hash() => {
                        warn!(
                            "{filename}: The engine loaded an unknown binary ({hash:?}, expected {:?}).",
                            file.unit.hash(),
                        );
                        file.flags.opened_in_ground_engine = true;
                        file.mark_invalid();
                    }
                    _ => {
                        info!("{filename}: Opened in ground engine.");
                        if let Some(event) = file.open_in_ground_engine() {
                            self.emit_reload(event).await;
                        }
                    }
                }
                Ok(())
            }
            EngineEvent::Unloaded { filename } => self.close_in_ground_engine(&filename).await,
        }
    }

    /// Process engine notifications until every [`EngineNotifier`] is gone.
    pub async fn run_engine_events(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<EngineEvent>) {
        while let Some(event) = events.recv().await {
            debug!("Engine event: {event:?}");
            if let Err(error) = self.handle_engine_event(event).await {
                error!("Handling an engine event failed: {error}");
            }
        }
        debug!("Engine notifications stopped.");
    }
}
