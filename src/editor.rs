//! The editor context owns everything visual: buffer text, breakpoint
//! markers and the marks that pin instructions to lines. It runs on a single
//! task and is only reached through messages, so other contexts (most
//! importantly the engine's notification thread) never touch its state.

use crate::{
    error::{SyncError, SyncResult},
    marks::{MarkTable, MarkTranslator},
    position::BytecodePosition,
    projection::{PerProjection, Projection, ProjectionView},
    registry::{DebugStatus, FileRegistry, ReloadReadiness, TrackedFile},
};
use itertools::Itertools;
use rustc_hash::FxHashMap;
use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Range,
    sync::Arc,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// A file is clear to reload: the engine no longer executes an outdated
/// copy. `views` are the now active views of both projections.
#[derive(Clone, Debug)]
pub struct ReloadEvent {
    pub filename: String,
    pub authority: Projection,
    pub views: PerProjection<ProjectionView>,
}

#[derive(Debug)]
pub enum EditorMessage {
    Reload(ReloadEvent),
    /// A breakpoint was armed, possibly by another editor or the debugger.
    BreakpointAdded {
        filename: String,
        position: BytecodePosition,
    },
    BreakpointRemoved {
        filename: String,
        position: BytecodePosition,
    },
    Shutdown,
}

/// Posts messages onto the editor's task.
#[derive(Clone, Debug)]
pub struct EditorContext {
    sender: mpsc::UnboundedSender<EditorMessage>,
}
impl EditorContext {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EditorMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Never blocks. Returns `false` if the editor is gone.
    pub fn post(&self, message: EditorMessage) -> bool {
        self.sender.send(message).is_ok()
    }

    pub fn is_same(&self, other: &EditorContext) -> bool {
        self.sender.same_channel(&other.sender)
    }
}

/// A breakpoint that pointed at an instruction no projection shows anymore.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LostBreakpoint {
    pub filename: String,
    pub position: BytecodePosition,
}

#[derive(Debug)]
struct Buffer {
    lines: Vec<String>,
    modified: bool,
    marks: MarkTable,
    provisional: Option<MarkTable>,
    /// Breakpoint markers and the line they are shown on.
    markers: BTreeMap<BytecodePosition, usize>,
}

impl Buffer {
    fn new(text: &str, marks: MarkTable) -> Self {
        Self {
            lines: text.split('\n').map(ToString::to_string).collect(),
            modified: false,
            marks,
            provisional: None,
            markers: BTreeMap::new(),
        }
    }
    fn from_view(view: &ProjectionView) -> Self {
        Self::new(&view.text, MarkTable::from_source_map(&view.source_map))
    }

    fn text(&self) -> String {
        self.lines.join("\n")
    }

    fn marker_lines(&self) -> BTreeSet<usize> {
        self.markers.values().copied().collect()
    }
    fn markers_on_line(&self, line: usize) -> Vec<BytecodePosition> {
        self.markers
            .iter()
            .filter(|(_, marker_line)| **marker_line == line)
            .map(|(position, _)| *position)
            .collect()
    }

    fn insert_lines(&mut self, at: usize, lines: &[&str]) {
        let at = at.min(self.lines.len());
        self.lines
            .splice(at..at, lines.iter().map(ToString::to_string));
        let count = lines.len();
        self.marks.insert_lines(at, count);
        if let Some(provisional) = &mut self.provisional {
            provisional.insert_lines(at, count);
        }
        for line in self.markers.values_mut() {
            if *line >= at {
                *line += count;
            }
        }
        self.modified = true;
    }

    /// Returns the breakpoints whose markers were on deleted lines.
    fn delete_lines(&mut self, range: Range<usize>) -> Vec<BytecodePosition> {
        let range = range.start.min(self.lines.len())..range.end.min(self.lines.len());
        if range.is_empty() {
            return vec![];
        }
        self.lines.drain(range.clone());
        self.marks.delete_lines(range.clone());
        if let Some(provisional) = &mut self.provisional {
            provisional.delete_lines(range.clone());
        }

        let removed = self
            .markers
            .iter()
            .filter(|(_, line)| range.contains(*line))
            .map(|(position, _)| *position)
            .collect_vec();
        for position in &removed {
            self.markers.remove(position);
        }
        for line in self.markers.values_mut() {
            if *line >= range.end {
                *line -= range.len();
            }
        }
        self.modified = true;
        removed
    }
}

#[derive(Debug)]
struct FileView {
    filename: String,
    authority: Projection,
    buffers: PerProjection<Buffer>,
    /// A save produced provisional marks that the next reload activates.
    waiting_for_reload: bool,
    lost: Vec<LostBreakpoint>,
}

impl FileView {
    fn new(file: &TrackedFile) -> Self {
        let mut waiting_for_reload = false;
        let buffers = PerProjection::from_fn(|projection| match file.pending_view(projection) {
            // The text on screen is newer than the unit in the engine, and the
            // marks that matched the old text are gone.
            Some(pending) => {
                waiting_for_reload = true;
                let mut buffer = Buffer::new(&pending.text, MarkTable::default());
                buffer.provisional = Some(MarkTable::from_source_map(&pending.source_map));
                buffer
            }
            None => Buffer::from_view(file.active_view(projection)),
        });
        Self {
            filename: file.filename().to_string(),
            authority: file.authority(),
            buffers,
            waiting_for_reload,
            lost: vec![],
        }
    }

    fn ensure_editable(&self, projection: Projection) -> SyncResult<()> {
        if projection != self.authority {
            return Err(SyncError::ProjectionNotEditable {
                filename: self.filename.clone(),
                projection,
            });
        }
        Ok(())
    }

    fn add_marker(&mut self, position: BytecodePosition) {
        for (projection, buffer) in self.buffers.iter_mut() {
            let Some(text) = buffer.marks.position_of(position) else {
                debug!("{}: No {projection} mark for {position}.", self.filename);
                continue;
            };
            buffer.markers.insert(position, text.line);
        }
    }
    fn remove_marker(&mut self, position: BytecodePosition) {
        for (_, buffer) in self.buffers.iter_mut() {
            buffer.markers.remove(&position);
        }
    }

    /// Show a marker for every position that resolves through the marks
    /// breakpoints currently refer to.
    fn place_markers(&mut self, positions: &[BytecodePosition]) {
        let tables = self.buffers.iter().map(|(projection, buffer)| {
            let table = if self.waiting_for_reload {
                buffer.provisional.as_ref().unwrap_or(&buffer.marks)
            } else {
                &buffer.marks
            };
            (projection, table)
        });
        let (placed, lost) = MarkTranslator::materialize(positions, tables);
        for (projection, position, line) in placed {
            self.buffers.get_mut(projection).markers.insert(position, line);
        }
        for position in lost {
            warn!("{}: Breakpoint at {position} was lost.", self.filename);
            self.lost.push(LostBreakpoint {
                filename: self.filename.clone(),
                position,
            });
        }
    }

    fn apply_reload(&mut self, event: &ReloadEvent) {
        self.authority = event.authority;
        for (projection, buffer) in self.buffers.iter_mut() {
            buffer.markers.clear();
            let view = event.views.get(projection);
            if projection != self.authority {
                // Read-only projections are regenerated, not edited.
                *buffer = Buffer::from_view(view);
                continue;
            }
            match buffer.provisional.take() {
                Some(provisional) if self.waiting_for_reload => buffer.marks = provisional,
                _ => buffer.marks = MarkTable::from_source_map(&view.source_map),
            }
        }
        self.waiting_for_reload = false;
    }
}

/// Owns the views of all files open in the editor and processes the messages
/// posted to its [`EditorContext`].
pub struct ScriptEditor {
    registry: Arc<FileRegistry>,
    context: EditorContext,
    inbox: mpsc::UnboundedReceiver<EditorMessage>,
    files: FxHashMap<String, FileView>,
}

impl ScriptEditor {
    pub fn new(registry: Arc<FileRegistry>) -> Self {
        let (context, inbox) = EditorContext::channel();
        Self {
            registry,
            context,
            inbox,
            files: FxHashMap::default(),
        }
    }

    pub fn context(&self) -> EditorContext {
        self.context.clone()
    }

    fn view(&self, filename: &str) -> SyncResult<&FileView> {
        self.files.get(filename).ok_or_else(|| SyncError::FileNotOpen {
            filename: filename.to_string(),
        })
    }
    fn view_mut(&mut self, filename: &str) -> SyncResult<&mut FileView> {
        self.files
            .get_mut(filename)
            .ok_or_else(|| SyncError::FileNotOpen {
                filename: filename.to_string(),
            })
    }

    pub async fn open(&mut self, filename: &str) -> SyncResult<()> {
        if self.files.contains_key(filename) {
            return Ok(());
        }
        // Listen first so no reload between opening and listening gets lost.
        self.registry.on_reload(filename, self.context()).await;
        let loaded = async {
            let file = self.registry.open_in_editor(filename).await?;
            let breakpoints = self.registry.list_breakpoints(filename).await?;
            Ok::<_, SyncError>((file, breakpoints))
        }
        .await;
        let (file, breakpoints) = match loaded {
            Ok(loaded) => loaded,
            Err(error) => {
                self.registry
                    .remove_reload_listener(filename, &self.context)
                    .await;
                return Err(error);
            }
        };

        let mut view = FileView::new(&file);
        view.place_markers(&breakpoints);
        if let Some(message) = file.status().message() {
            info!("{filename}: {message}");
        }
        self.files.insert(filename.to_string(), view);
        Ok(())
    }

    /// See [`FileRegistry::close_in_editor`]. Returns whether the file was
    /// closed.
    pub async fn close(
        &mut self,
        filename: &str,
        confirm: impl FnOnce() -> bool + Send,
    ) -> SyncResult<bool> {
        self.view(filename)?;
        if !self.registry.close_in_editor(filename, confirm).await? {
            return Ok(false);
        }
        self.registry
            .remove_reload_listener(filename, &self.context)
            .await;
        self.files.remove(filename);
        Ok(true)
    }

    /// A click into the marker gutter of `projection` at `line`: removes the
    /// breakpoints shown there, or adds one for the line's first instruction.
    pub async fn toggle_breakpoint(
        &mut self,
        filename: &str,
        projection: Projection,
        line: usize,
    ) -> SyncResult<()> {
        let registry = self.registry.clone();
        let view = self.view_mut(filename)?;
        if projection != view.authority {
            debug!("{filename}: Ignoring a click into the read-only {projection} projection.");
            return Ok(());
        }

        let buffer = view.buffers.get(projection);
        let shown = buffer.markers_on_line(line);
        if !shown.is_empty() {
            for position in shown {
                registry.remove_breakpoint(filename, position).await?;
                view.remove_marker(position);
            }
            return Ok(());
        }

        if registry.status(filename).await? == DebugStatus::NotBreakable {
            return Err(SyncError::FileNotBreakable {
                filename: filename.to_string(),
            });
        }
        let Some(position) = buffer.marks.first_on_line(line) else {
            return Ok(());
        };
        registry.add_breakpoint_at(filename, position).await?;
        view.add_marker(position);
        Ok(())
    }

    pub async fn insert_lines(
        &mut self,
        filename: &str,
        projection: Projection,
        at: usize,
        lines: &[&str],
    ) -> SyncResult<()> {
        let view = self.view_mut(filename)?;
        view.ensure_editable(projection)?;
        view.buffers.get_mut(projection).insert_lines(at, lines);
        Ok(())
    }

    /// Breakpoints on deleted lines are removed as well.
    pub async fn delete_lines(
        &mut self,
        filename: &str,
        projection: Projection,
        range: Range<usize>,
    ) -> SyncResult<()> {
        let registry = self.registry.clone();
        let view = self.view_mut(filename)?;
        view.ensure_editable(projection)?;
        let removed = view.buffers.get_mut(projection).delete_lines(range);
        for position in removed {
            registry.remove_breakpoint(filename, position).await?;
            view.remove_marker(position);
        }
        Ok(())
    }

    /// Save the editable projection if it has changes. Returns `None` if
    /// there was nothing to save.
    pub async fn save(&mut self, filename: &str) -> SyncResult<Option<ReloadReadiness>> {
        let registry = self.registry.clone();
        let view = self.view_mut(filename)?;
        let projection = view.authority;
        let buffer = view.buffers.get_mut(projection);
        if !buffer.modified {
            return Ok(None);
        }
        info!("{filename}: Save.");

        let saved = registry
            .save(filename, projection, &buffer.text(), &buffer.marker_lines())
            .await?;
        buffer.modified = false;
        buffer.provisional = Some(MarkTable::from_source_map(&saved.provisional));
        view.waiting_for_reload = true;

        if saved.readiness == ReloadReadiness::Ready {
            registry.force_reload(filename).await?;
        }
        Ok(Some(saved.readiness))
    }

    async fn on_reload(&mut self, event: ReloadEvent) {
        let filename = event.filename.clone();
        if !self.files.contains_key(&filename) {
            debug!("{filename}: Reload for a file that is no longer open.");
            return;
        }
        info!("{filename}: On reload.");
        let breakpoints = match self.registry.list_breakpoints(&filename).await {
            Ok(breakpoints) => breakpoints,
            Err(error) => {
                error!("{filename}: Can't restore breakpoints after reload: {error}");
                vec![]
            }
        };
        let Some(view) = self.files.get_mut(&filename) else {
            return;
        };
        view.apply_reload(&event);
        view.place_markers(&breakpoints);
    }

    /// Returns `false` once the editor should stop.
    pub async fn handle(&mut self, message: EditorMessage) -> bool {
        match message {
            EditorMessage::Reload(event) => {
                self.on_reload(event).await;
                true
            }
            EditorMessage::BreakpointAdded { filename, position } => {
                if let Some(view) = self.files.get_mut(&filename) {
                    view.add_marker(position);
                }
                true
            }
            EditorMessage::BreakpointRemoved { filename, position } => {
                if let Some(view) = self.files.get_mut(&filename) {
                    view.remove_marker(position);
                }
                true
            }
            EditorMessage::Shutdown => false,
        }
    }

    /// Handle everything posted so far without waiting for more.
    pub async fn run_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.inbox.try_recv() {
            handled += 1;
            if !self.handle(message).await {
                break;
            }
        }
        handled
    }

    /// Handle messages until [`EditorMessage::Shutdown`] arrives.
    pub async fn run(mut self) {
        while let Some(message) = self.inbox.recv().await {
            if !self.handle(message).await {
                break;
            }
        }
        debug!("Editor stopped.");
    }

    pub fn has_changes(&self, filename: &str) -> bool {
        self.files
            .get(filename)
            .map_or(false, |view| view.buffers.iter().any(|(_, it)| it.modified))
    }
    pub fn is_waiting_for_reload(&self, filename: &str) -> bool {
        self.files
            .get(filename)
            .map_or(false, |view| view.waiting_for_reload)
    }
    pub fn text(&self, filename: &str, projection: Projection) -> SyncResult<String> {
        Ok(self.view(filename)?.buffers.get(projection).text())
    }
    pub fn breakpoint_lines(
        &self,
        filename: &str,
        projection: Projection,
    ) -> SyncResult<BTreeSet<usize>> {
        Ok(self.view(filename)?.buffers.get(projection).marker_lines())
    }
    pub fn take_lost_breakpoints(&mut self, filename: &str) -> Vec<LostBreakpoint> {
        self.files
            .get_mut(filename)
            .map(|view| std::mem::take(&mut view.lost))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        breakpoints::BreakpointStore,
        testing::{registry_with, SCRIPT},
    };

    const F: &str = "scripts/f.ssb";

    fn at(routine: usize, opcode: usize) -> BytecodePosition {
        BytecodePosition::new(routine, opcode)
    }

    async fn editor() -> (ScriptEditor, Arc<FileRegistry>) {
        let (registry, _) = registry_with(&[(F, SCRIPT)]);
        let registry = Arc::new(registry);
        let mut editor = ScriptEditor::new(registry.clone());
        editor.open(F).await.unwrap();
        (editor, registry)
    }

    #[tokio::test]
    async fn deferred_reload_restores_breakpoints_on_the_moved_line() {
        let (mut editor, registry) = editor().await;
        registry.open_in_ground_engine(F).await.unwrap();

        editor.toggle_breakpoint(F, Projection::Primary, 10).await.unwrap();
        assert_eq!(editor.run_pending().await, 1);
        assert_eq!(registry.list_breakpoints(F).await.unwrap(), vec![at(2, 5)]);
        assert_eq!(
            editor.breakpoint_lines(F, Projection::Derived).unwrap(),
            BTreeSet::from([11]),
        );

        editor.insert_lines(F, Projection::Primary, 10, &[""]).await.unwrap();
        assert_eq!(
            editor.breakpoint_lines(F, Projection::Primary).unwrap(),
            BTreeSet::from([11]),
        );
        assert!(editor.has_changes(F));

        let readiness = editor.save(F).await.unwrap();
        assert_eq!(readiness, Some(ReloadReadiness::Deferred));
        assert!(editor.is_waiting_for_reload(F));
        assert!(!editor.has_changes(F));
        assert_eq!(registry.list_breakpoints(F).await.unwrap(), vec![at(2, 5)]);

        // The engine still runs the old unit: clicks resolve through old marks.
        assert_eq!(editor.run_pending().await, 0);

        registry.close_in_ground_engine(F).await.unwrap();
        assert_eq!(editor.run_pending().await, 1);
        assert!(!editor.is_waiting_for_reload(F));
        assert_eq!(
            editor.breakpoint_lines(F, Projection::Primary).unwrap(),
            BTreeSet::from([11]),
        );
        assert_eq!(
            editor.breakpoint_lines(F, Projection::Derived).unwrap(),
            BTreeSet::from([11]),
        );
        assert!(editor.take_lost_breakpoints(F).is_empty());
    }

    #[tokio::test]
    async fn ready_saves_reload_right_away() {
        let (mut editor, registry) = editor().await;
        editor.toggle_breakpoint(F, Projection::Primary, 13).await.unwrap();
        editor.run_pending().await;
        editor.insert_lines(F, Projection::Primary, 0, &["// header", ""]).await.unwrap();

        assert_eq!(editor.save(F).await.unwrap(), Some(ReloadReadiness::Ready));
        assert_eq!(editor.run_pending().await, 1);

        assert_eq!(
            editor.breakpoint_lines(F, Projection::Primary).unwrap(),
            BTreeSet::from([15]),
        );
        assert_eq!(registry.list_breakpoints(F).await.unwrap(), vec![at(3, 0)]);
        assert_eq!(
            editor.text(F, Projection::Derived).unwrap(),
            registry
                .get(F)
                .await
                .unwrap()
                .active_view(Projection::Derived)
                .text
                .to_string(),
        );
        assert_eq!(editor.save(F).await.unwrap(), None);
    }

    #[tokio::test]
    async fn breakpoints_on_deleted_lines_are_removed() {
        let (mut editor, registry) = editor().await;
        editor.toggle_breakpoint(F, Projection::Primary, 2).await.unwrap();
        editor.toggle_breakpoint(F, Projection::Primary, 6).await.unwrap();

        editor.delete_lines(F, Projection::Primary, 1..3).await.unwrap();
        assert_eq!(registry.list_breakpoints(F).await.unwrap(), vec![at(2, 1)]);
        assert_eq!(
            editor.breakpoint_lines(F, Projection::Primary).unwrap(),
            BTreeSet::from([4]),
        );
    }

    #[tokio::test]
    async fn unknown_positions_are_reported_as_lost() {
        let (mut editor, registry) = editor().await;
        registry.add_breakpoint_at(F, at(7, 7)).await.unwrap();
        registry.add_breakpoint_at(F, at(0, 1)).await.unwrap();

        registry.mark_invalid(F).await.unwrap();
        registry.close_in_ground_engine(F).await.unwrap();
        editor.run_pending().await;

        assert_eq!(
            editor.take_lost_breakpoints(F),
            vec![LostBreakpoint {
                filename: F.to_string(),
                position: at(7, 7),
            }],
        );
        assert_eq!(
            editor.breakpoint_lines(F, Projection::Primary).unwrap(),
            BTreeSet::from([2]),
        );
    }

    #[tokio::test]
    async fn only_the_editable_projection_accepts_changes() {
        let (mut editor, registry) = editor().await;
        editor.toggle_breakpoint(F, Projection::Derived, 11).await.unwrap();
        assert!(registry.list_breakpoints(F).await.unwrap().is_empty());
        assert!(matches!(
            editor.insert_lines(F, Projection::Derived, 0, &["x"]).await,
            Err(SyncError::ProjectionNotEditable { .. }),
        ));

        editor.toggle_breakpoint(F, Projection::Primary, 1).await.unwrap();
        editor.toggle_breakpoint(F, Projection::Primary, 1).await.unwrap();
        assert!(registry.list_breakpoints(F).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closing_a_stale_file_needs_confirmation_and_disables_debugging() {
        let (mut editor, registry) = editor().await;
        registry.open_in_ground_engine(F).await.unwrap();
        editor.insert_lines(F, Projection::Primary, 14, &["routine 5", "    e0"]).await.unwrap();
        editor.save(F).await.unwrap();

        assert!(!editor.close(F, || false).await.unwrap());
        assert!(editor.text(F, Projection::Primary).is_ok());
        assert!(editor.close(F, || true).await.unwrap());
        assert!(matches!(
            editor.text(F, Projection::Primary),
            Err(SyncError::FileNotOpen { .. }),
        ));

        // Reopened, the newer text is shown but breakpoints stay disabled.
        editor.open(F).await.unwrap();
        assert!(editor.is_waiting_for_reload(F));
        assert!(editor.text(F, Projection::Primary).unwrap().contains("routine 5"));
        let error = editor
            .toggle_breakpoint(F, Projection::Primary, 1)
            .await
            .unwrap_err();
        assert!(error.is_user_facing());

        registry.close_in_ground_engine(F).await.unwrap();
        editor.run_pending().await;
        editor.toggle_breakpoint(F, Projection::Primary, 15).await.unwrap();
        assert_eq!(registry.list_breakpoints(F).await.unwrap(), vec![at(5, 0)]);
    }

    #[tokio::test]
    async fn the_editor_task_runs_until_shutdown() {
        let (editor, registry) = editor().await;
        let context = editor.context();
        let task = tokio::spawn(editor.run());

        registry.mark_invalid(F).await.unwrap();
        registry.close_in_ground_engine(F).await.unwrap();
        assert!(context.post(EditorMessage::Shutdown));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn reloads_for_closed_files_are_ignored() {
        let (mut editor, registry) = editor().await;
        assert!(editor.close(F, || true).await.unwrap());

        let (context, _inbox) = EditorContext::channel();
        assert!(!context.is_same(&editor.context()));
        registry.on_reload(F, editor.context()).await;
        registry.mark_invalid(F).await.unwrap();
        registry.close_in_ground_engine(F).await.unwrap();
        assert_eq!(editor.run_pending().await, 1);
        assert!(!editor.has_changes(F));
    }

    #[tokio::test]
    async fn opening_restores_stored_breakpoints() {
        let (registry, store) = registry_with(&[(F, SCRIPT)]);
        store.add(F, at(2, 0)).await.unwrap();
        let mut editor = ScriptEditor::new(Arc::new(registry));
        editor.open(F).await.unwrap();
        assert_eq!(
            editor.breakpoint_lines(F, Projection::Primary).unwrap(),
            BTreeSet::from([5]),
        );
    }

    #[tokio::test]
    async fn breakpoint_changes_reach_every_editor() {
        let (mut first, registry) = editor().await;
        let mut second = ScriptEditor::new(registry.clone());
        second.open(F).await.unwrap();

        first.toggle_breakpoint(F, Projection::Primary, 10).await.unwrap();
        assert_eq!(second.run_pending().await, 1);
        assert_eq!(
            second.breakpoint_lines(F, Projection::Primary).unwrap(),
            BTreeSet::from([10]),
        );
        assert_eq!(
            second.breakpoint_lines(F, Projection::Derived).unwrap(),
            BTreeSet::from([11]),
        );

        // Armed by the debugger, not by an editor.
        registry.add_breakpoint(F, 13, Projection::Primary).await.unwrap();
        first.run_pending().await;
        assert_eq!(
            first.breakpoint_lines(F, Projection::Primary).unwrap(),
            BTreeSet::from([10, 13]),
        );

        second.toggle_breakpoint(F, Projection::Primary, 10).await.unwrap();
        first.run_pending().await;
        assert_eq!(
            first.breakpoint_lines(F, Projection::Primary).unwrap(),
            BTreeSet::from([13]),
        );
        assert_eq!(
            first.breakpoint_lines(F, Projection::Derived).unwrap(),
            BTreeSet::from([14]),
        );
    }
}
