// ThemeEngine Service
// Owns the saved palette, preview override and draft session, and exposes
// the single effective palette every storefront view renders with.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::models::{
    default_palette, ColorPalette, ColorToken, DraftSession, EditorTab, EngineSnapshot,
    PaletteSection, SaveMode, ThemeDescriptor, ThemeError, ThemeListing, ThemeResult, ThemeState,
};
use crate::services::{
    emit_event, CustomThemeStore, EventSink, NoopEventSink, PaletteGateway, SessionDraftStore,
    ThemeCatalog, CUSTOM_THEMES_UPDATED_EVENT, PALETTE_CHANGED_EVENT, THEME_STATE_CHANGED_EVENT,
};

const DEFAULT_PROPAGATION_DEBOUNCE: Duration = Duration::from_millis(100);
const CUSTOM_NAME_SUFFIX: &str = " (Custom)";

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Quiet period after the last draft edit before it is mirrored into the
    /// preview layer and written to the session store
    pub propagation_debounce: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            propagation_debounce: DEFAULT_PROPAGATION_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone)]
enum PreviewSource {
    /// Explicit `preview_theme`; remembers what was shown before the first preview
    Theme { id: String, pre_preview: ColorPalette },
    /// Debounced copy of the draft while customizing
    DraftMirror,
}

#[derive(Debug, Clone)]
struct PreviewOverride {
    palette: ColorPalette,
    source: PreviewSource,
}

impl PreviewOverride {
    fn mirror(palette: ColorPalette) -> Self {
        Self {
            palette,
            source: PreviewSource::DraftMirror,
        }
    }

    fn theme_id(&self) -> Option<&str> {
        match &self.source {
            PreviewSource::Theme { id, .. } => Some(id),
            PreviewSource::DraftMirror => None,
        }
    }
}

#[derive(Default)]
struct Propagation {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

struct EngineState {
    saved: ColorPalette,
    preview: Option<PreviewOverride>,
    session: Option<DraftSession>,
    active_tab: EditorTab,
    current_preset: Option<String>,
    saving: bool,
    /// Bumped whenever a session is opened or closed, so an in-flight
    /// save/apply can tell whether it still owns the session it started with
    session_epoch: u64,
    propagation: Propagation,
}

impl EngineState {
    fn mode(&self) -> ThemeState {
        if self.session.is_some() {
            ThemeState::Customizing
        } else if self.previewing_theme_id().is_some() {
            ThemeState::Previewing
        } else {
            ThemeState::Idle
        }
    }

    fn previewing_theme_id(&self) -> Option<&str> {
        self.preview.as_ref().and_then(PreviewOverride::theme_id)
    }

    /// Layered theme preview, else the draft, else the saved palette
    fn effective(&self) -> &ColorPalette {
        match (&self.preview, &self.session) {
            (Some(preview), _) if preview.theme_id().is_some() => &preview.palette,
            (_, Some(session)) => &session.draft,
            _ => &self.saved,
        }
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            state: self.mode(),
            effective_palette: self.effective().clone(),
            saved_palette: self.saved.clone(),
            previewing_theme_id: self.previewing_theme_id().map(str::to_string),
            session: self.session.clone(),
            active_tab: self.active_tab,
            current_preset: self.current_preset.clone(),
            saving: self.saving,
        }
    }
}

struct EngineInner {
    catalog: ThemeCatalog,
    custom_themes: CustomThemeStore,
    session_store: SessionDraftStore,
    gateway: Arc<dyn PaletteGateway>,
    events: Arc<dyn EventSink>,
    settings: EngineSettings,
    state: Mutex<EngineState>,
}

/// Builder for [`ThemeEngine`]
pub struct ThemeEngineBuilder {
    catalog: ThemeCatalog,
    custom_themes: CustomThemeStore,
    session_store: SessionDraftStore,
    gateway: Arc<dyn PaletteGateway>,
    events: Arc<dyn EventSink>,
    settings: EngineSettings,
    initial_palette: ColorPalette,
}

impl ThemeEngineBuilder {
    pub fn catalog(mut self, catalog: ThemeCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Palette the site is showing at startup
    pub fn initial_palette(mut self, palette: ColorPalette) -> Self {
        self.initial_palette = palette;
        self
    }

    pub fn build(self) -> ThemeEngine {
        let state = EngineState {
            saved: self.initial_palette,
            preview: None,
            session: None,
            active_tab: EditorTab::default(),
            current_preset: None,
            saving: false,
            session_epoch: 0,
            propagation: Propagation::default(),
        };

        ThemeEngine {
            inner: Arc::new(EngineInner {
                catalog: self.catalog,
                custom_themes: self.custom_themes,
                session_store: self.session_store,
                gateway: self.gateway,
                events: self.events,
                settings: self.settings,
                state: Mutex::new(state),
            }),
        }
    }
}

/// Clears the `saving` flag if a save/apply future is dropped or bails out early
struct SavingGuard<'a> {
    engine: &'a ThemeEngine,
    active: bool,
}

impl<'a> SavingGuard<'a> {
    fn new(engine: &'a ThemeEngine) -> Self {
        Self { engine, active: true }
    }

    /// Clear the flag under an already-held lock
    fn release(mut self, state: &mut EngineState) {
        state.saving = false;
        self.active = false;
    }
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            self.engine.lock().saving = false;
        }
    }
}

/// Theme customization and live preview engine.
///
/// Cheap to clone; all clones share one state. Synchronous operations run to
/// completion under the state lock. `apply_preset` and `save_custom_theme`
/// release the lock while the gateway call is in flight and hold the
/// `saving` flag instead, so a second save/apply is rejected rather than
/// queued.
#[derive(Clone)]
pub struct ThemeEngine {
    inner: Arc<EngineInner>,
}

impl ThemeEngine {
    pub fn builder(
        custom_themes: CustomThemeStore,
        session_store: SessionDraftStore,
        gateway: Arc<dyn PaletteGateway>,
    ) -> ThemeEngineBuilder {
        ThemeEngineBuilder {
            catalog: ThemeCatalog::builtin().clone(),
            custom_themes,
            session_store,
            gateway,
            events: Arc::new(NoopEventSink),
            settings: EngineSettings::default(),
            initial_palette: default_palette(),
        }
    }

    // ===== Reads =====

    /// The palette every rendering consumer reads
    pub fn effective_palette(&self) -> ColorPalette {
        self.lock().effective().clone()
    }

    pub fn saved_palette(&self) -> ColorPalette {
        self.lock().saved.clone()
    }

    /// Current preview layer, whether an explicit preview or the draft mirror
    pub fn preview_override(&self) -> Option<ColorPalette> {
        self.lock().preview.as_ref().map(|preview| preview.palette.clone())
    }

    pub fn state(&self) -> ThemeState {
        self.lock().mode()
    }

    pub fn session(&self) -> Option<DraftSession> {
        self.lock().session.clone()
    }

    /// Advisory marker of the last applied preset or saved custom theme
    pub fn current_preset(&self) -> Option<String> {
        self.lock().current_preset.clone()
    }

    pub fn is_saving(&self) -> bool {
        self.lock().saving
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.lock().snapshot()
    }

    pub fn list_themes(&self) -> ThemeListing {
        ThemeListing {
            standard: self.inner.catalog.standard(),
            holiday: self.inner.catalog.holiday(),
            custom: self.inner.custom_themes.list(),
        }
    }

    // ===== Presets and preview =====

    /// Make a preset (or custom theme) the live site palette and drop any
    /// preview or draft
    pub async fn apply_preset(&self, id: &str) -> ThemeResult<ColorPalette> {
        let (palette, epoch) = {
            let mut state = self.lock();
            if state.saving {
                return Err(ThemeError::SaveInProgress);
            }
            let descriptor = self.resolve(id)?;
            state.saving = true;
            (descriptor.palette, state.session_epoch)
        };
        let guard = SavingGuard::new(self);

        log::info!("Applying preset '{id}'");
        let result = self.inner.gateway.apply_palette(&palette).await;

        self.transition(|state| {
            guard.release(state);
            let applied = result.map_err(|e| {
                log::error!("Failed to apply preset '{id}': {e}");
                ThemeError::Persistence(e)
            })?;

            state.saved = applied.clone();
            if state.session_epoch == epoch {
                self.end_customization(state);
            } else {
                log::info!("Customization started while '{id}' was applying; keeping it open");
            }
            state.current_preset = Some(id.to_string());
            log::info!("Preset '{id}' applied");
            Ok(applied)
        })
    }

    /// Toggle a preview of the given theme; returns the resulting effective palette.
    ///
    /// Previewing the theme that is already previewed cancels the preview.
    /// Switching straight to another theme keeps the snapshot taken before the
    /// first preview, so cancelling always returns to that.
    pub fn preview_theme(&self, id: &str) -> ThemeResult<ColorPalette> {
        self.transition(|state| {
            if state.previewing_theme_id() == Some(id) {
                let pre_preview = match state.preview.take().map(|preview| preview.source) {
                    Some(PreviewSource::Theme { pre_preview, .. }) => pre_preview,
                    _ => state.effective().clone(),
                };
                state.preview = state
                    .session
                    .as_ref()
                    .map(|session| PreviewOverride::mirror(session.draft.clone()));
                if state.effective() != &pre_preview {
                    log::warn!("Palette changed underneath preview of '{id}'");
                }
                log::info!("Preview of '{id}' cancelled");
                return Ok(state.effective().clone());
            }

            let descriptor = self.resolve(id)?;
            let pre_preview = match &state.preview {
                Some(PreviewOverride {
                    source: PreviewSource::Theme { pre_preview, .. },
                    ..
                }) => pre_preview.clone(),
                _ => state.effective().clone(),
            };

            state.preview = Some(PreviewOverride {
                palette: descriptor.palette,
                source: PreviewSource::Theme {
                    id: id.to_string(),
                    pre_preview,
                },
            });
            log::info!("Previewing theme '{id}'");
            Ok(state.effective().clone())
        })
    }

    // ===== Entering customization =====

    /// Start customizing a copy of a theme.
    ///
    /// Custom themes are edited in place; built-ins always produce a new
    /// custom theme on save, remembering where they came from.
    pub fn copy_theme(&self, id: &str) -> ThemeResult<DraftSession> {
        let descriptor = self.resolve(id)?;
        let session = session_from(&descriptor);

        self.transition(|state| {
            state.active_tab = EditorTab::Customize;
            self.open_session(state, session.clone());
            log::info!(
                "Customizing '{}' (target {:?})",
                descriptor.id,
                session.target_theme_id
            );
            Ok(session)
        })
    }

    /// Start customizing from whatever is currently on screen
    pub fn start_blank_customization(&self) -> ThemeResult<DraftSession> {
        self.transition(|state| {
            let session = DraftSession::new(state.effective().clone());
            state.active_tab = EditorTab::Customize;
            self.open_session(state, session.clone());
            log::info!("Customizing from current palette");
            Ok(session)
        })
    }

    /// Restore a session stored earlier in this browsing session.
    ///
    /// The stored `original` is kept verbatim; it is never re-captured.
    pub fn resume_session(&self) -> ThemeResult<Option<DraftSession>> {
        self.transition(|state| {
            if let Some(session) = &state.session {
                return Ok(Some(session.clone()));
            }

            let Some(record) = self.inner.session_store.load() else {
                return Ok(None);
            };

            self.cancel_propagation(state);
            state.session_epoch += 1;
            state.preview = Some(PreviewOverride::mirror(record.session.draft.clone()));
            state.session = Some(record.session.clone());
            state.active_tab = record.active_tab;
            log::info!(
                "Resumed customization session (target {:?})",
                record.session.target_theme_id
            );
            Ok(Some(record.session))
        })
    }

    // ===== Draft edits =====

    /// Set one draft color; invalid tokens leave the draft unchanged
    pub fn set_draft_color(
        &self,
        section: PaletteSection,
        property: &str,
        token: &str,
    ) -> ThemeResult<ColorPalette> {
        self.edit_draft(|state| {
            let session = state.session.as_mut().ok_or(ThemeError::NotCustomizing)?;
            let token = ColorToken::parse(token)?;
            session.draft = session.draft.with_color(section, property, token)?;
            let draft = session.draft.clone();

            self.draft_changed(state);
            Ok(draft)
        })
    }

    /// Put one property back to its value at session start
    pub fn reset_color(&self, section: PaletteSection, property: &str) -> ThemeResult<ColorPalette> {
        self.edit_draft(|state| {
            let session = state.session.as_mut().ok_or(ThemeError::NotCustomizing)?;
            let reset = session.draft.with_color_from(&session.original, section, property)?;
            if reset == session.draft {
                return Ok(reset);
            }
            session.draft = reset.clone();

            self.draft_changed(state);
            Ok(reset)
        })
    }

    /// Put a whole section back to its values at session start
    pub fn reset_section(&self, section: PaletteSection) -> ThemeResult<ColorPalette> {
        self.edit_draft(|state| {
            let session = state.session.as_mut().ok_or(ThemeError::NotCustomizing)?;
            let reset = session.draft.with_section_from(&session.original, section);
            if reset == session.draft {
                return Ok(reset);
            }
            session.draft = reset.clone();

            self.draft_changed(state);
            Ok(reset)
        })
    }

    /// Put the entire draft back to the session-start snapshot
    pub fn reset_all(&self) -> ThemeResult<ColorPalette> {
        self.transition(|state| {
            let session = state.session.as_ref().ok_or(ThemeError::NotCustomizing)?;
            if session.draft == session.original {
                return Ok(session.draft.clone());
            }

            let mut reset = session.clone();
            reset.draft = reset.original.clone();
            let draft = reset.draft.clone();
            self.begin_session(state, reset);
            log::info!("Draft reset to session start");
            Ok(draft)
        })
    }

    pub fn set_active_tab(&self, tab: EditorTab) -> ThemeResult<()> {
        self.transition(|state| {
            state.active_tab = tab;
            if let Some(session) = &state.session {
                if let Err(e) = self.inner.session_store.save(session, tab) {
                    log::warn!("Failed to store draft session: {e}");
                }
            }
            Ok(())
        })
    }

    /// Run a pending debounced propagation immediately
    pub fn flush_pending(&self) {
        let snapshot = {
            let mut state = self.lock();
            let Some(pending) = state.propagation.pending.take() else {
                return;
            };
            pending.abort();
            state.propagation.generation += 1;
            self.propagate(&mut state);
            state.snapshot()
        };
        emit_event(self.inner.events.as_ref(), THEME_STATE_CHANGED_EVENT, &snapshot);
    }

    // ===== Leaving customization =====

    /// Save the draft as a custom theme and apply it site-wide
    pub async fn save_custom_theme(
        &self,
        name: &str,
        description: &str,
        mode: SaveMode,
    ) -> ThemeResult<ThemeDescriptor> {
        let (draft, target_theme_id, base_theme_id, epoch) = {
            let mut state = self.lock();
            if state.saving {
                return Err(ThemeError::SaveInProgress);
            }
            let session = state.session.as_ref().ok_or(ThemeError::NotCustomizing)?;
            if name.trim().is_empty() {
                return Err(ThemeError::NameRequired);
            }
            let parts = (
                session.draft.clone(),
                session.target_theme_id.clone(),
                session.base_theme_id.clone(),
                state.session_epoch,
            );
            state.saving = true;
            parts
        };
        let guard = SavingGuard::new(self);
        let name = name.trim();

        let updated = match &target_theme_id {
            Some(id) => {
                let write = self.inner.custom_themes.update(id, name, description, &draft);
                write.value.map(|theme| (theme, write.durable))
            }
            None => None,
        };
        let (theme, durable) = match updated {
            Some(updated) => updated,
            None => {
                // New theme, or the edited one was deleted while the session was open
                let write = self.inner.custom_themes.create(
                    name,
                    description,
                    &draft,
                    base_theme_id.as_deref(),
                );
                (write.value, write.durable)
            }
        };
        self.emit_custom_themes();

        // The session now targets the stored theme, so a retry updates instead of duplicating
        {
            let mut state = self.lock();
            let same_session = state.session_epoch == epoch;
            if let Some(session) = state.session.as_mut().filter(|_| same_session) {
                session.target_theme_id = Some(theme.id.clone());
                session.name = name.to_string();
                session.description = description.to_string();
            }
        }

        if let Err(e) = durable {
            self.transition(|state| {
                guard.release(state);
                Ok(())
            })?;
            return Err(e);
        }

        let result = self.inner.gateway.apply_palette(&draft).await;

        self.transition(|state| {
            guard.release(state);
            let applied = result.map_err(|e| {
                log::error!("Failed to apply custom theme '{}': {e}", theme.id);
                ThemeError::Persistence(e)
            })?;

            state.saved = applied;
            state.current_preset = Some(theme.id.clone());

            // Only the session that was saved, with nothing typed since, may be closed
            let same_session = state.session_epoch == epoch;
            let untouched = same_session
                && state.session.as_ref().is_some_and(|session| session.draft == draft);
            match mode {
                _ if !same_session => {
                    log::info!("Session replaced while '{}' was saving; keeping it open", theme.id);
                }
                _ if !untouched => {
                    log::info!("Draft edited while '{}' was saving; still customizing", theme.id);
                }
                SaveMode::Exit => self.end_customization(state),
                SaveMode::Continue => self.propagate(state),
            }
            log::info!("Saved custom theme '{}' ({})", theme.name, theme.id);
            Ok(theme)
        })
    }

    /// Drop the draft and any preview and return to the saved palette
    pub fn cancel_customization(&self) -> ThemeResult<ColorPalette> {
        self.transition(|state| {
            if state.session.is_some() {
                log::info!("Customization cancelled");
            }
            self.end_customization(state);
            Ok(state.effective().clone())
        })
    }

    // ===== Custom theme management =====

    pub fn custom_themes(&self) -> Vec<ThemeDescriptor> {
        self.inner.custom_themes.list()
    }

    /// Delete a custom theme. A session editing it will create a new theme on save.
    pub fn delete_custom_theme(&self, id: &str) -> ThemeResult<bool> {
        let write = self.inner.custom_themes.delete(id);
        if write.value {
            self.transition(|state| {
                if let Some(session) = state.session.as_mut() {
                    if session.target_theme_id.as_deref() == Some(id) {
                        session.target_theme_id = None;
                        if let Err(e) = self.inner.session_store.save(session, state.active_tab) {
                            log::warn!("Failed to store draft session: {e}");
                        }
                    }
                }
                if state.current_preset.as_deref() == Some(id) {
                    state.current_preset = None;
                }
                Ok(())
            })?;
            self.emit_custom_themes();
        }
        write.into_result()
    }

    // ===== Internals =====

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner.state.lock().unwrap_or_else(|e| {
            log::warn!("Theme engine lock poisoned, recovering: {}", e);
            e.into_inner()
        })
    }

    /// Run a mutation under the lock, then notify listeners of what changed
    fn transition<R>(&self, f: impl FnOnce(&mut EngineState) -> ThemeResult<R>) -> ThemeResult<R> {
        let (result, before, after) = {
            let mut state = self.lock();
            let before = state.snapshot();
            let result = f(&mut *state);
            let after = state.snapshot();
            (result, before, after)
        };

        if after.effective_palette != before.effective_palette {
            emit_event(
                self.inner.events.as_ref(),
                PALETTE_CHANGED_EVENT,
                &after.effective_palette,
            );
        }
        if after != before {
            emit_event(self.inner.events.as_ref(), THEME_STATE_CHANGED_EVENT, &after);
        }
        result
    }

    /// Debounced draft edits: the palette event goes out now, while the
    /// state event waits for the propagation that follows the last edit.
    /// Ending a layered preview is a mode change and is announced at once.
    fn edit_draft<R>(&self, f: impl FnOnce(&mut EngineState) -> ThemeResult<R>) -> ThemeResult<R> {
        let (result, palette, snapshot) = {
            let mut state = self.lock();
            let was_previewing = state.previewing_theme_id().is_some();
            let before = state.effective().clone();
            let result = f(&mut *state);

            let after = state.effective();
            let palette = (*after != before).then(|| after.clone());
            let preview_ended = was_previewing && state.previewing_theme_id().is_none();
            // Outside a runtime the edit was propagated inline
            let propagated = palette.is_some() && state.propagation.pending.is_none();
            let snapshot = (preview_ended || propagated).then(|| state.snapshot());
            (result, palette, snapshot)
        };

        if let Some(palette) = palette {
            emit_event(self.inner.events.as_ref(), PALETTE_CHANGED_EVENT, &palette);
        }
        if let Some(snapshot) = snapshot {
            emit_event(self.inner.events.as_ref(), THEME_STATE_CHANGED_EVENT, &snapshot);
        }
        result
    }

    fn emit_custom_themes(&self) {
        emit_event(
            self.inner.events.as_ref(),
            CUSTOM_THEMES_UPDATED_EVENT,
            &self.inner.custom_themes.list(),
        );
    }

    /// Custom store first, then the built-in catalog
    fn resolve(&self, id: &str) -> ThemeResult<ThemeDescriptor> {
        self.inner
            .custom_themes
            .find(id)
            .or_else(|| self.inner.catalog.find(id).cloned())
            .ok_or_else(|| ThemeError::ThemeNotFound(id.to_string()))
    }

    /// Replace the whole session at once: pending propagation is dropped and
    /// the new draft is propagated exactly once
    fn begin_session(&self, state: &mut EngineState, session: DraftSession) {
        self.cancel_propagation(state);
        state.preview = None;
        state.session = Some(session);
        self.propagate(state);
    }

    /// A new session replacing whatever was open
    fn open_session(&self, state: &mut EngineState, session: DraftSession) {
        state.session_epoch += 1;
        self.begin_session(state, session);
    }

    fn end_customization(&self, state: &mut EngineState) {
        self.cancel_propagation(state);
        state.preview = None;
        if state.session.take().is_some() {
            state.session_epoch += 1;
            self.inner.session_store.clear();
        }
    }

    /// A single-property edit: drops a layered theme preview and debounces propagation
    fn draft_changed(&self, state: &mut EngineState) {
        if state.previewing_theme_id().is_some() {
            state.preview = None;
        }
        self.schedule_propagation(state);
    }

    fn cancel_propagation(&self, state: &mut EngineState) {
        state.propagation.generation += 1;
        if let Some(pending) = state.propagation.pending.take() {
            pending.abort();
        }
    }

    fn schedule_propagation(&self, state: &mut EngineState) {
        self.cancel_propagation(state);
        let generation = state.propagation.generation;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.propagate(state);
            return;
        };

        let engine: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let delay = self.inner.settings.propagation_debounce;
        state.propagation.pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = engine.upgrade() {
                ThemeEngine { inner }.run_scheduled_propagation(generation);
            }
        }));
    }

    fn run_scheduled_propagation(&self, generation: u64) {
        let snapshot = {
            let mut state = self.lock();
            if state.propagation.generation != generation {
                log::debug!("Skipping superseded draft propagation #{generation}");
                return;
            }
            state.propagation.pending = None;
            self.propagate(&mut state);
            state.snapshot()
        };
        emit_event(self.inner.events.as_ref(), THEME_STATE_CHANGED_EVENT, &snapshot);
    }

    /// Mirror the draft into the preview layer and the session store
    fn propagate(&self, state: &mut EngineState) {
        let Some(session) = state.session.as_ref() else {
            return;
        };

        let layered_theme = state.previewing_theme_id().is_some();
        let mirrored = matches!(&state.preview, Some(preview) if preview.palette == session.draft);
        if !layered_theme && !mirrored {
            state.preview = Some(PreviewOverride::mirror(session.draft.clone()));
        }

        if let Err(e) = self.inner.session_store.save(session, state.active_tab) {
            log::warn!("Failed to store draft session: {e}");
        }
        log::debug!("Draft propagated");
    }
}

fn session_from(descriptor: &ThemeDescriptor) -> DraftSession {
    let mut session = DraftSession::new(descriptor.palette.clone());
    if descriptor.is_custom() {
        session.target_theme_id = Some(descriptor.id.clone());
        session.base_theme_id = descriptor.base_theme_id.clone();
        session.name = descriptor.name.clone();
        session.description = descriptor.description.clone();
    } else {
        session.base_theme_id = Some(descriptor.id.clone());
        session.name = format!("{}{CUSTOM_NAME_SUFFIX}", descriptor.name);
        session.description = descriptor.description.clone();
    }
    session
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::Notify;

    use crate::services::{KeyValueStore, MemoryKeyValueStore, SESSION_DRAFT_KEY};

    #[derive(Default)]
    struct RecordingGateway {
        applied: Mutex<Vec<ColorPalette>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl PaletteGateway for RecordingGateway {
        async fn apply_palette(&self, palette: &ColorPalette) -> Result<ColorPalette, String> {
            if self.fail.load(Ordering::SeqCst) {
                return Err("network unreachable".to_string());
            }
            self.applied.lock().unwrap().push(palette.clone());
            Ok(palette.clone())
        }
    }

    #[derive(Default)]
    struct BlockingGateway {
        release: Notify,
    }

    #[async_trait]
    impl PaletteGateway for BlockingGateway {
        async fn apply_palette(&self, palette: &ColorPalette) -> Result<ColorPalette, String> {
            self.release.notified().await;
            Ok(palette.clone())
        }
    }

    /// Counts writes to the session key
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryKeyValueStore,
        session_writes: AtomicUsize,
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<String>, String> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &str) -> Result<(), String> {
            if key == SESSION_DRAFT_KEY {
                self.session_writes.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<(), String> {
            self.inner.remove(key)
        }
    }

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, String> {
            Ok(None)
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), String> {
            Err("quota exceeded".to_string())
        }
        fn remove(&self, _key: &str) -> Result<(), String> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<(String, Value)>>,
    }

    impl CollectingSink {
        fn names(&self) -> Vec<String> {
            self.events.lock().unwrap().iter().map(|(name, _)| name.clone()).collect()
        }
    }

    impl EventSink for CollectingSink {
        fn emit(&self, event: &str, payload: Value) {
            self.events.lock().unwrap().push((event.to_string(), payload));
        }
    }

    struct Harness {
        engine: ThemeEngine,
        gateway: Arc<RecordingGateway>,
        session_kv: Arc<CountingStore>,
        durable_kv: Arc<MemoryKeyValueStore>,
    }

    fn harness() -> Harness {
        let gateway = Arc::new(RecordingGateway::default());
        let session_kv = Arc::new(CountingStore::default());
        let durable_kv = Arc::new(MemoryKeyValueStore::new());
        let engine = ThemeEngine::builder(
            CustomThemeStore::new(durable_kv.clone()),
            SessionDraftStore::new(session_kv.clone()),
            gateway.clone(),
        )
        .build();
        Harness {
            engine,
            gateway,
            session_kv,
            durable_kv,
        }
    }

    fn sunset() -> ColorPalette {
        ThemeCatalog::builtin().find("sunset").unwrap().palette.clone()
    }

    fn ocean() -> ColorPalette {
        ThemeCatalog::builtin().find("ocean").unwrap().palette.clone()
    }

    fn token(value: &str) -> ColorToken {
        ColorToken::parse(value).unwrap()
    }

    #[test]
    fn test_starts_idle_on_initial_palette() {
        let h = harness();
        assert_eq!(h.engine.state(), ThemeState::Idle);
        assert_eq!(h.engine.effective_palette(), default_palette());
        assert!(h.engine.preview_override().is_none());
    }

    #[tokio::test]
    async fn test_scenario_a_apply_preset() {
        let h = harness();
        h.engine.copy_theme("ocean").unwrap();
        h.engine.preview_theme("forest").unwrap();

        h.engine.apply_preset("sunset").await.unwrap();

        assert_eq!(h.engine.saved_palette().primary.base, sunset().primary.base);
        assert_eq!(h.engine.state(), ThemeState::Idle);
        assert!(h.engine.session().is_none());
        assert!(h.engine.preview_override().is_none());
        assert_eq!(h.engine.current_preset().as_deref(), Some("sunset"));
        assert_eq!(h.gateway.applied.lock().unwrap().len(), 1);
        assert!(h.session_kv.get(SESSION_DRAFT_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_preset_failure_leaves_state_untouched() {
        let h = harness();
        h.engine.copy_theme("ocean").unwrap();
        h.gateway.fail.store(true, Ordering::SeqCst);

        let result = h.engine.apply_preset("sunset").await;

        assert!(matches!(result, Err(ThemeError::Persistence(_))));
        assert_eq!(h.engine.saved_palette(), default_palette());
        assert_eq!(h.engine.state(), ThemeState::Customizing);
        assert!(!h.engine.is_saving());
        assert!(h.engine.current_preset().is_none());
    }

    #[tokio::test]
    async fn test_apply_unknown_preset() {
        let h = harness();
        let result = h.engine.apply_preset("neon").await;
        assert_eq!(result, Err(ThemeError::ThemeNotFound("neon".to_string())));
        assert!(!h.engine.is_saving());
    }

    #[test]
    fn test_scenario_b_preview_toggle() {
        let h = harness();
        let p0 = h.engine.effective_palette();

        let previewed = h.engine.preview_theme("sunset").unwrap();
        assert_eq!(previewed, sunset());
        assert_eq!(h.engine.effective_palette(), sunset());
        assert_eq!(h.engine.state(), ThemeState::Previewing);
        assert_eq!(h.engine.saved_palette(), p0);

        let restored = h.engine.preview_theme("sunset").unwrap();
        assert_eq!(restored, p0);
        assert_eq!(h.engine.effective_palette(), p0);
        assert_eq!(h.engine.state(), ThemeState::Idle);
    }

    #[test]
    fn test_preview_swap_keeps_first_snapshot() {
        let h = harness();
        let p0 = h.engine.effective_palette();

        h.engine.preview_theme("sunset").unwrap();
        h.engine.preview_theme("ocean").unwrap();
        assert_eq!(h.engine.effective_palette(), ocean());

        h.engine.preview_theme("ocean").unwrap();
        assert_eq!(h.engine.effective_palette(), p0);
        assert_eq!(h.engine.state(), ThemeState::Idle);
    }

    #[test]
    fn test_preview_unknown_theme_changes_nothing() {
        let h = harness();
        h.engine.preview_theme("sunset").unwrap();
        assert!(matches!(
            h.engine.preview_theme("missing"),
            Err(ThemeError::ThemeNotFound(_))
        ));
        assert_eq!(h.engine.effective_palette(), sunset());
    }

    #[test]
    fn test_preview_layers_over_customization() {
        let h = harness();
        let session = h.engine.copy_theme("ocean").unwrap();

        h.engine.preview_theme("sunset").unwrap();
        assert_eq!(h.engine.state(), ThemeState::Customizing);
        assert_eq!(h.engine.effective_palette(), sunset());
        assert_eq!(h.engine.snapshot().previewing_theme_id.as_deref(), Some("sunset"));

        h.engine.preview_theme("sunset").unwrap();
        assert_eq!(h.engine.effective_palette(), session.draft);
        assert_eq!(h.engine.preview_override(), Some(session.draft));
        assert_eq!(h.engine.state(), ThemeState::Customizing);
    }

    #[test]
    fn test_draft_edit_ends_layered_preview() {
        let h = harness();
        h.engine.copy_theme("ocean").unwrap();
        h.engine.preview_theme("sunset").unwrap();

        let draft = h
            .engine
            .set_draft_color(PaletteSection::Primary, "base", "blue-600")
            .unwrap();

        assert_eq!(h.engine.effective_palette(), draft);
        assert!(h.engine.snapshot().previewing_theme_id.is_none());
    }

    #[test]
    fn test_copy_builtin_creates_new_target() {
        let h = harness();
        h.engine.preview_theme("forest").unwrap();

        let session = h.engine.copy_theme("sunset").unwrap();

        assert_eq!(h.engine.state(), ThemeState::Customizing);
        assert_eq!(session.target_theme_id, None);
        assert_eq!(session.base_theme_id.as_deref(), Some("sunset"));
        assert_eq!(session.name, "Sunset (Custom)");
        assert_eq!(session.draft, sunset());
        assert_eq!(session.original, sunset());
        assert!(h.engine.snapshot().previewing_theme_id.is_none());
        assert_eq!(h.engine.effective_palette(), sunset());
        assert_eq!(h.session_kv.session_writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_copy_custom_edits_in_place() {
        let h = harness();
        h.engine.copy_theme("ocean").unwrap();
        let saved = h
            .engine
            .save_custom_theme("Harbor", "Blue shop", SaveMode::Exit)
            .await
            .unwrap();

        let session = h.engine.copy_theme(&saved.id).unwrap();
        assert_eq!(session.target_theme_id.as_deref(), Some(saved.id.as_str()));
        assert_eq!(session.base_theme_id.as_deref(), Some("ocean"));
        assert_eq!(session.name, "Harbor");
        assert_eq!(session.description, "Blue shop");
    }

    #[test]
    fn test_start_blank_uses_effective_palette() {
        let h = harness();
        h.engine.preview_theme("sunset").unwrap();

        let session = h.engine.start_blank_customization().unwrap();

        assert_eq!(session.draft, sunset());
        assert_eq!(session.original, sunset());
        assert_eq!(session.target_theme_id, None);
        assert!(session.name.is_empty());
        assert!(session.description.is_empty());
        assert!(h.engine.snapshot().previewing_theme_id.is_none());
    }

    #[tokio::test]
    async fn test_scenario_c_copy_edit_save() {
        let h = harness();
        let session = h.engine.copy_theme("sunset").unwrap();
        assert_eq!(session.target_theme_id, None);
        assert_eq!(session.draft, sunset());

        h.engine
            .set_draft_color(PaletteSection::Primary, "base", "blue-600")
            .unwrap();
        let theme = h
            .engine
            .save_custom_theme("My Theme", "", SaveMode::Exit)
            .await
            .unwrap();

        let stored = h.engine.custom_themes();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, theme.id);
        assert_eq!(stored[0].palette.primary.base, token("blue-600"));
        assert_eq!(stored[0].base_theme_id.as_deref(), Some("sunset"));
        assert_eq!(h.engine.saved_palette().primary.base, token("blue-600"));
        assert_eq!(h.engine.state(), ThemeState::Idle);
        assert_eq!(h.engine.current_preset(), Some(theme.id));
        assert!(h.session_kv.get(SESSION_DRAFT_KEY).unwrap().is_none());
        assert!(h.durable_kv.get(crate::services::CUSTOM_THEMES_KEY).unwrap().is_some());
    }

    #[test]
    fn test_scenario_d_invalid_token_keeps_draft() {
        let h = harness();
        assert!(matches!(
            ColorToken::validate("neon", "42"),
            Err(ThemeError::InvalidToken { .. })
        ));

        let session = h.engine.copy_theme("sunset").unwrap();
        let result = h.engine.set_draft_color(PaletteSection::Primary, "base", "neon-42");

        assert!(matches!(result, Err(ThemeError::InvalidToken { .. })));
        assert_eq!(h.engine.session().unwrap().draft, session.draft);
    }

    #[tokio::test]
    async fn test_scenario_e_blank_name_rejected() {
        let h = harness();
        h.engine.copy_theme("sunset").unwrap();
        h.engine
            .set_draft_color(PaletteSection::Ui, "border", "rose-300")
            .unwrap();
        let before = h.engine.session().unwrap();

        for name in ["", "   "] {
            let result = h.engine.save_custom_theme(name, "", SaveMode::Exit).await;
            assert_eq!(result, Err(ThemeError::NameRequired));
        }

        assert_eq!(h.engine.session().unwrap(), before);
        assert!(h.engine.custom_themes().is_empty());
        assert!(!h.engine.is_saving());
        assert!(h.gateway.applied.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_continue_then_update() {
        let h = harness();
        h.engine.copy_theme("sunset").unwrap();

        let first = h
            .engine
            .save_custom_theme("Draft One", "", SaveMode::Continue)
            .await
            .unwrap();
        let session = h.engine.session().unwrap();
        assert_eq!(h.engine.state(), ThemeState::Customizing);
        assert_eq!(session.target_theme_id.as_deref(), Some(first.id.as_str()));
        assert_eq!(session.original, sunset());

        h.engine
            .set_draft_color(PaletteSection::Secondary, "base", "teal-500")
            .unwrap();
        let second = h
            .engine
            .save_custom_theme("Draft Two", "again", SaveMode::Exit)
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        let stored = h.engine.custom_themes();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "Draft Two");
        assert_eq!(stored[0].palette.secondary.base, token("teal-500"));
    }

    #[tokio::test]
    async fn test_save_outside_customization() {
        let h = harness();
        let result = h.engine.save_custom_theme("Name", "", SaveMode::Exit).await;
        assert_eq!(result, Err(ThemeError::NotCustomizing));
    }

    #[tokio::test]
    async fn test_gateway_failure_keeps_saved_palette_and_target() {
        let h = harness();
        h.engine.copy_theme("sunset").unwrap();
        h.gateway.fail.store(true, Ordering::SeqCst);

        let result = h.engine.save_custom_theme("Mine", "", SaveMode::Exit).await;

        assert!(matches!(result, Err(ThemeError::Persistence(_))));
        assert_eq!(h.engine.saved_palette(), default_palette());
        assert_eq!(h.engine.state(), ThemeState::Customizing);
        assert!(!h.engine.is_saving());

        // Retrying updates the theme created by the failed attempt
        h.gateway.fail.store(false, Ordering::SeqCst);
        h.engine.save_custom_theme("Mine", "", SaveMode::Exit).await.unwrap();
        assert_eq!(h.engine.custom_themes().len(), 1);
        assert_eq!(h.engine.saved_palette(), sunset());
    }

    #[tokio::test]
    async fn test_durable_write_failure_is_reported() {
        let gateway = Arc::new(RecordingGateway::default());
        let engine = ThemeEngine::builder(
            CustomThemeStore::new(Arc::new(FailingStore)),
            SessionDraftStore::new(Arc::new(MemoryKeyValueStore::new())),
            gateway.clone(),
        )
        .build();
        engine.copy_theme("sunset").unwrap();

        let result = engine.save_custom_theme("Mine", "", SaveMode::Exit).await;

        assert!(matches!(result, Err(ThemeError::Persistence(_))));
        assert_eq!(engine.custom_themes().len(), 1);
        assert!(engine.session().unwrap().target_theme_id.is_some());
        assert!(gateway.applied.lock().unwrap().is_empty());
        assert!(!engine.is_saving());
    }

    #[tokio::test]
    async fn test_concurrent_save_is_rejected() {
        let gateway = Arc::new(BlockingGateway::default());
        let engine = ThemeEngine::builder(
            CustomThemeStore::new(Arc::new(MemoryKeyValueStore::new())),
            SessionDraftStore::new(Arc::new(MemoryKeyValueStore::new())),
            gateway.clone(),
        )
        .build();

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.apply_preset("sunset").await })
        };
        while !engine.is_saving() {
            tokio::task::yield_now().await;
        }

        assert_eq!(engine.apply_preset("ocean").await, Err(ThemeError::SaveInProgress));
        engine.copy_theme("forest").unwrap();
        assert_eq!(
            engine.save_custom_theme("Mine", "", SaveMode::Exit).await,
            Err(ThemeError::SaveInProgress)
        );

        gateway.release.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), sunset());
        assert!(!engine.is_saving());
        assert_eq!(engine.saved_palette(), sunset());
    }

    fn blocking_engine() -> (ThemeEngine, Arc<BlockingGateway>) {
        let gateway = Arc::new(BlockingGateway::default());
        let engine = ThemeEngine::builder(
            CustomThemeStore::new(Arc::new(MemoryKeyValueStore::new())),
            SessionDraftStore::new(Arc::new(MemoryKeyValueStore::new())),
            gateway.clone(),
        )
        .build();
        (engine, gateway)
    }

    #[tokio::test]
    async fn test_edit_during_save_is_kept() {
        let (engine, gateway) = blocking_engine();
        engine.copy_theme("sunset").unwrap();

        let save = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.save_custom_theme("Dusk", "", SaveMode::Exit).await })
        };
        while !engine.is_saving() {
            tokio::task::yield_now().await;
        }

        engine
            .set_draft_color(PaletteSection::Primary, "base", "blue-600")
            .unwrap();
        gateway.release.notify_one();
        let theme = save.await.unwrap().unwrap();

        // The saved theme holds the palette captured at save time
        assert_eq!(theme.palette, sunset());
        assert_eq!(engine.saved_palette(), sunset());

        // The later edit is still the live draft
        let session = engine.session().unwrap();
        assert_eq!(engine.state(), ThemeState::Customizing);
        assert_eq!(session.draft.primary.base, token("blue-600"));
        assert_eq!(session.target_theme_id.as_deref(), Some(theme.id.as_str()));
        assert_eq!(engine.effective_palette().primary.base, token("blue-600"));
        assert!(!engine.is_saving());
    }

    #[tokio::test]
    async fn test_session_opened_during_save_survives() {
        let (engine, gateway) = blocking_engine();
        engine.copy_theme("sunset").unwrap();

        let save = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.save_custom_theme("Dusk", "", SaveMode::Exit).await })
        };
        while !engine.is_saving() {
            tokio::task::yield_now().await;
        }

        engine.cancel_customization().unwrap();
        engine.copy_theme("ocean").unwrap();
        gateway.release.notify_one();
        save.await.unwrap().unwrap();

        let session = engine.session().unwrap();
        assert_eq!(engine.state(), ThemeState::Customizing);
        assert_eq!(session.draft, ocean());
        assert_eq!(session.base_theme_id.as_deref(), Some("ocean"));
        assert!(session.target_theme_id.is_none());
        assert_eq!(engine.saved_palette(), sunset());
    }

    #[tokio::test]
    async fn test_session_opened_during_apply_survives() {
        let (engine, gateway) = blocking_engine();

        let apply = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.apply_preset("sunset").await })
        };
        while !engine.is_saving() {
            tokio::task::yield_now().await;
        }

        engine.copy_theme("ocean").unwrap();
        gateway.release.notify_one();
        apply.await.unwrap().unwrap();

        assert_eq!(engine.saved_palette(), sunset());
        assert_eq!(engine.state(), ThemeState::Customizing);
        assert_eq!(engine.session().unwrap().draft, ocean());
    }

    #[test]
    fn test_reset_color_restores_original() {
        let h = harness();
        let session = h.engine.copy_theme("sunset").unwrap();

        for t1 in ["blue-600", "lime-200", "orange-500"] {
            h.engine
                .set_draft_color(PaletteSection::Primary, "base", t1)
                .unwrap();
            h.engine.reset_color(PaletteSection::Primary, "base").unwrap();
            let draft = h.engine.session().unwrap().draft;
            assert_eq!(draft.primary.base, session.original.primary.base);
        }
    }

    #[tokio::test]
    async fn test_reset_targets_session_start_not_saved_palette() {
        let h = harness();
        h.engine.apply_preset("ocean").await.unwrap();
        h.engine.copy_theme("sunset").unwrap();
        h.engine
            .set_draft_color(PaletteSection::Text, "base", "blue-600")
            .unwrap();
        h.engine
            .set_draft_color(PaletteSection::Text, "light", "blue-300")
            .unwrap();

        let draft = h.engine.reset_section(PaletteSection::Text).unwrap();
        assert_eq!(draft.text, sunset().text);
        assert_ne!(draft.text, ocean().text);
    }

    #[test]
    fn test_reset_all_writes_session_once() {
        let h = harness();
        h.engine.copy_theme("sunset").unwrap();
        h.engine
            .set_draft_color(PaletteSection::Primary, "base", "blue-600")
            .unwrap();
        h.engine
            .set_draft_color(PaletteSection::Ui, "border", "blue-200")
            .unwrap();
        let writes_before = h.session_kv.session_writes.load(Ordering::SeqCst);

        let draft = h.engine.reset_all().unwrap();

        assert_eq!(draft, sunset());
        assert_eq!(h.session_kv.session_writes.load(Ordering::SeqCst), writes_before + 1);

        // Nothing to reset: no write at all
        h.engine.reset_all().unwrap();
        assert_eq!(h.session_kv.session_writes.load(Ordering::SeqCst), writes_before + 1);
    }

    #[test]
    fn test_draft_operations_require_customizing() {
        let h = harness();
        assert_eq!(
            h.engine.set_draft_color(PaletteSection::Primary, "base", "blue-600"),
            Err(ThemeError::NotCustomizing)
        );
        assert_eq!(
            h.engine.reset_color(PaletteSection::Primary, "base"),
            Err(ThemeError::NotCustomizing)
        );
        assert_eq!(h.engine.reset_section(PaletteSection::Ui), Err(ThemeError::NotCustomizing));
        assert_eq!(h.engine.reset_all(), Err(ThemeError::NotCustomizing));
    }

    #[test]
    fn test_unknown_property_keeps_draft() {
        let h = harness();
        let session = h.engine.copy_theme("sunset").unwrap();
        let result = h.engine.set_draft_color(PaletteSection::Ui, "lightest", "blue-600");
        assert!(matches!(result, Err(ThemeError::UnknownProperty { .. })));
        assert_eq!(h.engine.session().unwrap(), session);
    }

    #[test]
    fn test_cancel_customization_returns_to_saved() {
        let h = harness();
        h.engine.copy_theme("sunset").unwrap();
        h.engine.preview_theme("ocean").unwrap();

        let palette = h.engine.cancel_customization().unwrap();

        assert_eq!(palette, default_palette());
        assert_eq!(h.engine.state(), ThemeState::Idle);
        assert!(h.engine.preview_override().is_none());
        assert!(h.session_kv.get(SESSION_DRAFT_KEY).unwrap().is_none());
    }

    #[test]
    fn test_resume_restores_session_verbatim() {
        let session_kv = Arc::new(MemoryKeyValueStore::new());
        let durable_kv = Arc::new(MemoryKeyValueStore::new());
        let build = || {
            ThemeEngine::builder(
                CustomThemeStore::new(durable_kv.clone()),
                SessionDraftStore::new(session_kv.clone()),
                Arc::new(RecordingGateway::default()),
            )
            .build()
        };

        let first = build();
        first.copy_theme("sunset").unwrap();
        first
            .set_draft_color(PaletteSection::Secondary, "hover", "violet-400")
            .unwrap();
        first.set_active_tab(EditorTab::Holiday).unwrap();
        let expected = first.session().unwrap();

        // Editor remounted against a fresh engine in the same browsing session
        let second = build();
        assert_eq!(second.state(), ThemeState::Idle);
        let resumed = second.resume_session().unwrap().unwrap();

        assert_eq!(resumed, expected);
        assert_eq!(resumed.original, sunset());
        assert_eq!(second.state(), ThemeState::Customizing);
        assert_eq!(second.effective_palette(), expected.draft);
        assert_eq!(second.snapshot().active_tab, EditorTab::Holiday);
    }

    #[test]
    fn test_resume_keeps_in_memory_original() {
        let h = harness();
        h.engine.copy_theme("sunset").unwrap();
        h.engine
            .set_draft_color(PaletteSection::Primary, "base", "blue-600")
            .unwrap();

        let resumed = h.engine.resume_session().unwrap().unwrap();
        assert_eq!(resumed.original, sunset());
        assert_eq!(resumed.draft.primary.base, token("blue-600"));
    }

    #[test]
    fn test_resume_without_session() {
        let h = harness();
        h.session_kv.set(SESSION_DRAFT_KEY, "garbage").unwrap();
        assert_eq!(h.engine.resume_session().unwrap(), None);
        assert_eq!(h.engine.state(), ThemeState::Idle);
    }

    #[test]
    fn test_effective_palette_has_single_source() {
        let h = harness();
        assert_eq!(h.engine.effective_palette(), h.engine.saved_palette());

        h.engine.preview_theme("ocean").unwrap();
        assert_eq!(h.engine.effective_palette(), h.engine.preview_override().unwrap());

        let session = h.engine.copy_theme("sunset").unwrap();
        assert_eq!(h.engine.effective_palette(), session.draft);
        assert_ne!(h.engine.effective_palette(), h.engine.saved_palette());
    }

    #[tokio::test]
    async fn test_delete_custom_theme_detaches_session() {
        let h = harness();
        h.engine.copy_theme("sunset").unwrap();
        let theme = h
            .engine
            .save_custom_theme("Temp", "", SaveMode::Continue)
            .await
            .unwrap();

        assert!(h.engine.delete_custom_theme(&theme.id).unwrap());
        assert!(h.engine.session().unwrap().target_theme_id.is_none());
        assert!(h.engine.current_preset().is_none());
        assert!(!h.engine.delete_custom_theme(&theme.id).unwrap());

        let recreated = h
            .engine
            .save_custom_theme("Temp", "", SaveMode::Exit)
            .await
            .unwrap();
        let stored = h.engine.custom_themes();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, recreated.id);
        assert_eq!(stored[0].base_theme_id.as_deref(), Some("sunset"));
    }

    #[test]
    fn test_list_themes_groups_by_category() {
        let h = harness();
        let listing = h.engine.list_themes();
        assert_eq!(listing.standard.len(), 6);
        assert_eq!(listing.holiday.len(), 4);
        assert!(listing.custom.is_empty());
    }

    #[test]
    fn test_events_follow_transitions() {
        let sink = Arc::new(CollectingSink::default());
        let engine = ThemeEngine::builder(
            CustomThemeStore::new(Arc::new(MemoryKeyValueStore::new())),
            SessionDraftStore::new(Arc::new(MemoryKeyValueStore::new())),
            Arc::new(RecordingGateway::default()),
        )
        .events(sink.clone())
        .build();

        engine.preview_theme("sunset").unwrap();
        assert_eq!(sink.names(), vec![PALETTE_CHANGED_EVENT, THEME_STATE_CHANGED_EVENT]);

        let _ = engine.reset_all();
        assert_eq!(sink.names().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_are_debounced() {
        let h = harness();
        let session = h.engine.copy_theme("sunset").unwrap();
        let writes_after_copy = h.session_kv.session_writes.load(Ordering::SeqCst);

        for shade in ["100", "200", "300", "400", "500"] {
            h.engine
                .set_draft_color(PaletteSection::Primary, "base", &format!("blue-{shade}"))
                .unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // Draft is live immediately; the mirror and session store lag behind
        assert_eq!(h.engine.effective_palette().primary.base, token("blue-500"));
        assert_eq!(h.engine.preview_override(), Some(session.draft));
        assert_eq!(h.session_kv.session_writes.load(Ordering::SeqCst), writes_after_copy);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(h.session_kv.session_writes.load(Ordering::SeqCst), writes_after_copy + 1);
        let mirror = h.engine.preview_override().unwrap();
        assert_eq!(mirror.primary.base, token("blue-500"));
        let stored = SessionDraftStore::new(h.session_kv.clone()).load().unwrap();
        assert_eq!(stored.session.draft.primary.base, token("blue-500"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_event_waits_for_last_edit() {
        let sink = Arc::new(CollectingSink::default());
        let engine = ThemeEngine::builder(
            CustomThemeStore::new(Arc::new(MemoryKeyValueStore::new())),
            SessionDraftStore::new(Arc::new(MemoryKeyValueStore::new())),
            Arc::new(RecordingGateway::default()),
        )
        .events(sink.clone())
        .build();
        engine.copy_theme("sunset").unwrap();
        sink.events.lock().unwrap().clear();

        for shade in ["100", "200", "300", "400", "500"] {
            engine
                .set_draft_color(PaletteSection::Primary, "base", &format!("blue-{shade}"))
                .unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(sink.names(), vec![PALETTE_CHANGED_EVENT; 5]);

        tokio::time::sleep(Duration::from_millis(150)).await;

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 6);
        let (name, payload) = &events[5];
        assert_eq!(name, THEME_STATE_CHANGED_EVENT);
        assert_eq!(payload["session"]["draft"]["primary"]["base"], "blue-500");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_propagation_cancelled_on_exit() {
        let h = harness();
        h.engine.copy_theme("sunset").unwrap();
        h.engine
            .set_draft_color(PaletteSection::Primary, "base", "blue-600")
            .unwrap();

        h.engine.cancel_customization().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(h.session_kv.get(SESSION_DRAFT_KEY).unwrap().is_none());
        assert!(h.engine.preview_override().is_none());
        assert_eq!(h.engine.state(), ThemeState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_pending_writes_now() {
        let h = harness();
        h.engine.copy_theme("sunset").unwrap();
        h.engine
            .set_draft_color(PaletteSection::Primary, "base", "blue-600")
            .unwrap();

        h.engine.flush_pending();

        let stored = SessionDraftStore::new(h.session_kv.clone()).load().unwrap();
        assert_eq!(stored.session.draft.primary.base, token("blue-600"));
        let writes = h.session_kv.session_writes.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.session_kv.session_writes.load(Ordering::SeqCst), writes);
    }
}
