pub mod db;
pub mod errors;
pub mod filter;
pub mod ids;
pub mod menus;
pub mod models;
pub mod store;
pub mod sync;
pub mod views;

use crate::db::Database;
use crate::menus::{MenuKind, MenuState};
use crate::models::{Project, ProjectDraft, ProjectId, ProjectPatch, ProjectType, ResetReport, TrackerSettings};
use crate::sync::SyncEngine;
use crate::views::{FilteredViews, ViewCounts, ViewModel};
use anyhow::Context;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Handles the view layer calls into: one method per engine operation and
/// per filter/menu setter. Errors cross this boundary as display strings.
pub struct TrackerApp {
    db: Arc<Database>,
    engine: SyncEngine,
    view: Mutex<ViewModel>,
    menus: Mutex<MenuState>,
}

impl TrackerApp {
    pub async fn open(data_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data dir {}", data_dir.display()))?;
        let db = Arc::new(
            Database::new(&data_dir.join("tracker.sqlite")).context("opening project database")?,
        );
        let settings = db.get_settings().context("loading tracker settings")?;

        let engine = SyncEngine::new(db.clone());
        if let Err(error) = engine.refetch().await {
            tracing::warn!(error = %error, "initial project fetch failed; starting empty");
        }
        let view = ViewModel::new(engine.subscribe(), settings.show_completed);

        Ok(Self {
            db,
            engine,
            view: Mutex::new(view),
            menus: Mutex::new(MenuState::default()),
        })
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn projects_view(&self) -> Result<FilteredViews, String> {
        let mut view = self.view()?;
        view.refresh();
        Ok(view.views().clone())
    }

    pub fn projects_counts(&self) -> Result<ViewCounts, String> {
        let mut view = self.view()?;
        view.refresh();
        Ok(view.counts())
    }

    pub fn projects_visible(&self) -> Result<Vec<Project>, String> {
        let mut view = self.view()?;
        view.refresh();
        Ok(view.visible().to_vec())
    }

    pub async fn projects_refetch(&self) -> Result<(), String> {
        self.engine.refetch().await.map_err(to_client_error)
    }

    pub fn project_draft_new(&self) -> Result<ProjectDraft, String> {
        let settings = self.db.get_settings().map_err(to_client_error)?;
        Ok(ProjectDraft::default().with_types(settings.default_types))
    }

    pub async fn project_create(&self, draft: ProjectDraft) -> Result<ProjectId, String> {
        self.engine.create(draft).await.map_err(to_client_error)
    }

    pub async fn project_toggle_completion(&self, project_id: ProjectId) -> Result<(), String> {
        self.engine
            .toggle_completion(project_id)
            .await
            .map_err(to_client_error)
    }

    pub async fn project_complete(&self, project_id: ProjectId) -> Result<(), String> {
        self.engine
            .move_to_completed(project_id)
            .await
            .map_err(to_client_error)
    }

    pub async fn project_reopen(&self, project_id: ProjectId) -> Result<(), String> {
        self.engine
            .move_to_active(project_id)
            .await
            .map_err(to_client_error)
    }

    pub async fn project_update(&self, project_id: ProjectId, patch: ProjectPatch) -> Result<(), String> {
        self.engine
            .update(project_id, patch)
            .await
            .map_err(to_client_error)
    }

    pub async fn project_delete(&self, project_id: ProjectId) -> Result<(), String> {
        self.menus()?.forget(project_id);
        self.engine.delete(project_id).await.map_err(to_client_error)
    }

    pub async fn projects_reset_completions(&self) -> Result<ResetReport, String> {
        self.engine
            .reset_all_completions()
            .await
            .map_err(to_client_error)
    }

    pub fn project_notes(&self, project_id: ProjectId) -> Option<String> {
        self.engine
            .find(project_id)
            .and_then(|project| project.notes)
    }

    pub fn search_set(&self, term: String) -> Result<ViewCounts, String> {
        let mut view = self.view()?;
        view.set_search_term(term);
        Ok(view.counts())
    }

    pub fn filter_type_toggle(&self, kind: ProjectType) -> Result<ViewCounts, String> {
        let mut view = self.view()?;
        view.toggle_type(kind);
        Ok(view.counts())
    }

    pub fn filters_clear(&self) -> Result<ViewCounts, String> {
        let mut view = self.view()?;
        view.clear_filters();
        Ok(view.counts())
    }

    /// Switches between the active and completed tabs and remembers the choice.
    pub fn tab_set(&self, show_completed: bool) -> Result<(), String> {
        self.view()?.set_show_completed(show_completed);
        self.db
            .update_settings(serde_json::json!({ "showCompleted": show_completed }))
            .map(|_| ())
            .map_err(to_client_error)
    }

    pub fn menu_toggle(&self, kind: MenuKind, project_id: ProjectId) -> Result<MenuState, String> {
        let mut menus = self.menus()?;
        menus.toggle(kind, project_id);
        Ok(*menus)
    }

    pub fn menu_close(&self) -> Result<MenuState, String> {
        let mut menus = self.menus()?;
        menus.close();
        Ok(*menus)
    }

    pub fn settings_get(&self) -> Result<TrackerSettings, String> {
        self.db.get_settings().map_err(to_client_error)
    }

    pub fn settings_update(&self, update: serde_json::Value) -> Result<TrackerSettings, String> {
        self.db.update_settings(update).map_err(to_client_error)
    }

    fn view(&self) -> Result<MutexGuard<'_, ViewModel>, String> {
        self.view
            .lock()
            .map_err(|_| "view state mutex poisoned".to_string())
    }

    fn menus(&self) -> Result<MutexGuard<'_, MenuState>, String> {
        self.menus
            .lock()
            .map_err(|_| "menu state mutex poisoned".to_string())
    }
}

/// JSON logs to a daily-rolling file under `<data_dir>/logs`; `RUST_LOG`
/// overrides the default `info` filter.
pub fn init_tracing(data_dir: &Path) -> Result<(), String> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "tracker.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}

fn to_client_error(error: impl std::fmt::Display) -> String {
    error.to_string()
}
