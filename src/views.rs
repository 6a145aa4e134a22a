use crate::errors::{AppError, AppResult};
use crate::filter::FilterCriteria;
use crate::models::{Project, ProjectType};
use crate::sync::Collections;
use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredViews {
    pub active: Vec<Project>,
    pub completed: Vec<Project>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewCounts {
    pub active_total: usize,
    pub active_visible: usize,
    pub completed_total: usize,
    pub completed_visible: usize,
}

/// Filtered projections of the canonical collections. Holds no project state
/// of its own beyond the last derivation, which is rebuilt whenever the
/// collections or the predicates change.
#[derive(Debug)]
pub struct ViewModel {
    source: watch::Receiver<Collections>,
    criteria: FilterCriteria,
    show_completed: bool,
    views: FilteredViews,
    counts: ViewCounts,
}

impl ViewModel {
    pub fn new(source: watch::Receiver<Collections>, show_completed: bool) -> Self {
        let mut model = Self {
            source,
            criteria: FilterCriteria::default(),
            show_completed,
            views: FilteredViews::default(),
            counts: ViewCounts::default(),
        };
        model.recompute();
        model
    }

    /// Re-derives the views when the collections changed since the last look.
    pub fn refresh(&mut self) -> bool {
        match self.source.has_changed() {
            Ok(true) => {
                self.recompute();
                true
            }
            Ok(false) | Err(_) => false,
        }
    }

    /// Waits for the next published change and re-derives.
    pub async fn changed(&mut self) -> AppResult<()> {
        self.source
            .changed()
            .await
            .map_err(|_| AppError::Internal("project state publisher dropped".to_string()))?;
        self.recompute();
        Ok(())
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn views(&self) -> &FilteredViews {
        &self.views
    }

    pub fn counts(&self) -> ViewCounts {
        self.counts
    }

    pub fn show_completed(&self) -> bool {
        self.show_completed
    }

    /// The list behind the currently selected tab.
    pub fn visible(&self) -> &[Project] {
        if self.show_completed {
            &self.views.completed
        } else {
            &self.views.active
        }
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.criteria.set_search_term(term);
        self.recompute();
    }

    pub fn toggle_type(&mut self, kind: ProjectType) {
        self.criteria.toggle_type(kind);
        self.recompute();
    }

    pub fn clear_filters(&mut self) {
        self.criteria.clear();
        self.recompute();
    }

    pub fn set_show_completed(&mut self, show_completed: bool) {
        self.show_completed = show_completed;
    }

    fn recompute(&mut self) {
        let source = self.source.borrow_and_update();
        let views = FilteredViews {
            active: self.criteria.apply(&source.active),
            completed: self.criteria.apply(&source.completed),
        };
        self.counts = ViewCounts {
            active_total: source.active.len(),
            active_visible: views.active.len(),
            completed_total: source.completed.len(),
            completed_visible: views.completed.len(),
        };
        drop(source);
        self.views = views;
    }
}
