//! Optimistic mirror of the record store.
//!
//! Every mutation runs in two phases: the new local state is computed and
//! published immediately, then the store is called. Whenever the store call
//! fails, and after every operation that changes collection membership, the
//! mirror is rebuilt wholesale from `RecordStore::list_records`. There is no
//! field-level merge and no partial unwind.

use crate::errors::{AppError, AppResult};
use crate::ids::IdGenerator;
use crate::models::{Project, ProjectDraft, ProjectId, ProjectPatch, ResetOutcome, ResetReport};
use crate::store::RecordStore;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;

/// The two canonical collections. Newest entries sit at the front.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collections {
    pub active: Vec<Project>,
    pub completed: Vec<Project>,
}

impl Collections {
    pub fn partition(records: Vec<Project>) -> Self {
        let (completed, active): (Vec<Project>, Vec<Project>) =
            records.into_iter().partition(|project| project.completed);
        Self { active, completed }
    }

    pub fn find(&self, id: ProjectId) -> Option<&Project> {
        self.active
            .iter()
            .chain(self.completed.iter())
            .find(|project| project.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.completed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.active.len() + self.completed.len()
    }

    /// No id appears twice across both collections.
    pub fn is_disjoint(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.len());
        self.active
            .iter()
            .chain(self.completed.iter())
            .all(|project| seen.insert(project.id))
    }

    /// Membership agrees with each record's `completed` flag.
    pub fn is_partitioned(&self) -> bool {
        self.is_disjoint()
            && self.active.iter().all(|project| !project.completed)
            && self.completed.iter().all(|project| project.completed)
    }

    fn remove(&mut self, id: ProjectId) -> Option<Project> {
        if let Some(index) = self.active.iter().position(|project| project.id == id) {
            return Some(self.active.remove(index));
        }
        let index = self.completed.iter().position(|project| project.id == id)?;
        Some(self.completed.remove(index))
    }

    fn find_mut(&mut self, id: ProjectId) -> Option<&mut Project> {
        self.active
            .iter_mut()
            .chain(self.completed.iter_mut())
            .find(|project| project.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconcile {
    Always,
    OnFailure,
}

#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn RecordStore>,
    state: Arc<watch::Sender<Collections>>,
    ids: Arc<IdGenerator>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        let (state, _) = watch::channel(Collections::default());
        Self {
            store,
            state: Arc::new(state),
            ids: Arc::new(IdGenerator::new()),
        }
    }

    pub fn snapshot(&self) -> Collections {
        self.state.borrow().clone()
    }

    /// Receivers observe every published local state, optimistic or refetched.
    pub fn subscribe(&self) -> watch::Receiver<Collections> {
        self.state.subscribe()
    }

    pub fn find(&self, id: ProjectId) -> Option<Project> {
        self.state.borrow().find(id).cloned()
    }

    pub async fn refetch(&self) -> AppResult<()> {
        let records = self.store.list_records().await.map_err(|error| {
            tracing::error!(error = %error, "failed to fetch projects");
            error
        })?;

        if let Some(max) = records.iter().map(|project| project.id).max() {
            self.ids.observe(max);
        }

        let next = Collections::partition(records);
        tracing::debug!(
            active = next.active.len(),
            completed = next.completed.len(),
            "replaced local projects from store"
        );
        self.state.send_replace(next);
        Ok(())
    }

    pub async fn create(&self, draft: ProjectDraft) -> AppResult<ProjectId> {
        draft.validate()?;
        let project = Project::from_draft(self.ids.next(), draft, Utc::now());
        let id = project.id;

        self.state.send_modify(|state| state.active.insert(0, project.clone()));
        tracing::info!(project_id = %id, "project added");

        let remote = self.store.create_record(&project).await;
        self.settle("create", id, remote, Reconcile::Always).await
    }

    /// Flips `completed` on an active project without moving it.
    pub async fn toggle_completion(&self, id: ProjectId) -> AppResult<()> {
        let updated = self.apply(|state| {
            let project = state.active.iter_mut().find(|project| project.id == id)?;
            project.completed = !project.completed;
            Some(project.clone())
        });
        let updated = updated.ok_or_else(|| not_found_locally(id))?;
        tracing::info!(project_id = %id, completed = updated.completed, "project completion toggled");

        let remote = self.store.update_record(id, &updated).await;
        self.settle("toggle_completion", id, remote, Reconcile::OnFailure)
            .await
    }

    pub async fn move_to_completed(&self, id: ProjectId) -> AppResult<()> {
        let now = Utc::now();
        let moved = self.apply(|state| {
            let index = state.active.iter().position(|project| project.id == id)?;
            let project = state.active.remove(index).marked_completed(now);
            state.completed.insert(0, project.clone());
            Some(project)
        });
        let moved = moved.ok_or_else(|| not_found_locally(id))?;
        tracing::info!(project_id = %id, "project moved to completed");

        let remote = self.store.update_record(id, &moved).await;
        self.settle("move_to_completed", id, remote, Reconcile::Always)
            .await
    }

    pub async fn move_to_active(&self, id: ProjectId) -> AppResult<()> {
        let moved = self.apply(|state| {
            let index = state.completed.iter().position(|project| project.id == id)?;
            let project = state.completed.remove(index).marked_active();
            state.active.insert(0, project.clone());
            Some(project)
        });
        let moved = moved.ok_or_else(|| not_found_locally(id))?;
        tracing::info!(project_id = %id, "project moved to active");

        let remote = self.store.update_record(id, &moved).await;
        self.settle("move_to_active", id, remote, Reconcile::Always)
            .await
    }

    pub async fn update(&self, id: ProjectId, patch: ProjectPatch) -> AppResult<()> {
        patch.validate()?;
        let updated = self.apply(|state| {
            let project = state.find_mut(id)?;
            *project = project.apply_patch(patch);
            Some(project.clone())
        });
        let updated = updated.ok_or_else(|| not_found_locally(id))?;
        tracing::info!(project_id = %id, "project updated");

        let remote = self.store.update_record(id, &updated).await;
        self.settle("update", id, remote, Reconcile::Always).await
    }

    /// Removes the project locally when present; the store is asked to delete
    /// it either way.
    pub async fn delete(&self, id: ProjectId) -> AppResult<()> {
        match self.apply(|state| state.remove(id)) {
            Some(_) => tracing::info!(project_id = %id, "project deleted"),
            None => tracing::debug!(project_id = %id, "delete requested for project missing locally"),
        }

        let remote = self.store.delete_record(id).await;
        self.settle("delete", id, remote, Reconcile::Always).await
    }

    /// Marks every project active again, pushes one update per project
    /// concurrently, waits for all of them and refetches. Individual failures
    /// are reported, not retried.
    pub async fn reset_all_completions(&self) -> AppResult<ResetReport> {
        let reset = self.apply(|state| {
            if state.is_empty() {
                return None;
            }
            let active = std::mem::take(&mut state.active);
            let completed = std::mem::take(&mut state.completed);
            state.active = active
                .into_iter()
                .chain(completed)
                .map(|project| project.marked_active())
                .collect();
            Some(state.active.clone())
        });
        let Some(reset) = reset else {
            tracing::debug!("no projects to reset");
            return Ok(ResetReport::default());
        };
        tracing::info!(count = reset.len(), "resetting all project completions");

        let pending = reset
            .into_iter()
            .map(|project| {
                let store = self.store.clone();
                let id = project.id;
                let handle = tokio::spawn(async move { store.update_record(id, &project).await });
                (id, handle)
            })
            .collect::<Vec<_>>();

        let mut outcomes = Vec::with_capacity(pending.len());
        for (id, handle) in pending {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => Err(AppError::from(join_error)),
            };
            let error = result.err().map(|error| {
                tracing::warn!(project_id = %id, error = %error, "completion reset failed");
                error.to_string()
            });
            outcomes.push(ResetOutcome { id, error });
        }

        if let Err(error) = self.refetch().await {
            tracing::warn!(error = %error, "refetch after completion reset failed");
        }
        Ok(ResetReport { outcomes })
    }

    fn apply<R>(&self, change: impl FnOnce(&mut Collections) -> Option<R>) -> Option<R> {
        let mut output = None;
        self.state.send_if_modified(|state| {
            output = change(state);
            output.is_some()
        });
        output
    }

    async fn settle<T>(
        &self,
        operation: &'static str,
        id: ProjectId,
        remote: AppResult<T>,
        reconcile: Reconcile,
    ) -> AppResult<T> {
        match remote {
            Ok(value) => {
                if reconcile == Reconcile::Always {
                    if let Err(refetch_error) = self.refetch().await {
                        tracing::warn!(
                            operation,
                            project_id = %id,
                            error = %refetch_error,
                            "change stored but refetch failed; keeping local state"
                        );
                    }
                }
                Ok(value)
            }
            Err(error) => {
                tracing::warn!(
                    operation,
                    project_id = %id,
                    error = %error,
                    "store rejected change; restoring authoritative state"
                );
                if let Err(refetch_error) = self.refetch().await {
                    tracing::error!(operation, error = %refetch_error, "rollback refetch failed");
                }
                Err(error)
            }
        }
    }
}

fn not_found_locally(id: ProjectId) -> AppError {
    AppError::NotFound(format!("Project {} is not in the local list", id))
}
