use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{Project, ProjectId};

/// Authoritative record storage as seen by the sync engine. Implementations
/// give no guarantees beyond a single record per call.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_records(&self) -> AppResult<Vec<Project>>;
    async fn create_record(&self, project: &Project) -> AppResult<ProjectId>;
    async fn get_record(&self, id: ProjectId) -> AppResult<Project>;
    async fn update_record(&self, id: ProjectId, project: &Project) -> AppResult<()>;
    async fn delete_record(&self, id: ProjectId) -> AppResult<()>;
}

#[async_trait::async_trait]
impl RecordStore for Database {
    async fn list_records(&self) -> AppResult<Vec<Project>> {
        self.list_projects()
    }

    async fn create_record(&self, project: &Project) -> AppResult<ProjectId> {
        self.insert_project(project)
    }

    async fn get_record(&self, id: ProjectId) -> AppResult<Project> {
        self.get_project(id)?
            .ok_or_else(|| AppError::NotFound(format!("Project {} not found", id)))
    }

    async fn update_record(&self, id: ProjectId, project: &Project) -> AppResult<()> {
        self.update_project(id, project)
    }

    async fn delete_record(&self, id: ProjectId) -> AppResult<()> {
        self.delete_project(id)
    }
}
