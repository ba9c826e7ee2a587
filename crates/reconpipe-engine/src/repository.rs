//! Job storage abstraction

use async_trait::async_trait;
use reconpipe_core::{Error, Result, ScanJob};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Job storage interface. Readers always receive owned snapshots.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Store a newly created job; fails if the id is taken
    async fn insert(&self, job: ScanJob) -> Result<()>;

    /// Replace a stored job; a job that is already terminal cannot change
    async fn save(&self, job: ScanJob) -> Result<()>;

    async fn get(&self, job_id: Uuid) -> Result<Option<ScanJob>>;

    /// All jobs, oldest first
    async fn list(&self) -> Result<Vec<ScanJob>>;
}

/// Process-local job store
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<Uuid, ScanJob>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: ScanJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(Error::Repository(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn save(&self, job: ScanJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get(&job.id) {
            None => Err(Error::JobNotFound { job_id: job.id }),
            Some(stored) if stored.is_terminal() => {
                Err(Error::JobAlreadyFinished { job_id: job.id })
            }
            Some(_) => {
                jobs.insert(job.id, job);
                Ok(())
            }
        }
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ScanJob>> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn list(&self) -> Result<Vec<ScanJob>> {
        let mut jobs: Vec<ScanJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconpipe_core::{JobStatus, ModuleSet};

    fn job(name: &str) -> ScanJob {
        ScanJob::new(name, vec!["example.com".into()], ModuleSet::all())
    }

    #[tokio::test]
    async fn test_insert_get_list() {
        let repo = InMemoryJobRepository::new();
        let first = job("first");
        let mut second = job("second");
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        repo.insert(second.clone()).await.unwrap();
        repo.insert(first.clone()).await.unwrap();

        assert!(repo.insert(first.clone()).await.is_err());
        assert_eq!(repo.get(first.id).await.unwrap().unwrap().name, "first");
        assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|j| j.name).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_terminal_jobs_are_read_only() {
        let repo = InMemoryJobRepository::new();
        let mut job = job("scan");
        repo.insert(job.clone()).await.unwrap();

        job.transition(JobStatus::Running).unwrap();
        repo.save(job.clone()).await.unwrap();
        job.transition(JobStatus::Completed).unwrap();
        repo.save(job.clone()).await.unwrap();

        job.name = "renamed".into();
        let err = repo.save(job.clone()).await.unwrap_err();
        assert!(matches!(err, Error::JobAlreadyFinished { .. }));
        assert_eq!(repo.get(job.id).await.unwrap().unwrap().name, "scan");
    }

    #[tokio::test]
    async fn test_snapshots_are_detached() {
        let repo = InMemoryJobRepository::new();
        let job = job("scan");
        repo.insert(job.clone()).await.unwrap();

        let mut snapshot = repo.get(job.id).await.unwrap().unwrap();
        snapshot.progress = 50;
        assert_eq!(repo.get(job.id).await.unwrap().unwrap().progress, 0);
    }
}
