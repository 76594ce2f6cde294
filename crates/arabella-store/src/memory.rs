//! In-memory system of record.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use arabella_models::{AiProvider, JobId, Template, User, UserTier, VideoJob};

use crate::error::{StoreError, StoreResult};
use crate::repos::{JobFilter, JobRepository, TemplateRepository, UserRepository};

/// Thread-safe store for users, templates and jobs.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, User>>,
    templates: RwLock<HashMap<String, Template>>,
    jobs: RwLock<HashMap<JobId, VideoJob>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    pub async fn insert_template(&self, template: Template) {
        self.templates
            .write()
            .await
            .insert(template.id.clone(), template);
    }

    /// Insert a demo user and template with fixed ids.
    pub async fn seed_demo(&self) -> (User, Template) {
        let mut user = User::new("demo@arabella.app", "Demo User")
            .with_tier(UserTier::Pro)
            .with_credits(100);
        user.id = "demo-user".to_string();

        let mut template = Template::new(
            "Cyberpunk Intro",
            "cyberpunk_intro",
            "Neon-lit futuristic city at night, cinematic camera movement",
        );
        template.id = "cyberpunk-intro".to_string();
        template.credit_cost = 2;
        template.preferred_provider = Some(AiProvider::WanAi);

        self.insert_user(user.clone()).await;
        self.insert_template(template.clone()).await;
        info!(user_id = %user.id, template_id = %template.id, "Seeded demo data");
        (user, template)
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn create_job(&self, job: &VideoJob) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id.to_string()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: &JobId) -> StoreResult<VideoJob> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("job", job_id.as_str()))
    }

    async fn update_job(&self, job: &VideoJob) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get_mut(&job.id)
            .ok_or_else(|| StoreError::not_found("job", job.id.as_str()))?;
        if stored.is_terminal() {
            debug!(job_id = %job.id, status = %stored.status, "Rejected write to terminal job");
            return Err(StoreError::JobAlreadyTerminal(stored.status));
        }
        *stored = job.clone();
        Ok(())
    }

    async fn cancel_job(&self, job_id: &JobId) -> StoreResult<VideoJob> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::not_found("job", job_id.as_str()))?;
        let status = stored.status;
        stored
            .cancel()
            .map_err(|_| StoreError::NotCancellable(status))?;
        debug!(job_id = %job_id, from = %status, "Cancelled job");
        Ok(stored.clone())
    }

    async fn list_jobs(
        &self,
        filter: &JobFilter,
        offset: usize,
        limit: usize,
    ) -> StoreResult<(Vec<VideoJob>, u64)> {
        let jobs = self.jobs.read().await;
        let mut matched: Vec<&VideoJob> = jobs
            .values()
            .filter(|j| filter.user_id.as_deref().map_or(true, |u| j.user_id == u))
            .filter(|j| filter.status.map_or(true, |s| j.status == s))
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matched.len() as u64;
        let page = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn get_user(&self, user_id: &str) -> StoreResult<User> {
        self.users
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("user", user_id))
    }

    async fn debit_credits(&self, user_id: &str, amount: u32) -> StoreResult<u32> {
        // Check and subtract under one write guard
        let mut users = self.users.write().await;
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::not_found("user", user_id))?;
        if user.credits < amount {
            return Err(StoreError::InsufficientCredits {
                needed: amount,
                available: user.credits,
            });
        }
        user.credits -= amount;
        user.updated_at = Utc::now();
        debug!(user_id = %user_id, amount, remaining = user.credits, "Debited credits");
        Ok(user.credits)
    }

    async fn refund_credits(&self, user_id: &str, amount: u32) -> StoreResult<u32> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::not_found("user", user_id))?;
        user.credits = user.credits.saturating_add(amount);
        user.updated_at = Utc::now();
        debug!(user_id = %user_id, amount, balance = user.credits, "Refunded credits");
        Ok(user.credits)
    }
}

#[async_trait]
impl TemplateRepository for MemoryStore {
    async fn get_template(&self, template_id: &str) -> StoreResult<Template> {
        self.templates
            .read()
            .await
            .get(template_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("template", template_id))
    }

    async fn increment_usage(&self, template_id: &str) -> StoreResult<()> {
        let mut templates = self.templates.write().await;
        let template = templates
            .get_mut(template_id)
            .ok_or_else(|| StoreError::not_found("template", template_id))?;
        template.increment_usage();
        Ok(())
    }
}
