use crate::cache::shared::SharedAnalysisCache;
use crate::cache::CacheStore;
use crate::domain::analysis::{
    AnalysisComment, CommentAuthor, ExpenseAnalysis, NewComment, SharedLink,
};
use crate::error::{ServiceError, ServiceResult};
use crate::storage::ExpenseRepository;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const MAX_COMMENT_CHARS: usize = 2000;
const MAX_AUTHOR_NAME_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedAnalysisResponse {
    pub data: Value,
    pub cached: bool,
}

/// Public read-only view of an analysis behind a share token, plus the mutations that
/// must drop that view's cached payload.
#[derive(Clone)]
pub struct SharedAnalysisService {
    repo: Arc<dyn ExpenseRepository>,
    cache: SharedAnalysisCache,
}

impl SharedAnalysisService {
    pub fn new(repo: Arc<dyn ExpenseRepository>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            repo,
            cache: SharedAnalysisCache::new(store),
        }
    }

    pub async fn shared_analysis(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<SharedAnalysisResponse> {
        let link = self.usable_link(token, now).await?;

        if let Some(data) = self.cache.get_cached_analysis(token, now).await {
            tracing::debug!(analysis_id = %link.analysis_id, "shared analysis served from cache");
            return Ok(SharedAnalysisResponse { data, cached: true });
        }

        let data = self.assemble(link.analysis_id).await?;
        self.cache
            .cache_analysis(link.analysis_id, token, data.clone(), now)
            .await;

        Ok(SharedAnalysisResponse {
            data,
            cached: false,
        })
    }

    pub async fn add_visitor_comment(
        &self,
        token: &str,
        author_name: Option<&str>,
        body: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<AnalysisComment> {
        let link = self.usable_link(token, now).await?;
        let author_name = author_name
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.chars().take(MAX_AUTHOR_NAME_CHARS).collect::<String>());

        self.add_comment(NewComment {
            analysis_id: link.analysis_id,
            author: CommentAuthor::Visitor,
            author_name,
            body: comment_body(body)?,
        })
        .await
    }

    pub async fn add_owner_comment(
        &self,
        user_id: Uuid,
        analysis_id: Uuid,
        body: &str,
    ) -> ServiceResult<AnalysisComment> {
        let body = comment_body(body)?;
        self.owned_analysis(user_id, analysis_id).await?;

        self.add_comment(NewComment {
            analysis_id,
            author: CommentAuthor::Owner,
            author_name: None,
            body,
        })
        .await
    }

    pub async fn update_notes(
        &self,
        user_id: Uuid,
        analysis_id: Uuid,
        notes: Option<&str>,
    ) -> ServiceResult<()> {
        let notes = notes.map(str::trim).filter(|s| !s.is_empty());
        let updated = self
            .repo
            .update_notes(analysis_id, user_id, notes)
            .await
            .context("update analysis notes failed")?;
        if !updated {
            return Err(ServiceError::not_found(format!("analysis {analysis_id}")));
        }

        self.cache.invalidate_cache(analysis_id).await;
        tracing::info!(%analysis_id, "analysis notes updated");
        Ok(())
    }

    pub async fn cleanup_expired_cache(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        self.cache.cleanup_expired_cache(now).await
    }

    async fn add_comment(&self, comment: NewComment) -> ServiceResult<AnalysisComment> {
        let stored = self
            .repo
            .insert_comment(&comment)
            .await
            .context("insert comment failed")?;

        self.cache.invalidate_cache(comment.analysis_id).await;
        tracing::info!(
            analysis_id = %comment.analysis_id,
            author = comment.author.as_str(),
            "comment added"
        );
        Ok(stored)
    }

    /// Inactive, expired and unknown tokens are indistinguishable to the caller.
    async fn usable_link(&self, token: &str, now: DateTime<Utc>) -> ServiceResult<SharedLink> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ServiceError::validation("token must not be empty"));
        }

        let link = self
            .repo
            .shared_link(token)
            .await
            .context("load shared link failed")?;
        match link {
            Some(link) if link.is_usable(now) => Ok(link),
            _ => Err(ServiceError::not_found("shared link")),
        }
    }

    async fn owned_analysis(&self, user_id: Uuid, analysis_id: Uuid) -> ServiceResult<ExpenseAnalysis> {
        let analysis = self
            .repo
            .analysis(analysis_id)
            .await
            .context("load analysis failed")?;
        match analysis {
            Some(a) if a.user_id == user_id => Ok(a),
            _ => Err(ServiceError::not_found(format!("analysis {analysis_id}"))),
        }
    }

    async fn assemble(&self, analysis_id: Uuid) -> ServiceResult<Value> {
        let analysis = self
            .repo
            .analysis(analysis_id)
            .await
            .context("load shared analysis failed")?
            .ok_or_else(|| ServiceError::not_found(format!("analysis {analysis_id}")))?;

        let categories = self
            .repo
            .categories(analysis_id)
            .await
            .context("load shared analysis categories failed")?;
        let comments = self
            .repo
            .comments(analysis_id)
            .await
            .context("load shared analysis comments failed")?;

        let history: Vec<Value> = match analysis.building_name.as_deref() {
            Some(building) => self
                .repo
                .user_history(analysis.user_id, building)
                .await
                .context("load shared analysis history failed")?
                .into_iter()
                .map(|row| json!({"period": row.period, "totalAmount": row.amount}))
                .collect(),
            None => Vec::new(),
        };

        // The owner's id stays private.
        Ok(json!({
            "analysis": {
                "id": analysis.id,
                "buildingName": analysis.building_name,
                "period": analysis.period,
                "periodDate": analysis.period_date,
                "totalAmount": analysis.total_amount,
                "previousTotal": analysis.previous_total,
                "status": analysis.status,
                "notes": analysis.notes,
                "createdAt": analysis.created_at,
            },
            "categories": categories,
            "comments": comments,
            "history": history,
        }))
    }
}

fn comment_body(body: &str) -> ServiceResult<String> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ServiceError::validation("comment must not be empty"));
    }
    if body.chars().count() > MAX_COMMENT_CHARS {
        return Err(ServiceError::validation(format!(
            "comment must be at most {MAX_COMMENT_CHARS} characters"
        )));
    }
    Ok(body.to_string())
}
