use crate::domain::building::{find_matching_building, normalize_building_name, BuildingProfile};
use crate::error::{ServiceError, ServiceResult};
use crate::storage::ExpenseRepository;
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingMatch {
    pub input: String,
    pub normalized: String,
    /// The user's existing spelling when the input refers to a known building.
    pub matched: Option<String>,
    /// Name to store the analysis under.
    pub resolved: String,
}

#[derive(Clone)]
pub struct BuildingService {
    repo: Arc<dyn ExpenseRepository>,
}

impl BuildingService {
    pub fn new(repo: Arc<dyn ExpenseRepository>) -> Self {
        Self { repo }
    }

    /// Maps a freshly extracted building name onto one the user already has, so the same
    /// building is not split across spellings.
    pub async fn resolve_building_name(
        &self,
        user_id: Uuid,
        candidate: &str,
    ) -> ServiceResult<BuildingMatch> {
        let input = candidate.trim();
        if input.is_empty() {
            return Err(ServiceError::validation("buildingName must not be empty"));
        }

        let existing = self
            .repo
            .user_building_names(user_id)
            .await
            .context("load user building names failed")?;
        let matched = find_matching_building(input, &existing).map(str::to_string);

        tracing::debug!(%user_id, input, matched = ?matched, "building name resolved");
        Ok(BuildingMatch {
            input: input.to_string(),
            normalized: normalize_building_name(input),
            resolved: matched.clone().unwrap_or_else(|| input.to_string()),
            matched,
        })
    }

    /// Merges `incoming` into the stored profile of the same building and saves the result.
    pub async fn upsert_profile(&self, incoming: BuildingProfile) -> ServiceResult<BuildingProfile> {
        let resolved = self
            .resolve_building_name(incoming.user_id, &incoming.building_name)
            .await?
            .resolved;

        let mut profile = self
            .repo
            .building_profile(incoming.user_id, &resolved)
            .await
            .context("load building profile failed")?
            .unwrap_or_else(|| BuildingProfile {
                user_id: incoming.user_id,
                building_name: resolved.clone(),
                ..Default::default()
            });
        profile.merge(incoming);
        profile.building_name = resolved;

        self.repo
            .save_building_profile(&profile)
            .await
            .context("save building profile failed")?;
        Ok(profile)
    }
}
