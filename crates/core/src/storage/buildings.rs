use crate::domain::building::BuildingProfile;
use anyhow::Context;
use uuid::Uuid;

type ProfileRow = (
    Uuid,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<bool>,
    Vec<String>,
);

const PROFILE_COLUMNS: &str = "user_id, building_name, country, province, city, neighborhood, zone, \
                               unit_count_range, age_category, has_amenities, amenities";

fn into_profile(row: ProfileRow) -> BuildingProfile {
    let (
        user_id,
        building_name,
        country,
        province,
        city,
        neighborhood,
        zone,
        unit_count_range,
        age_category,
        has_amenities,
        amenities,
    ) = row;
    BuildingProfile {
        user_id,
        building_name,
        country,
        province,
        city,
        neighborhood,
        zone,
        unit_count_range,
        age_category,
        has_amenities,
        amenities,
    }
}

pub async fn all_profiles(pool: &sqlx::PgPool) -> anyhow::Result<Vec<BuildingProfile>> {
    let rows = sqlx::query_as::<_, ProfileRow>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM building_profiles"
    ))
    .persistent(false)
    .fetch_all(pool)
    .await
    .context("select building_profiles failed")?;
    Ok(rows.into_iter().map(into_profile).collect())
}

pub async fn profile(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    building_name: &str,
) -> anyhow::Result<Option<BuildingProfile>> {
    let row = sqlx::query_as::<_, ProfileRow>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM building_profiles WHERE user_id = $1 AND building_name = $2"
    ))
    .persistent(false)
    .bind(user_id)
    .bind(building_name)
    .fetch_optional(pool)
    .await
    .context("select building_profiles by key failed")?;
    Ok(row.map(into_profile))
}

/// Writes the profile as given. Merging with the stored row happens before this call.
pub async fn upsert_profile(pool: &sqlx::PgPool, p: &BuildingProfile) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO building_profiles \
           (user_id, building_name, country, province, city, neighborhood, zone, \
            unit_count_range, age_category, has_amenities, amenities, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now()) \
         ON CONFLICT (user_id, building_name) DO UPDATE \
           SET country = EXCLUDED.country, province = EXCLUDED.province, city = EXCLUDED.city, \
               neighborhood = EXCLUDED.neighborhood, zone = EXCLUDED.zone, \
               unit_count_range = EXCLUDED.unit_count_range, age_category = EXCLUDED.age_category, \
               has_amenities = EXCLUDED.has_amenities, amenities = EXCLUDED.amenities, \
               updated_at = now()",
    )
    .persistent(false)
    .bind(p.user_id)
    .bind(&p.building_name)
    .bind(p.country.as_deref())
    .bind(p.province.as_deref())
    .bind(p.city.as_deref())
    .bind(p.neighborhood.as_deref())
    .bind(p.zone.as_deref())
    .bind(p.unit_count_range.as_deref())
    .bind(p.age_category.as_deref())
    .bind(p.has_amenities)
    .bind(&p.amenities)
    .execute(pool)
    .await
    .context("upsert building_profiles failed")?;
    Ok(())
}

/// Every building name the user has analyzed or profiled, oldest first.
pub async fn user_building_names(pool: &sqlx::PgPool, user_id: Uuid) -> anyhow::Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT building_name FROM ( \
             SELECT building_name, min(created_at) AS first_seen \
             FROM expense_analyses \
             WHERE user_id = $1 AND building_name IS NOT NULL \
             GROUP BY building_name \
             UNION ALL \
             SELECT building_name, updated_at AS first_seen \
             FROM building_profiles \
             WHERE user_id = $1 \
         ) names \
         GROUP BY building_name \
         ORDER BY min(first_seen) ASC",
    )
    .persistent(false)
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("select user building names failed")?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}
