use crate::domain::analysis::{
    AnalysisComment, AnalysisStatus, AnalysisTotal, CategoryStatus, CommentAuthor,
    ExpenseAnalysis, ExpenseCategory, NewComment, SharedLink, Subcategory,
};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

type TotalRow = (Uuid, String, String, Option<NaiveDate>, f64);

fn into_total((user_id, building_name, period, period_date, amount): TotalRow) -> AnalysisTotal {
    AnalysisTotal {
        user_id,
        building_name,
        period,
        period_date,
        amount,
    }
}

pub async fn completed_totals(
    pool: &sqlx::PgPool,
    category: Option<&str>,
) -> anyhow::Result<Vec<AnalysisTotal>> {
    let rows = match category {
        Some(category) => {
            sqlx::query_as::<_, TotalRow>(
                "SELECT a.user_id, a.building_name, a.period, a.period_date, c.current_amount::float8 \
                 FROM expense_analyses a \
                 INNER JOIN expense_categories c ON c.analysis_id = a.id \
                 WHERE a.status = 'completed' AND a.building_name IS NOT NULL \
                   AND lower(c.name) = lower($1)",
            )
            .persistent(false)
            .bind(category)
            .fetch_all(pool)
            .await
            .with_context(|| format!("select completed totals for category={category} failed"))?
        }
        None => {
            sqlx::query_as::<_, TotalRow>(
                "SELECT user_id, building_name, period, period_date, total_amount::float8 \
                 FROM expense_analyses \
                 WHERE status = 'completed' AND building_name IS NOT NULL",
            )
            .persistent(false)
            .fetch_all(pool)
            .await
            .context("select completed totals failed")?
        }
    };

    Ok(rows.into_iter().map(into_total).collect())
}

pub async fn user_history(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    building_name: &str,
) -> anyhow::Result<Vec<AnalysisTotal>> {
    let rows = sqlx::query_as::<_, TotalRow>(
        "SELECT user_id, building_name, period, period_date, total_amount::float8 \
         FROM expense_analyses \
         WHERE user_id = $1 AND building_name = $2 AND status = 'completed' \
         ORDER BY created_at ASC",
    )
    .persistent(false)
    .bind(user_id)
    .bind(building_name)
    .fetch_all(pool)
    .await
    .context("select user history failed")?;

    Ok(rows.into_iter().map(into_total).collect())
}

pub async fn analysis(pool: &sqlx::PgPool, id: Uuid) -> anyhow::Result<Option<ExpenseAnalysis>> {
    let row = sqlx::query_as::<
        _,
        (
            Uuid,
            Uuid,
            Option<String>,
            String,
            Option<NaiveDate>,
            f64,
            Option<f64>,
            String,
            Option<String>,
            DateTime<Utc>,
        ),
    >(
        "SELECT id, user_id, building_name, period, period_date, total_amount::float8, \
                previous_total::float8, status, notes, created_at \
         FROM expense_analyses \
         WHERE id = $1",
    )
    .persistent(false)
    .bind(id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select expense_analyses id={id} failed"))?;

    let Some((
        id,
        user_id,
        building_name,
        period,
        period_date,
        total_amount,
        previous_total,
        status,
        notes,
        created_at,
    )) = row
    else {
        return Ok(None);
    };

    let status = AnalysisStatus::parse(&status)
        .with_context(|| format!("unknown analysis status in DB for id={id}: {status}"))?;

    Ok(Some(ExpenseAnalysis {
        id,
        user_id,
        building_name,
        period,
        period_date,
        total_amount,
        previous_total,
        status,
        notes,
        created_at,
    }))
}

pub async fn categories(
    pool: &sqlx::PgPool,
    analysis_id: Uuid,
) -> anyhow::Result<Vec<ExpenseCategory>> {
    let rows = sqlx::query_as::<
        _,
        (
            String,
            f64,
            Option<f64>,
            String,
            Option<String>,
            serde_json::Value,
        ),
    >(
        "SELECT name, current_amount::float8, previous_amount::float8, status, explanation, subcategories \
         FROM expense_categories \
         WHERE analysis_id = $1 \
         ORDER BY current_amount DESC, name ASC",
    )
    .persistent(false)
    .bind(analysis_id)
    .fetch_all(pool)
    .await
    .context("select expense_categories failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for (name, current_amount, previous_amount, status, explanation, subcategories) in rows {
        // A malformed breakdown should not hide the category itself.
        let subcategories = serde_json::from_value::<Vec<Subcategory>>(subcategories)
            .unwrap_or_else(|err| {
                tracing::warn!(%analysis_id, category = %name, error = %err, "ignoring malformed subcategories");
                Vec::new()
            });
        out.push(ExpenseCategory {
            name,
            current_amount,
            previous_amount,
            status: CategoryStatus::parse(&status),
            explanation,
            subcategories,
        });
    }
    Ok(out)
}

pub async fn comments(
    pool: &sqlx::PgPool,
    analysis_id: Uuid,
) -> anyhow::Result<Vec<AnalysisComment>> {
    let rows = sqlx::query_as::<_, (Uuid, String, Option<String>, String, DateTime<Utc>)>(
        "SELECT id, author, author_name, body, created_at \
         FROM analysis_comments \
         WHERE analysis_id = $1 \
         ORDER BY created_at ASC",
    )
    .persistent(false)
    .bind(analysis_id)
    .fetch_all(pool)
    .await
    .context("select analysis_comments failed")?;

    Ok(rows
        .into_iter()
        .map(|(id, author, author_name, body, created_at)| AnalysisComment {
            id,
            analysis_id,
            author: if author == "owner" {
                CommentAuthor::Owner
            } else {
                CommentAuthor::Visitor
            },
            author_name,
            body,
            created_at,
        })
        .collect())
}

pub async fn insert_comment(
    pool: &sqlx::PgPool,
    comment: &NewComment,
) -> anyhow::Result<AnalysisComment> {
    let id = Uuid::new_v4();
    let created_at: DateTime<Utc> = Utc::now();

    sqlx::query(
        "INSERT INTO analysis_comments (id, analysis_id, author, author_name, body, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .persistent(false)
    .bind(id)
    .bind(comment.analysis_id)
    .bind(comment.author.as_str())
    .bind(comment.author_name.as_deref())
    .bind(&comment.body)
    .bind(created_at)
    .execute(pool)
    .await
    .context("insert analysis_comments failed")?;

    Ok(AnalysisComment {
        id,
        analysis_id: comment.analysis_id,
        author: comment.author,
        author_name: comment.author_name.clone(),
        body: comment.body.clone(),
        created_at,
    })
}

pub async fn update_notes(
    pool: &sqlx::PgPool,
    analysis_id: Uuid,
    user_id: Uuid,
    notes: Option<&str>,
) -> anyhow::Result<bool> {
    let res = sqlx::query("UPDATE expense_analyses SET notes = $3 WHERE id = $1 AND user_id = $2")
        .persistent(false)
        .bind(analysis_id)
        .bind(user_id)
        .bind(notes)
        .execute(pool)
        .await
        .context("update expense_analyses notes failed")?;
    Ok(res.rows_affected() > 0)
}

pub async fn shared_link(pool: &sqlx::PgPool, token: &str) -> anyhow::Result<Option<SharedLink>> {
    let row = sqlx::query_as::<_, (String, Uuid, bool, Option<DateTime<Utc>>)>(
        "SELECT token, analysis_id, is_active, expires_at \
         FROM shared_links \
         WHERE token = $1",
    )
    .persistent(false)
    .bind(token)
    .fetch_optional(pool)
    .await
    .context("select shared_links failed")?;

    Ok(row.map(|(token, analysis_id, is_active, expires_at)| SharedLink {
        token,
        analysis_id,
        is_active,
        expires_at,
    }))
}
