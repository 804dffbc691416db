use crate::domain::inflation::InflationDataPoint;
use crate::time::period::YearMonth;
use anyhow::Context;

pub async fn series(pool: &sqlx::PgPool) -> anyhow::Result<Vec<InflationDataPoint>> {
    let rows: Vec<(String, f64, bool)> = sqlx::query_as(
        "SELECT period, value::float8, is_estimated FROM inflation_data ORDER BY period ASC",
    )
    .persistent(false)
    .fetch_all(pool)
    .await
    .context("select inflation_data failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for (period, value, is_estimated) in rows {
        let period: YearMonth = period
            .parse()
            .with_context(|| format!("invalid period in inflation_data: {period}"))?;
        out.push(InflationDataPoint {
            period,
            value,
            is_estimated,
        });
    }
    Ok(out)
}

/// Upserts the whole series in one transaction. Real values replace estimates.
pub async fn upsert_points(
    pool: &sqlx::PgPool,
    points: &[InflationDataPoint],
) -> anyhow::Result<u64> {
    if points.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let mut qb = sqlx::QueryBuilder::new("INSERT INTO inflation_data (period, value, is_estimated) ");
    qb.push_values(points, |mut b, p| {
        b.push_bind(p.period.to_string())
            .push_bind(p.value)
            .push_bind(p.is_estimated);
    });
    qb.push(
        " ON CONFLICT (period) DO UPDATE \
           SET value = EXCLUDED.value, is_estimated = EXCLUDED.is_estimated, updated_at = now()",
    );

    let res = qb
        .build()
        .persistent(false)
        .execute(&mut *tx)
        .await
        .context("batch upsert inflation_data failed")?;

    tx.commit().await.context("commit transaction failed")?;
    Ok(res.rows_affected())
}
