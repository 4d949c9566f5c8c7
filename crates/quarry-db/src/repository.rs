use chrono::{DateTime, NaiveDate, Utc};
use quarry_core::error::AppError;
use quarry_core::models::{JobPosting, JobSkill, PostingCandidate, PostingFilter, Stats, UpsertSummary};
use quarry_core::platform::Platform;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::pool::{ConnectionPool, PooledConnection};

const JOB_COLUMNS: &str = "id, fingerprint, platform, source_id, job_url, title, company, location, \
     job_type, date_posted, description, salary_min, salary_max, currency, first_seen_at, last_seen_at, times_seen";

/// Repository for postings, applications, resumes and skills in SQLite.
///
/// Every operation checks out exactly one pooled handle and returns it
/// before completing.
#[derive(Clone)]
pub struct Repository {
    pool: ConnectionPool<SqliteConnection>,
}

pub(crate) fn db_err(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

/// `LIKE` pattern matching `value` as a literal substring. Pair with `ESCAPE '\'`.
fn contains_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl Repository {
    pub fn new(pool: ConnectionPool<SqliteConnection>) -> Self {
        Self { pool }
    }

    pub(crate) async fn conn(&self) -> Result<PooledConnection<SqliteConnection>, AppError> {
        self.pool.acquire().await
    }

    /// Insert unseen postings and refresh seen ones, keyed by fingerprint.
    ///
    /// Each posting is one atomic statement: a re-sighting updates the
    /// mutable fields and `last_seen_at` and leaves `first_seen_at` alone.
    /// A posting that collides on another unique column (its URL already
    /// belongs to a different fingerprint) is logged and skipped.
    pub async fn upsert_postings(&self, postings: &[PostingCandidate]) -> Result<UpsertSummary, AppError> {
        let mut conn = self.conn().await?;
        let mut summary = UpsertSummary::default();

        for posting in postings {
            let fingerprint = posting.fingerprint();
            let now = Utc::now();
            let result: Result<(i64,), sqlx::Error> = sqlx::query_as(
                r#"
                INSERT INTO jobs (
                    fingerprint, platform, source_id, job_url, title, company, location, job_type,
                    date_posted, description, salary_min, salary_max, currency, first_seen_at, last_seen_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
                ON CONFLICT (fingerprint) DO UPDATE SET
                    job_url = COALESCE(excluded.job_url, jobs.job_url),
                    title = excluded.title,
                    company = excluded.company,
                    location = COALESCE(excluded.location, jobs.location),
                    job_type = COALESCE(excluded.job_type, jobs.job_type),
                    date_posted = COALESCE(excluded.date_posted, jobs.date_posted),
                    description = COALESCE(excluded.description, jobs.description),
                    salary_min = COALESCE(excluded.salary_min, jobs.salary_min),
                    salary_max = COALESCE(excluded.salary_max, jobs.salary_max),
                    currency = COALESCE(excluded.currency, jobs.currency),
                    last_seen_at = excluded.last_seen_at,
                    times_seen = jobs.times_seen + 1
                RETURNING times_seen
                "#,
            )
            .bind(&fingerprint)
            .bind(posting.platform.as_str())
            .bind(&posting.source_id)
            .bind(&posting.url)
            .bind(&posting.title)
            .bind(&posting.company)
            .bind(&posting.location)
            .bind(&posting.job_type)
            .bind(posting.posted_date)
            .bind(&posting.description)
            .bind(posting.salary_min)
            .bind(posting.salary_max)
            .bind(&posting.currency)
            .bind(now)
            .fetch_one(&mut *conn)
            .await;

            match result {
                Ok((1,)) => summary.inserted += 1,
                Ok(_) => summary.updated += 1,
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    tracing::warn!(
                        %fingerprint,
                        platform = %posting.platform,
                        url = ?posting.url,
                        error = %e,
                        "Integrity error, skipping posting"
                    );
                    summary.skipped += 1;
                }
                Err(e) => return Err(db_err(e)),
            }
        }

        tracing::debug!(
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            "Upserted postings"
        );
        Ok(summary)
    }

    /// List stored postings matching `filter`, newest `date_posted` first.
    pub async fn get_postings(&self, filter: &PostingFilter) -> Result<Vec<JobPosting>, AppError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {JOB_COLUMNS} FROM jobs WHERE 1 = 1"));
        if let Some(fingerprint) = &filter.fingerprint {
            qb.push(" AND fingerprint = ").push_bind(fingerprint.clone());
        }
        if let Some(platform) = filter.platform {
            qb.push(" AND platform = ").push_bind(platform.as_str());
        }
        if let Some(company) = &filter.company {
            qb.push(" AND company LIKE ")
                .push_bind(contains_pattern(company))
                .push(r" ESCAPE '\'");
        }
        if let Some(location) = &filter.location {
            qb.push(" AND location LIKE ")
                .push_bind(contains_pattern(location))
                .push(r" ESCAPE '\'");
        }
        if let Some(since) = filter.posted_since {
            qb.push(" AND date_posted >= ").push_bind(since);
        }
        qb.push(" ORDER BY date_posted IS NULL, date_posted DESC, id DESC LIMIT ")
            .push_bind(filter.limit as i64)
            .push(" OFFSET ")
            .push_bind(filter.offset as i64);

        let mut conn = self.conn().await?;
        let rows = qb
            .build_query_as::<JobRow>()
            .fetch_all(&mut *conn)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(JobPosting::try_from).collect()
    }

    /// Get a single posting by its row id.
    pub async fn get_posting(&self, id: i64) -> Result<Option<JobPosting>, AppError> {
        let mut conn = self.conn().await?;
        let row = sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?;

        row.map(JobPosting::try_from).transpose()
    }

    /// Totals plus per-status and per-platform breakdowns.
    pub async fn compute_stats(&self) -> Result<Stats, AppError> {
        let mut conn = self.conn().await?;

        let (total_jobs, total_applications, total_resumes): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM jobs),
                (SELECT COUNT(*) FROM applications),
                (SELECT COUNT(*) FROM resumes)
            "#,
        )
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;

        let by_status: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM applications GROUP BY status")
                .fetch_all(&mut *conn)
                .await
                .map_err(db_err)?;

        let by_platform: Vec<(String, i64)> =
            sqlx::query_as("SELECT platform, COUNT(*) FROM jobs GROUP BY platform")
                .fetch_all(&mut *conn)
                .await
                .map_err(db_err)?;

        Ok(Stats {
            total_jobs,
            total_applications,
            total_resumes,
            applications_by_status: by_status.into_iter().collect(),
            jobs_by_platform: by_platform.into_iter().collect(),
        })
    }

    /// Attach skills to a posting. Already-attached skills are left as is.
    /// Returns how many were added.
    pub async fn add_skills(&self, job_id: i64, skills: &[JobSkill]) -> Result<usize, AppError> {
        let mut conn = self.conn().await?;
        ensure_exists(&mut conn, "jobs", job_id, "Job").await?;
        if skills.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Sqlite>::new("INSERT OR IGNORE INTO job_skills (job_id, skill, importance) ");
        qb.push_values(skills, |mut row, skill| {
            row.push_bind(job_id)
                .push_bind(skill.skill.trim().to_lowercase())
                .push_bind(skill.importance.clone());
        });
        let result = qb.build().execute(&mut *conn).await.map_err(db_err)?;

        Ok(result.rows_affected() as usize)
    }

    pub async fn skills_for_job(&self, job_id: i64) -> Result<Vec<JobSkill>, AppError> {
        let mut conn = self.conn().await?;
        let rows: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT skill, importance FROM job_skills WHERE job_id = ?1 ORDER BY skill")
                .bind(job_id)
                .fetch_all(&mut *conn)
                .await
                .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(skill, importance)| JobSkill { skill, importance })
            .collect())
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        let mut conn = self.conn().await?;
        sqlx::query("SELECT 1")
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

pub(crate) async fn ensure_exists(
    conn: &mut SqliteConnection,
    table: &str,
    id: i64,
    label: &str,
) -> Result<(), AppError> {
    let found: Option<(i64,)> = sqlx::query_as(&format!("SELECT id FROM {table} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    match found {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound(format!("{label} {id}"))),
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    fingerprint: String,
    platform: String,
    source_id: Option<String>,
    job_url: Option<String>,
    title: String,
    company: String,
    location: Option<String>,
    job_type: Option<String>,
    date_posted: Option<NaiveDate>,
    description: Option<String>,
    salary_min: Option<f64>,
    salary_max: Option<f64>,
    currency: Option<String>,
    first_seen_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
    times_seen: i64,
}

impl TryFrom<JobRow> for JobPosting {
    type Error = AppError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let platform: Platform = row.platform.parse().map_err(AppError::DatabaseError)?;
        Ok(JobPosting {
            id: row.id,
            fingerprint: row.fingerprint,
            platform,
            source_id: row.source_id,
            url: row.job_url,
            title: row.title,
            company: row.company,
            location: row.location,
            job_type: row.job_type,
            posted_date: row.date_posted,
            description: row.description,
            salary_min: row.salary_min,
            salary_max: row.salary_max,
            currency: row.currency,
            first_seen_at: row.first_seen_at,
            last_seen_at: row.last_seen_at,
            times_seen: row.times_seen,
        })
    }
}

// -- Trait implementation --

impl quarry_core::traits::PostingStore for Repository {
    async fn upsert_postings(&self, postings: &[PostingCandidate]) -> Result<UpsertSummary, AppError> {
        Repository::upsert_postings(self, postings).await
    }
}
