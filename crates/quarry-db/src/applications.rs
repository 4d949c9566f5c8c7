use chrono::{DateTime, Utc};
use quarry_core::error::AppError;
use quarry_core::models::{
    Application, ApplicationStatus, ApplicationUpdate, ApplicationView, NewApplication, NewResume, Resume,
};
use sqlx::{QueryBuilder, Sqlite};

use crate::repository::{Repository, db_err, ensure_exists};

const APPLICATION_COLUMNS: &str = "id, job_id, resume_id, status, applied_at, match_score, notes, updated_at";

impl Repository {
    /// Record an application for an existing posting.
    pub async fn create_application(&self, new: &NewApplication) -> Result<Application, AppError> {
        new.validate()?;
        let mut conn = self.conn().await?;

        ensure_exists(&mut conn, "jobs", new.job_id, "Job").await?;
        if let Some(resume_id) = new.resume_id {
            ensure_exists(&mut conn, "resumes", resume_id, "Resume").await?;
        }

        let now = Utc::now();
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            r#"
            INSERT INTO applications (job_id, resume_id, status, applied_at, match_score, notes, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?4)
            RETURNING {APPLICATION_COLUMNS}
            "#
        ))
        .bind(new.job_id)
        .bind(new.resume_id)
        .bind(new.status.as_str())
        .bind(now)
        .bind(new.match_score)
        .bind(&new.notes)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;

        tracing::info!(application_id = row.id, job_id = new.job_id, "Application created");
        row.try_into()
    }

    pub async fn get_application(&self, id: i64) -> Result<Option<Application>, AppError> {
        let mut conn = self.conn().await?;
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;

        row.map(Application::try_from).transpose()
    }

    /// Apply a partial update. `updated_at` is refreshed on every call.
    pub async fn update_application(&self, id: i64, update: &ApplicationUpdate) -> Result<Application, AppError> {
        update.validate()?;

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE applications SET updated_at = ");
        qb.push_bind(Utc::now());
        if let Some(status) = update.status {
            qb.push(", status = ").push_bind(status.as_str());
        }
        if let Some(notes) = &update.notes {
            qb.push(", notes = ").push_bind(notes.clone());
        }
        if let Some(score) = update.match_score {
            qb.push(", match_score = ").push_bind(score);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {APPLICATION_COLUMNS}"));

        let mut conn = self.conn().await?;
        let row = qb
            .build_query_as::<ApplicationRow>()
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?
            .ok_or_else(|| AppError::NotFound(format!("Application {id}")))?;

        tracing::info!(application_id = id, status = %row.status, "Application updated");
        row.try_into()
    }

    /// Applications joined with their postings, most recently applied first.
    pub async fn list_applications(
        &self,
        status: Option<ApplicationStatus>,
        limit: usize,
    ) -> Result<Vec<ApplicationView>, AppError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT a.id, a.job_id, a.resume_id, a.status, a.applied_at, a.match_score, a.notes, a.updated_at, \
             j.title AS job_title, j.company, j.location \
             FROM applications a JOIN jobs j ON j.id = a.job_id",
        );
        if let Some(status) = status {
            qb.push(" WHERE a.status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY a.applied_at DESC, a.id DESC LIMIT ")
            .push_bind(limit as i64);

        let mut conn = self.conn().await?;
        let rows = qb
            .build_query_as::<ApplicationViewRow>()
            .fetch_all(&mut *conn)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(ApplicationView::try_from).collect()
    }

    pub async fn delete_application(&self, id: i64) -> Result<(), AppError> {
        let mut conn = self.conn().await?;
        let result = sqlx::query("DELETE FROM applications WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Application {id}")));
        }
        Ok(())
    }

    /// Store resume metadata. The file itself is managed by the caller.
    pub async fn create_resume(&self, new: &NewResume) -> Result<Resume, AppError> {
        let mut conn = self.conn().await?;
        let row = sqlx::query_as::<_, ResumeRow>(
            r#"
            INSERT INTO resumes (filename, file_path, file_type, content, uploaded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id, filename, file_path, file_type, uploaded_at
            "#,
        )
        .bind(&new.filename)
        .bind(&new.file_path)
        .bind(&new.file_type)
        .bind(&new.content)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;

        Ok(row.into())
    }

    pub async fn list_resumes(&self) -> Result<Vec<Resume>, AppError> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, ResumeRow>(
            "SELECT id, filename, file_path, file_type, uploaded_at FROM resumes ORDER BY uploaded_at DESC, id DESC",
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Remove a resume. Applications that referenced it keep their row.
    pub async fn delete_resume(&self, id: i64) -> Result<(), AppError> {
        let mut conn = self.conn().await?;
        let result = sqlx::query("DELETE FROM resumes WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Resume {id}")));
        }
        Ok(())
    }
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    id: i64,
    job_id: i64,
    resume_id: Option<i64>,
    status: String,
    applied_at: DateTime<Utc>,
    match_score: Option<f64>,
    notes: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = AppError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        Ok(Application {
            id: row.id,
            job_id: row.job_id,
            resume_id: row.resume_id,
            status: row.status.parse().map_err(AppError::DatabaseError)?,
            applied_at: row.applied_at,
            match_score: row.match_score,
            notes: row.notes,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ApplicationViewRow {
    #[sqlx(flatten)]
    application: ApplicationRow,
    job_title: String,
    company: String,
    location: Option<String>,
}

impl TryFrom<ApplicationViewRow> for ApplicationView {
    type Error = AppError;

    fn try_from(row: ApplicationViewRow) -> Result<Self, Self::Error> {
        Ok(ApplicationView {
            application: row.application.try_into()?,
            job_title: row.job_title,
            company: row.company,
            location: row.location,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ResumeRow {
    id: i64,
    filename: String,
    file_path: String,
    file_type: String,
    uploaded_at: DateTime<Utc>,
}

impl From<ResumeRow> for Resume {
    fn from(row: ResumeRow) -> Self {
        Resume {
            id: row.id,
            filename: row.filename,
            file_path: row.file_path,
            file_type: row.file_type,
            uploaded_at: row.uploaded_at,
        }
    }
}
