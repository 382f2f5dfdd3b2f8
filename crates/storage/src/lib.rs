mod memory;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{migrate::MigrateError, sqlite::SqlitePoolOptions, Row, SqlitePool};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use registry_core::{CompanyRecord, CompanyRepository, StoreError};

pub use memory::MemoryCompanyRepository;

/// SQLite extended result code for a violated UNIQUE constraint.
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

const COMPANY_COLUMNS: &str = "id, tax_id, fantasy_name, corporate_name, address, \
     employee_count, min_accessible_employee_count, created_at, updated_at";

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    ///
    /// In-memory databases live only as long as their connection, so they get
    /// a single connection that is never recycled.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a repository handle for company records.
    pub fn companies(&self) -> SqliteCompanyRepository {
        SqliteCompanyRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// Errors raised while opening or migrating the database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
}

/// SQLite-backed [`CompanyRepository`].
#[derive(Clone)]
pub struct SqliteCompanyRepository {
    pool: SqlitePool,
}

#[async_trait]
impl CompanyRepository for SqliteCompanyRepository {
    async fn create(&self, company: &CompanyRecord) -> Result<CompanyRecord, StoreError> {
        let id = Uuid::new_v4().to_string();

        let row = sqlx::query_as::<_, CompanyRow>(&format!(
            "INSERT INTO companies \
             (id, tax_id, fantasy_name, corporate_name, address, employee_count, min_accessible_employee_count, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {COMPANY_COLUMNS}"
        ))
        .bind(&id)
        .bind(&company.tax_id)
        .bind(&company.fantasy_name)
        .bind(&company.corporate_name)
        .bind(&company.address)
        .bind(company.employee_count)
        .bind(company.min_accessible_employee_count)
        .bind(to_rfc3339(company.created_at))
        .bind(to_rfc3339(company.updated_at))
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        debug!(stage = "storage", company_id = %row.id, "company inserted");
        Ok(row.into_domain())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<CompanyRecord>, StoreError> {
        let row = sqlx::query_as::<_, CompanyRow>(&format!(
            "SELECT {COMPANY_COLUMNS} FROM companies WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(row.map(CompanyRow::into_domain))
    }

    async fn get_by_tax_id(&self, tax_id: &str) -> Result<Option<CompanyRecord>, StoreError> {
        let row = sqlx::query_as::<_, CompanyRow>(&format!(
            "SELECT {COMPANY_COLUMNS} FROM companies WHERE tax_id = ?"
        ))
        .bind(tax_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(row.map(CompanyRow::into_domain))
    }

    async fn update(&self, company: &CompanyRecord) -> Result<CompanyRecord, StoreError> {
        let row = sqlx::query_as::<_, CompanyRow>(&format!(
            "UPDATE companies \
             SET tax_id = ?, \
                 fantasy_name = ?, \
                 corporate_name = ?, \
                 address = ?, \
                 employee_count = ?, \
                 min_accessible_employee_count = ?, \
                 updated_at = ? \
             WHERE id = ? \
             RETURNING {COMPANY_COLUMNS}"
        ))
        .bind(&company.tax_id)
        .bind(&company.fantasy_name)
        .bind(&company.corporate_name)
        .bind(&company.address)
        .bind(company.employee_count)
        .bind(company.min_accessible_employee_count)
        .bind(to_rfc3339(company.updated_at))
        .bind(&company.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?;

        row.map(CompanyRow::into_domain).ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM companies WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list(&self, page: u32, limit: u32) -> Result<Vec<CompanyRecord>, StoreError> {
        let offset = i64::from(page.max(1) - 1) * i64::from(limit);
        let rows = sqlx::query_as::<_, CompanyRow>(&format!(
            "SELECT {COMPANY_COLUMNS} FROM companies \
             ORDER BY created_at DESC, rowid DESC \
             LIMIT ? OFFSET ?"
        ))
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(rows.into_iter().map(CompanyRow::into_domain).collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM companies")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        let total: i64 = row.get("total");
        Ok(total as u64)
    }
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err)
            if db_err.code().as_deref() == Some(SQLITE_CONSTRAINT_UNIQUE) =>
        {
            StoreError::Duplicate
        }
        _ => StoreError::backend(err),
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CompanyRow {
    id: String,
    tax_id: String,
    fantasy_name: String,
    corporate_name: String,
    address: String,
    employee_count: i64,
    min_accessible_employee_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CompanyRow {
    fn into_domain(self) -> CompanyRecord {
        CompanyRecord {
            id: self.id,
            tax_id: self.tax_id,
            fantasy_name: self.fantasy_name,
            corporate_name: self.corporate_name,
            address: self.address,
            employee_count: self.employee_count,
            min_accessible_employee_count: self.min_accessible_employee_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
