//! Postgres-backed repositories.
//!
//! Records are stored as JSONB snapshots next to the handful of columns that
//! queries filter on. Two guarantees are pushed down to the database:
//!
//! | guarantee | mechanism |
//! |---|---|
//! | invoice counter handed out once | `UPDATE ... SET invoice_counter = invoice_counter + 1 RETURNING` (row lock) |
//! | invoice number unique per company | `UNIQUE (company_id, invoice_number)` |
//!
//! SQLx errors map to `RepositoryError`: unique violations (`23505`) on the
//! invoice-number constraint become `DuplicateInvoiceNumber`, other unique
//! violations `Conflict`, everything else `Storage`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::instrument;

use construcbill_billing::{BillingPackage, PackageId};
use construcbill_core::{AggregateRoot, ExpectedVersion};
use construcbill_parties::{Client, ClientId, Company, CompanyId};
use construcbill_projects::{Project, ProjectId};

use super::{ClientRepository, CompanyRepository, PackageFilter, PackageRepository, ProjectRepository};
use crate::error::RepositoryError;

const INVOICE_NUMBER_CONSTRAINT: &str = "billing_packages_invoice_number_unique";

/// Create tables and indexes if they are missing.
pub async fn run_migrations(pool: &PgPool) -> Result<(), RepositoryError> {
    sqlx::raw_sql(include_str!("../../migrations/0001_init.sql"))
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("migrate", e, None))?;
    Ok(())
}

fn map_sqlx_error(operation: &str, err: sqlx::Error, invoice_number: Option<&str>) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") if db_err.constraint() == Some(INVOICE_NUMBER_CONSTRAINT) => {
                    RepositoryError::DuplicateInvoiceNumber(
                        invoice_number.unwrap_or_default().to_string(),
                    )
                }
                Some("23505") => RepositoryError::Conflict(msg),
                _ => RepositoryError::Storage(msg),
            }
        }
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::PoolClosed => {
            RepositoryError::Storage(format!("connection pool closed in {}", operation))
        }
        other => RepositoryError::Storage(format!("sqlx error in {}: {}", operation, other)),
    }
}

fn from_document<T: serde::de::DeserializeOwned>(doc: JsonValue) -> Result<T, RepositoryError> {
    Ok(serde_json::from_value(doc)?)
}

#[derive(Debug, Clone)]
pub struct PostgresPackageRepository {
    pool: Arc<PgPool>,
}

impl PostgresPackageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl PackageRepository for PostgresPackageRepository {
    #[instrument(skip(self, pkg), fields(package_id = %pkg.id_typed()), err)]
    async fn create(&self, pkg: &BillingPackage) -> Result<(), RepositoryError> {
        let number = pkg.invoice().invoice_number();
        sqlx::query(
            r#"
            INSERT INTO billing_packages (
                id, project_id, company_id, invoice_number, status, version, created_at, document
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(pkg.id_typed().0.as_uuid())
        .bind(pkg.project_id().as_uuid())
        .bind(pkg.company_id().as_uuid())
        .bind(number)
        .bind(pkg.status().as_str())
        .bind(pkg.version() as i64)
        .bind(pkg.created_at())
        .bind(serde_json::to_value(pkg)?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_package", e, Some(number)))?;
        Ok(())
    }

    async fn get(&self, id: PackageId) -> Result<BillingPackage, RepositoryError> {
        let row = sqlx::query("SELECT document FROM billing_packages WHERE id = $1")
            .bind(id.0.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_package", e, None))?
            .ok_or(RepositoryError::NotFound)?;
        from_document(row.try_get("document").map_err(|e| map_sqlx_error("get_package", e, None))?)
    }

    async fn exists(&self, id: PackageId) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM billing_packages WHERE id = $1) AS found")
            .bind(id.0.as_uuid())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("package_exists", e, None))?;
        row.try_get("found").map_err(|e| map_sqlx_error("package_exists", e, None))
    }

    async fn list(&self, filter: PackageFilter) -> Result<Vec<BillingPackage>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT document
            FROM billing_packages
            WHERE ($1::uuid IS NULL OR project_id = $1)
              AND ($2::uuid IS NULL OR company_id = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(filter.project_id.map(|id| *id.as_uuid()))
        .bind(filter.company_id.map(|id| *id.as_uuid()))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_packages", e, None))?;

        rows.into_iter()
            .map(|row| {
                let doc: JsonValue = row
                    .try_get("document")
                    .map_err(|e| map_sqlx_error("list_packages", e, None))?;
                from_document(doc)
            })
            .collect()
    }

    #[instrument(skip(self, pkg), fields(package_id = %pkg.id_typed(), expected = ?expected), err)]
    async fn update(
        &self,
        pkg: &BillingPackage,
        expected: ExpectedVersion,
    ) -> Result<(), RepositoryError> {
        let expected_version = match expected {
            ExpectedVersion::Any => None,
            ExpectedVersion::Exact(v) => Some(v as i64),
        };
        let number = pkg.invoice().invoice_number();

        let result = sqlx::query(
            r#"
            UPDATE billing_packages
            SET project_id = $2,
                invoice_number = $3,
                status = $4,
                version = $5,
                document = $6
            WHERE id = $1 AND ($7::bigint IS NULL OR version = $7)
            "#,
        )
        .bind(pkg.id_typed().0.as_uuid())
        .bind(pkg.project_id().as_uuid())
        .bind(number)
        .bind(pkg.status().as_str())
        .bind(pkg.version() as i64)
        .bind(serde_json::to_value(pkg)?)
        .bind(expected_version)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_package", e, Some(number)))?;

        if result.rows_affected() == 0 {
            if self.exists(pkg.id_typed()).await? {
                return Err(RepositoryError::Conflict(format!(
                    "package {} was modified concurrently",
                    pkg.id_typed()
                )));
            }
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: PackageId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM billing_packages WHERE id = $1")
            .bind(id.0.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_package", e, None))?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PostgresCompanyRepository {
    pool: Arc<PgPool>,
}

impl PostgresCompanyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

/// Rebuild a company from its row; the columns are authoritative for the
/// counter and the default flag.
fn company_from_row(row: &sqlx::postgres::PgRow, counter_column: &str) -> Result<Company, RepositoryError> {
    let map = |e| map_sqlx_error("read_company", e, None);
    let mut doc: JsonValue = row.try_get("document").map_err(map)?;
    let counter: i64 = row.try_get(counter_column).map_err(map)?;
    let is_default: bool = row.try_get("is_default").map_err(map)?;

    doc["defaults"]["invoiceCounter"] = JsonValue::from(counter);
    doc["isDefault"] = JsonValue::from(is_default);
    from_document(doc)
}

#[async_trait]
impl CompanyRepository for PostgresCompanyRepository {
    async fn get(&self, id: CompanyId) -> Result<Company, RepositoryError> {
        let row = sqlx::query("SELECT document, invoice_counter, is_default FROM companies WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_company", e, None))?
            .ok_or(RepositoryError::NotFound)?;
        company_from_row(&row, "invoice_counter")
    }

    async fn list(&self) -> Result<Vec<Company>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT document, invoice_counter, is_default FROM companies ORDER BY created_at ASC",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_companies", e, None))?;
        rows.iter().map(|row| company_from_row(row, "invoice_counter")).collect()
    }

    async fn save(&self, company: &Company) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO companies (id, is_default, invoice_counter, document, created_at, updated_at)
            VALUES ($1, FALSE, $2, $3, $4, $5)
            ON CONFLICT (id)
            DO UPDATE SET
                document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(company.id.as_uuid())
        .bind(company.defaults.invoice_counter() as i64)
        .bind(serde_json::to_value(company)?)
        .bind(company.created_at)
        .bind(company.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_company", e, None))?;
        Ok(())
    }

    #[instrument(skip(self), fields(company_id = %id), err)]
    async fn set_default(&self, id: CompanyId) -> Result<(), RepositoryError> {
        let map = |e| map_sqlx_error("set_default_company", e, None);
        let mut tx = self.pool.begin().await.map_err(map)?;

        let row = sqlx::query("SELECT document FROM companies WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map)?
            .ok_or(RepositoryError::NotFound)?;
        let doc: JsonValue = row.try_get("document").map_err(map)?;
        if doc["isActive"] == JsonValue::Bool(false) {
            return Err(RepositoryError::Conflict(
                "an inactive company cannot be the default".to_string(),
            ));
        }

        sqlx::query("UPDATE companies SET is_default = FALSE WHERE is_default AND id <> $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map)?;
        sqlx::query("UPDATE companies SET is_default = TRUE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map)?;

        tx.commit().await.map_err(map)?;
        Ok(())
    }

    #[instrument(skip(self), fields(company_id = %id), err)]
    async fn increment_invoice_counter(
        &self,
        id: CompanyId,
    ) -> Result<(u64, Company), RepositoryError> {
        let row = sqlx::query(
            r#"
            UPDATE companies
            SET invoice_counter = invoice_counter + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING invoice_counter - 1 AS issued, document, is_default
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("increment_invoice_counter", e, None))?
        .ok_or(RepositoryError::NotFound)?;

        let company = company_from_row(&row, "issued")?;
        let issued = company.defaults.invoice_counter();
        Ok((issued, company))
    }
}

#[derive(Debug, Clone)]
pub struct PostgresClientRepository {
    pool: Arc<PgPool>,
}

impl PostgresClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl ClientRepository for PostgresClientRepository {
    async fn get(&self, id: ClientId) -> Result<Client, RepositoryError> {
        let row = sqlx::query("SELECT document FROM clients WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_client", e, None))?
            .ok_or(RepositoryError::NotFound)?;
        from_document(row.try_get("document").map_err(|e| map_sqlx_error("get_client", e, None))?)
    }

    async fn list(&self) -> Result<Vec<Client>, RepositoryError> {
        let rows = sqlx::query("SELECT document FROM clients ORDER BY name ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_clients", e, None))?;
        rows.into_iter()
            .map(|row| {
                let doc: JsonValue = row
                    .try_get("document")
                    .map_err(|e| map_sqlx_error("list_clients", e, None))?;
                from_document(doc)
            })
            .collect()
    }

    async fn insert(&self, client: &Client) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO clients (id, name, document, created_at) VALUES ($1, $2, $3, $4)")
            .bind(client.id.as_uuid())
            .bind(&client.name)
            .bind(serde_json::to_value(client)?)
            .bind(client.created_at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_client", e, None))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PostgresProjectRepository {
    pool: Arc<PgPool>,
}

impl PostgresProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl ProjectRepository for PostgresProjectRepository {
    async fn get(&self, id: ProjectId) -> Result<Project, RepositoryError> {
        let row = sqlx::query("SELECT document FROM projects WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_project", e, None))?
            .ok_or(RepositoryError::NotFound)?;
        from_document(row.try_get("document").map_err(|e| map_sqlx_error("get_project", e, None))?)
    }

    async fn list(&self, company_id: Option<CompanyId>) -> Result<Vec<Project>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT document
            FROM projects
            WHERE ($1::uuid IS NULL OR company_id = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(company_id.map(|id| *id.as_uuid()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_projects", e, None))?;
        rows.into_iter()
            .map(|row| {
                let doc: JsonValue = row
                    .try_get("document")
                    .map_err(|e| map_sqlx_error("list_projects", e, None))?;
                from_document(doc)
            })
            .collect()
    }

    async fn insert(&self, project: &Project) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, company_id, client_id, document, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(project.id.as_uuid())
        .bind(project.company_id.as_uuid())
        .bind(project.client_id.as_uuid())
        .bind(serde_json::to_value(project)?)
        .bind(project.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_project", e, None))?;
        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM projects")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_projects", e, None))?;
        let n: i64 = row.try_get("n").map_err(|e| map_sqlx_error("count_projects", e, None))?;
        Ok(n.max(0) as u64)
    }
}
