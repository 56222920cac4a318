use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::models::{Company, EnrichmentResult};
use crate::repository::{Collection, Repository, RepositoryError, RepositoryExt};
use crate::seed;

pub struct Database {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Database {
    /// Open the database at `path`. `:memory:` gives a private in-memory one.
    pub fn open(path: &Path) -> Result<Self> {
        if path.as_os_str() == ":memory:" {
            return Self::open_in_memory();
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        debug!(path = %path.display(), "opened database");
        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn init(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS companies (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                industry TEXT NOT NULL,
                stage TEXT NOT NULL,
                founded INTEGER NOT NULL,
                location TEXT NOT NULL DEFAULT '',
                website TEXT NOT NULL DEFAULT '',
                employees INTEGER NOT NULL DEFAULT 0 CHECK (employees >= 0),
                total_funding INTEGER NOT NULL DEFAULT 0 CHECK (total_funding >= 0),
                last_funding_date TEXT NOT NULL,
                signals TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (collection, id)
            );

            CREATE TABLE IF NOT EXISTS enrichments (
                company_id TEXT PRIMARY KEY REFERENCES companies(id),
                body TEXT NOT NULL,
                enriched_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection, seq);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='companies'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!(
                "Database not initialized. Run 'scout init' first."
            ));
        }
        Ok(())
    }

    /// Load the built-in companies, lists and saved searches into an empty
    /// database. Collections that already hold data are left alone.
    pub fn seed(&self) -> Result<SeedStats> {
        let mut stats = SeedStats::default();

        if self.count_companies()? == 0 {
            for company in seed::mock_companies() {
                self.upsert_company(&company)?;
                stats.companies += 1;
            }
        }

        // inserted oldest first so the newest-first listing matches the seed order
        if self.all_raw(Collection::Lists)?.is_empty() {
            for list in seed::default_lists().iter().rev() {
                self.put(Collection::Lists, &list.id, list)?;
                stats.lists += 1;
            }
        }
        if self.all_raw(Collection::SavedSearches)?.is_empty() {
            for search in seed::default_saved_searches().iter().rev() {
                self.put(Collection::SavedSearches, &search.id, search)?;
                stats.saved_searches += 1;
            }
        }

        info!(
            companies = stats.companies,
            lists = stats.lists,
            saved_searches = stats.saved_searches,
            "seeded database"
        );
        Ok(stats)
    }

    // --- Company operations ---

    pub fn count_companies(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM companies", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn upsert_company(&self, company: &Company) -> Result<()> {
        let signals = serde_json::to_string(&company.signals)?;
        let employees = i64::try_from(company.employees)
            .with_context(|| format!("Employee count of company #{} is too large", company.id))?;
        let total_funding = i64::try_from(company.total_funding)
            .with_context(|| format!("Total funding of company #{} is too large", company.id))?;
        self.conn().execute(
            "INSERT INTO companies (id, name, description, industry, stage, founded, location,
                                    website, employees, total_funding, last_funding_date, signals)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                industry = excluded.industry,
                stage = excluded.stage,
                founded = excluded.founded,
                location = excluded.location,
                website = excluded.website,
                employees = excluded.employees,
                total_funding = excluded.total_funding,
                last_funding_date = excluded.last_funding_date,
                signals = excluded.signals",
            params![
                company.id,
                company.name,
                company.description,
                company.industry,
                company.stage,
                company.founded,
                company.location,
                company.website,
                employees,
                total_funding,
                company.last_funding_date.format("%Y-%m-%d").to_string(),
                signals,
            ],
        )?;
        Ok(())
    }

    /// Every company, in the order they were added.
    pub fn list_companies(&self) -> Result<Vec<Company>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, industry, stage, founded, location, website,
                    employees, total_funding, last_funding_date, signals
             FROM companies ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], Self::row_to_company)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list companies")
    }

    pub fn get_company(&self, id: &str) -> Result<Option<Company>> {
        self.conn()
            .query_row(
                "SELECT id, name, description, industry, stage, founded, location, website,
                        employees, total_funding, last_funding_date, signals
                 FROM companies WHERE id = ?1",
                [id],
                Self::row_to_company,
            )
            .optional()
            .context("Failed to load company")
    }

    /// Find the company whose website is `url`, ignoring case and a trailing slash.
    pub fn company_by_website(&self, url: &str) -> Result<Option<Company>> {
        let wanted = url.trim().trim_end_matches('/');
        self.conn()
            .query_row(
                "SELECT id, name, description, industry, stage, founded, location, website,
                        employees, total_funding, last_funding_date, signals
                 FROM companies WHERE LOWER(RTRIM(website, '/')) = LOWER(?1)",
                [wanted],
                Self::row_to_company,
            )
            .optional()
            .context("Failed to look up company by website")
    }

    fn row_to_company(row: &rusqlite::Row) -> rusqlite::Result<Company> {
        let date: String = row.get(10)?;
        let last_funding_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let signals: String = row.get(11)?;
        let signals = serde_json::from_str(&signals).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Company {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            industry: row.get(3)?,
            stage: row.get(4)?,
            founded: row.get(5)?,
            location: row.get(6)?,
            website: row.get(7)?,
            employees: Self::unsigned(row, 8)?,
            total_funding: Self::unsigned(row, 9)?,
            last_funding_date,
            signals,
        })
    }

    fn unsigned(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<u64> {
        let value: i64 = row.get(idx)?;
        u64::try_from(value).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, Box::new(e))
        })
    }

    // --- Enrichment cache ---

    /// Remember the latest successful enrichment for a company.
    pub fn save_enrichment(&self, company_id: &str, result: &EnrichmentResult) -> Result<()> {
        let body = serde_json::to_string(result)?;
        self.conn().execute(
            "INSERT INTO enrichments (company_id, body, enriched_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(company_id) DO UPDATE SET body = excluded.body, enriched_at = excluded.enriched_at",
            params![company_id, body, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn latest_enrichment(
        &self,
        company_id: &str,
    ) -> Result<Option<(EnrichmentResult, DateTime<Utc>)>> {
        let row: Option<(String, String)> = self
            .conn()
            .query_row(
                "SELECT body, enriched_at FROM enrichments WHERE company_id = ?1",
                [company_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((body, enriched_at)) = row else {
            return Ok(None);
        };
        let result = serde_json::from_str(&body)
            .with_context(|| format!("Stored enrichment for company {} is corrupt", company_id))?;
        let enriched_at = DateTime::parse_from_rfc3339(&enriched_at)
            .with_context(|| format!("Bad enrichment timestamp '{}'", enriched_at))?
            .with_timezone(&Utc);
        Ok(Some((result, enriched_at)))
    }
}

impl Repository for Database {
    fn get_raw(&self, collection: Collection, id: &str) -> Result<Option<String>, RepositoryError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT body FROM records WHERE collection = ?1 AND id = ?2",
                params![collection.key(), id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn put_raw(&self, collection: Collection, id: &str, body: &str) -> Result<(), RepositoryError> {
        self.conn().execute(
            "INSERT INTO records (collection, id, body) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body, updated_at = datetime('now')",
            params![collection.key(), id, body],
        )?;
        Ok(())
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<bool, RepositoryError> {
        let removed = self.conn().execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![collection.key(), id],
        )?;
        Ok(removed > 0)
    }

    fn all_raw(&self, collection: Collection) -> Result<Vec<(String, String)>, RepositoryError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, body FROM records WHERE collection = ?1 ORDER BY seq DESC")?;
        let rows = stmt.query_map([collection.key()], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedStats {
    pub companies: usize,
    pub lists: usize,
    pub saved_searches: usize,
}
