use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::listing::{self, ListingError, ListingPage, Query, ALL};
use crate::models::{generate_id, Company, CompanyList, Note, SavedSearch, SearchFilters};
use crate::repository::{Collection, Repository, RepositoryError, RepositoryExt};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Listing(#[from] ListingError),
}

fn not_found(kind: &'static str, id: &str) -> WorkspaceError {
    WorkspaceError::NotFound {
        kind,
        id: id.to_string(),
    }
}

/// Document written by `export_list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListExport {
    pub list_name: String,
    pub description: String,
    pub exported_at: DateTime<Utc>,
    pub companies: Vec<Company>,
}

/// User-owned state (notes, lists, saved searches) over an injected repository.
pub struct Workspace<'a> {
    repo: &'a dyn Repository,
}

impl<'a> Workspace<'a> {
    pub fn new(repo: &'a dyn Repository) -> Self {
        Self { repo }
    }

    // --- Notes ---

    pub fn add_note(&self, company_id: &str, content: &str) -> Result<Note, WorkspaceError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(WorkspaceError::Empty("note"));
        }
        let note = Note {
            id: generate_id(),
            company_id: company_id.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        self.repo.put(Collection::Notes, &note.id, &note)?;
        debug!(company_id, note_id = %note.id, "added note");
        Ok(note)
    }

    /// Notes on a company, newest first.
    pub fn notes_for(&self, company_id: &str) -> Result<Vec<Note>, WorkspaceError> {
        let mut notes: Vec<Note> = self
            .repo
            .all::<Note>(Collection::Notes)?
            .into_iter()
            .filter(|n| n.company_id == company_id)
            .collect();
        notes.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(notes)
    }

    pub fn edit_note(&self, id: &str, content: &str) -> Result<Note, WorkspaceError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(WorkspaceError::Empty("note"));
        }
        let mut note: Note = self
            .repo
            .get(Collection::Notes, id)?
            .ok_or_else(|| not_found("note", id))?;
        note.content = content.to_string();
        self.repo.put(Collection::Notes, id, &note)?;
        Ok(note)
    }

    pub fn delete_note(&self, id: &str) -> Result<(), WorkspaceError> {
        if !self.repo.delete(Collection::Notes, id)? {
            return Err(not_found("note", id));
        }
        Ok(())
    }

    // --- Lists ---

    pub fn create_list(&self, name: &str, description: &str) -> Result<CompanyList, WorkspaceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WorkspaceError::Empty("list name"));
        }
        let list = CompanyList {
            id: generate_id(),
            name: name.to_string(),
            description: description.trim().to_string(),
            company_ids: Vec::new(),
            created_at: Utc::now(),
        };
        self.repo.put(Collection::Lists, &list.id, &list)?;
        debug!(list_id = %list.id, name = %list.name, "created list");
        Ok(list)
    }

    /// All lists, most recently created first.
    pub fn lists(&self) -> Result<Vec<CompanyList>, WorkspaceError> {
        Ok(self.repo.all(Collection::Lists)?)
    }

    pub fn get_list(&self, id: &str) -> Result<CompanyList, WorkspaceError> {
        self.repo
            .get(Collection::Lists, id)?
            .ok_or_else(|| not_found("list", id))
    }

    pub fn delete_list(&self, id: &str) -> Result<(), WorkspaceError> {
        if !self.repo.delete(Collection::Lists, id)? {
            return Err(not_found("list", id));
        }
        Ok(())
    }

    /// Returns false if the company was already on the list.
    pub fn add_to_list(&self, list_id: &str, company_id: &str) -> Result<bool, WorkspaceError> {
        let mut list = self.get_list(list_id)?;
        if list.company_ids.iter().any(|id| id == company_id) {
            return Ok(false);
        }
        list.company_ids.push(company_id.to_string());
        self.repo.put(Collection::Lists, list_id, &list)?;
        Ok(true)
    }

    /// Returns false if the company was not on the list.
    pub fn remove_from_list(&self, list_id: &str, company_id: &str) -> Result<bool, WorkspaceError> {
        let mut list = self.get_list(list_id)?;
        let before = list.company_ids.len();
        list.company_ids.retain(|id| id != company_id);
        if list.company_ids.len() == before {
            return Ok(false);
        }
        self.repo.put(Collection::Lists, list_id, &list)?;
        Ok(true)
    }

    /// Lists that contain `company_id`.
    pub fn lists_containing(&self, company_id: &str) -> Result<Vec<CompanyList>, WorkspaceError> {
        Ok(self
            .lists()?
            .into_iter()
            .filter(|l| l.company_ids.iter().any(|id| id == company_id))
            .collect())
    }

    /// Build the export document for a list, resolving members against
    /// `companies`. Members no longer in the collection are skipped.
    pub fn export_list(&self, list_id: &str, companies: &[Company]) -> Result<ListExport, WorkspaceError> {
        let list = self.get_list(list_id)?;
        let members = list
            .company_ids
            .iter()
            .filter_map(|id| companies.iter().find(|c| &c.id == id))
            .cloned()
            .collect();
        Ok(ListExport {
            list_name: list.name,
            description: list.description,
            exported_at: Utc::now(),
            companies: members,
        })
    }

    // --- Saved searches ---

    /// Save a search along with the number of companies it currently matches.
    pub fn save_search(
        &self,
        query: &str,
        filters: SearchFilters,
        companies: &[Company],
    ) -> Result<SavedSearch, WorkspaceError> {
        let mut search = SavedSearch {
            id: generate_id(),
            query: query.trim().to_string(),
            filters,
            created_at: Utc::now(),
            result_count: 0,
        };
        if search.query.is_empty() && search.filters == SearchFilters::default() {
            return Err(WorkspaceError::Empty("saved search"));
        }
        search.result_count = listing::list(companies, &search_to_query(&search, 1))?.total_matched;
        self.repo.put(Collection::SavedSearches, &search.id, &search)?;
        Ok(search)
    }

    pub fn saved_searches(&self) -> Result<Vec<SavedSearch>, WorkspaceError> {
        Ok(self.repo.all(Collection::SavedSearches)?)
    }

    pub fn delete_search(&self, id: &str) -> Result<(), WorkspaceError> {
        if !self.repo.delete(Collection::SavedSearches, id)? {
            return Err(not_found("saved search", id));
        }
        Ok(())
    }

    /// Re-run a saved search through the listing engine and refresh its count.
    pub fn run_search(
        &self,
        id: &str,
        companies: &[Company],
        page_size: usize,
    ) -> Result<ListingPage, WorkspaceError> {
        let mut search: SavedSearch = self
            .repo
            .get(Collection::SavedSearches, id)?
            .ok_or_else(|| not_found("saved search", id))?;
        let page = listing::list(companies, &search_to_query(&search, page_size))?;
        if page.total_matched != search.result_count {
            search.result_count = page.total_matched;
            self.repo.put(Collection::SavedSearches, id, &search)?;
        }
        Ok(page)
    }
}

/// The listing query a saved search stands for.
pub fn search_to_query(search: &SavedSearch, page_size: usize) -> Query {
    Query {
        search_text: search.query.clone(),
        industry_filter: search.filters.industry.clone().unwrap_or_else(|| ALL.to_string()),
        stage_filter: search.filters.stage.clone().unwrap_or_else(|| ALL.to_string()),
        page_size,
        ..Query::default()
    }
}

/// Download name for an exported list: `ai-infrastructure-1718000000000.json`.
pub fn export_file_name(list_name: &str) -> String {
    let slug = list_name
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    format!("{}-{}.json", slug, Utc::now().timestamp_millis())
}
