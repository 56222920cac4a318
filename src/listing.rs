use icu_collator::{Collator, CollatorOptions, Strength};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::models::Company;

/// Filter value meaning "no filter".
pub const ALL: &str = "all";

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListingError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Columns a listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Id,
    Name,
    Description,
    Industry,
    Stage,
    Founded,
    Location,
    Website,
    Employees,
    TotalFunding,
    LastFundingDate,
    Signals,
}

impl SortField {
    pub const FIELDS: [SortField; 12] = [
        SortField::Id,
        SortField::Name,
        SortField::Description,
        SortField::Industry,
        SortField::Stage,
        SortField::Founded,
        SortField::Location,
        SortField::Website,
        SortField::Employees,
        SortField::TotalFunding,
        SortField::LastFundingDate,
        SortField::Signals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Name => "name",
            SortField::Description => "description",
            SortField::Industry => "industry",
            SortField::Stage => "stage",
            SortField::Founded => "founded",
            SortField::Location => "location",
            SortField::Website => "website",
            SortField::Employees => "employees",
            SortField::TotalFunding => "totalFunding",
            SortField::LastFundingDate => "lastFundingDate",
            SortField::Signals => "signals",
        }
    }

    /// Ascending comparison of two companies on this field.
    fn compare(&self, a: &Company, b: &Company) -> Ordering {
        match self {
            SortField::Id => collate(&a.id, &b.id),
            SortField::Name => collate(&a.name, &b.name),
            SortField::Description => collate(&a.description, &b.description),
            SortField::Industry => collate(&a.industry, &b.industry),
            SortField::Stage => collate(&a.stage, &b.stage),
            SortField::Location => collate(&a.location, &b.location),
            SortField::Website => collate(&a.website, &b.website),
            SortField::Founded => a.founded.cmp(&b.founded),
            SortField::Employees => a.employees.cmp(&b.employees),
            SortField::TotalFunding => a.total_funding.cmp(&b.total_funding),
            SortField::LastFundingDate => a.last_funding_date.cmp(&b.last_funding_date),
            // Tag lists have no ordering; the sort keeps input order.
            SortField::Signals => Ordering::Equal,
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = ListingError;

    // Accepts the wire name ("totalFunding") and the snake_case spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('_', "").to_lowercase();
        SortField::FIELDS
            .into_iter()
            .find(|field| field.as_str().to_lowercase() == wanted)
            .ok_or_else(|| {
                ListingError::InvalidQuery(format!(
                    "unknown sort field '{}'. Available: {}",
                    s,
                    SortField::FIELDS.map(|f| f.as_str()).join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = ListingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            other => Err(ListingError::InvalidQuery(format!(
                "unknown sort direction '{}'. Use asc or desc",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub search_text: String,
    pub industry_filter: String,
    pub stage_filter: String,
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
    pub page: usize,
    pub page_size: usize,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            search_text: String::new(),
            industry_filter: ALL.to_string(),
            stage_filter: ALL.to_string(),
            sort_field: SortField::Name,
            sort_direction: SortDirection::Asc,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Query {
    fn matches(&self, company: &Company, needle: &str) -> bool {
        let matches_search = needle.is_empty()
            || company.name.to_lowercase().contains(needle)
            || company.description.to_lowercase().contains(needle);
        let matches_industry =
            self.industry_filter == ALL || company.industry == self.industry_filter;
        let matches_stage = self.stage_filter == ALL || company.stage == self.stage_filter;
        matches_search && matches_industry && matches_stage
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    pub items: Vec<Company>,
    pub total_matched: usize,
    pub page: usize,
    pub total_pages: usize,
}

/// Filter, sort and paginate `companies` according to `query`.
///
/// The input slice is never reordered; matching companies are cloned into the
/// returned page. Requested pages outside `1..=total_pages` are clamped rather
/// than rejected. An empty match set reports `total_pages == 0` and `page == 1`.
pub fn list(companies: &[Company], query: &Query) -> Result<ListingPage, ListingError> {
    if query.page_size == 0 {
        return Err(ListingError::InvalidQuery(
            "page size must be greater than zero".to_string(),
        ));
    }

    let needle = query.search_text.to_lowercase();
    let mut matched: Vec<&Company> = companies
        .iter()
        .filter(|c| query.matches(c, &needle))
        .collect();

    // sort_by is stable; equal keys keep their input order in both directions
    matched.sort_by(|a, b| {
        let ord = query.sort_field.compare(a, b);
        match query.sort_direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });

    let total_matched = matched.len();
    let total_pages = total_matched.div_ceil(query.page_size);
    let page = query.page.clamp(1, total_pages.max(1));
    let start = (page - 1) * query.page_size;

    let items = matched
        .into_iter()
        .skip(start)
        .take(query.page_size)
        .cloned()
        .collect();

    Ok(ListingPage {
        items,
        total_matched,
        page,
        total_pages,
    })
}

thread_local! {
    static COLLATOR: Option<Collator> = {
        let mut options = CollatorOptions::new();
        options.strength = Some(Strength::Tertiary);
        Collator::try_new(&Default::default(), options).ok()
    };
}

/// Root-locale collation: base letters first, then accents, then case
/// (lowercase first).
fn collate(a: &str, b: &str) -> Ordering {
    COLLATOR.with(|collator| match collator {
        Some(collator) => collator.compare(a, b),
        None => a
            .to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| b.cmp(a)),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Facets {
    pub industries: Vec<String>,
    pub stages: Vec<String>,
}

/// Filter choices offered for a collection: `"all"` then each distinct value
/// in first-seen order.
pub fn facets(companies: &[Company]) -> Facets {
    fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
        let mut out = vec![ALL.to_string()];
        for value in values {
            if !out.iter().any(|v| v == value) {
                out.push(value.to_string());
            }
        }
        out
    }

    Facets {
        industries: distinct(companies.iter().map(|c| c.industry.as_str())),
        stages: distinct(companies.iter().map(|c| c.stage.as_str())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::mock_companies;

    fn names(page: &ListingPage) -> Vec<&str> {
        page.items.iter().map(|c| c.name.as_str()).collect()
    }

    fn sample(n: usize) -> Vec<Company> {
        let base = mock_companies();
        (0..n)
            .map(|i| {
                let mut c = base[i % base.len()].clone();
                c.id = format!("c{}", i);
                c.employees = (i % 3) as u64;
                c
            })
            .collect()
    }

    #[test]
    fn test_search_ai_sorted_by_name() {
        let query = Query {
            search_text: "ai".to_string(),
            ..Query::default()
        };
        let page = list(&mock_companies(), &query).unwrap();
        assert_eq!(names(&page), vec!["Anthropic", "Glean"]);
        assert_eq!(page.total_matched, 2);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.page, 1);
    }

    #[test]
    fn test_sort_by_funding_descending() {
        let query = Query {
            sort_field: SortField::TotalFunding,
            sort_direction: SortDirection::Desc,
            page_size: 2,
            ..Query::default()
        };
        let page = list(&mock_companies(), &query).unwrap();
        assert_eq!(names(&page), vec!["Anthropic", "Rippling"]);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn test_funding_descending_within_hr_tech_and_series_d() {
        // Rippling (Series F) drops out once the stage filter applies
        let query = Query {
            stage_filter: "Series D".to_string(),
            sort_field: SortField::TotalFunding,
            sort_direction: SortDirection::Desc,
            page_size: 2,
            ..Query::default()
        };
        let page = list(&mock_companies(), &query).unwrap();
        assert_eq!(names(&page), vec!["Deel", "Glean"]);

        let query = Query {
            industry_filter: "HR Tech".to_string(),
            ..query
        };
        let page = list(&mock_companies(), &query).unwrap();
        assert_eq!(names(&page), vec!["Deel"]);
    }

    #[test]
    fn test_funding_scenario_without_rippling() {
        let companies: Vec<Company> = mock_companies()
            .into_iter()
            .filter(|c| c.name != "Rippling")
            .collect();
        let query = Query {
            sort_field: SortField::TotalFunding,
            sort_direction: SortDirection::Desc,
            page_size: 2,
            ..Query::default()
        };
        let page = list(&companies, &query).unwrap();
        assert_eq!(names(&page), vec!["Anthropic", "Deel"]);
    }

    #[test]
    fn test_filter_predicates() {
        let companies = mock_companies();
        let query = Query {
            search_text: "PLATFORM".to_string(),
            industry_filter: "HR Tech".to_string(),
            ..Query::default()
        };
        let page = list(&companies, &query).unwrap();
        assert_eq!(names(&page), vec!["Deel", "Rippling"]);

        for company in &companies {
            let hit = page.items.iter().any(|c| c.id == company.id);
            let expected = (company.name.to_lowercase().contains("platform")
                || company.description.to_lowercase().contains("platform"))
                && company.industry == "HR Tech";
            assert_eq!(hit, expected, "{}", company.name);
        }
    }

    #[test]
    fn test_exact_match_filters_are_case_sensitive() {
        let query = Query {
            industry_filter: "hr tech".to_string(),
            ..Query::default()
        };
        let page = list(&mock_companies(), &query).unwrap();
        assert!(page.items.is_empty());
    }

    #[test]
    fn test_sort_is_stable_in_both_directions() {
        let companies = sample(12);
        for direction in [SortDirection::Asc, SortDirection::Desc] {
            let query = Query {
                sort_field: SortField::Employees,
                sort_direction: direction,
                page_size: 100,
                ..Query::default()
            };
            let page = list(&companies, &query).unwrap();
            for pair in page.items.windows(2) {
                if pair[0].employees == pair[1].employees {
                    let a: usize = pair[0].id[1..].parse().unwrap();
                    let b: usize = pair[1].id[1..].parse().unwrap();
                    assert!(a < b, "equal keys swapped: {} {}", pair[0].id, pair[1].id);
                }
            }
        }
    }

    #[test]
    fn test_pagination_is_complete() {
        let companies = sample(23);
        let mut query = Query {
            sort_field: SortField::Name,
            page_size: 5,
            ..Query::default()
        };
        let all = list(
            &companies,
            &Query {
                page_size: 1000,
                ..query.clone()
            },
        )
        .unwrap();

        let first = list(&companies, &query).unwrap();
        assert_eq!(first.total_pages, 5);

        let mut stitched = Vec::new();
        for page in 1..=first.total_pages {
            query.page = page;
            stitched.extend(list(&companies, &query).unwrap().items);
        }
        assert_eq!(stitched, all.items);
    }

    #[test]
    fn test_page_is_clamped() {
        let companies = sample(23);
        let query = Query {
            page: 9999,
            page_size: 5,
            ..Query::default()
        };
        let page = list(&companies, &query).unwrap();
        assert_eq!(page.page, 5);
        assert_eq!(page.items.len(), 3);

        let page = list(&companies, &Query { page: 0, ..query }).unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.items.len(), 5);
    }

    #[test]
    fn test_empty_collection() {
        let page = list(&[], &Query::default()).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total_matched, 0);
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.page, 1);
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        let query = Query {
            page_size: 0,
            ..Query::default()
        };
        assert!(matches!(
            list(&mock_companies(), &query),
            Err(ListingError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_listing_is_idempotent_and_leaves_input_alone() {
        let companies = mock_companies();
        let before = companies.clone();
        let query = Query {
            sort_field: SortField::LastFundingDate,
            sort_direction: SortDirection::Desc,
            ..Query::default()
        };
        let first = list(&companies, &query).unwrap();
        let second = list(&companies, &query).unwrap();
        assert_eq!(first, second);
        assert_eq!(companies, before);
        assert_eq!(first.items[0].name, "Vercel");
    }

    #[test]
    fn test_sort_field_parsing() {
        assert_eq!("totalFunding".parse::<SortField>().unwrap(), SortField::TotalFunding);
        assert_eq!("total_funding".parse::<SortField>().unwrap(), SortField::TotalFunding);
        assert_eq!("Name".parse::<SortField>().unwrap(), SortField::Name);
        assert_eq!("signals".parse::<SortField>().unwrap(), SortField::Signals);
        assert!(matches!(
            "followers".parse::<SortField>(),
            Err(ListingError::InvalidQuery(_))
        ));
        assert!("sideways".parse::<SortDirection>().is_err());
    }

    #[test]
    fn test_collate_orders_by_base_letter_then_case() {
        assert_eq!(collate("apple", "Banana"), Ordering::Less);
        assert_eq!(collate("Zebra", "apple"), Ordering::Greater);
        assert_eq!(collate("deel", "Deel"), Ordering::Less);
        assert_eq!(collate("Deel", "Deel"), Ordering::Equal);
        assert_eq!(collate("Étoile", "Zeta"), Ordering::Less);
        assert_eq!(collate("éclair", "Ecole"), Ordering::Less);
    }

    #[test]
    fn test_accented_names_sort_with_their_base_letter() {
        let mut companies = mock_companies();
        companies[0].name = "Élan".to_string();
        let page = list(&companies, &Query::default()).unwrap();
        assert_eq!(names(&page), vec!["Deel", "Élan", "Glean", "Rippling", "Vercel"]);
    }

    #[test]
    fn test_sort_by_signals_keeps_input_order() {
        let companies = mock_companies();
        for direction in [SortDirection::Asc, SortDirection::Desc] {
            let query = Query {
                sort_field: SortField::Signals,
                sort_direction: direction,
                ..Query::default()
            };
            let page = list(&companies, &query).unwrap();
            assert_eq!(
                names(&page),
                vec!["Anthropic", "Rippling", "Vercel", "Glean", "Deel"]
            );
        }
    }

    #[test]
    fn test_facets_first_seen_order() {
        let facets = facets(&mock_companies());
        assert_eq!(
            facets.industries,
            vec![
                "all",
                "Artificial Intelligence",
                "HR Tech",
                "Developer Tools",
                "Enterprise Software"
            ]
        );
        assert_eq!(facets.stages, vec!["all", "Series C", "Series F", "Series D"]);
    }
}
