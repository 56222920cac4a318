use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    pub name: String,
    pub description: String,
    pub industry: String,
    pub stage: String, // "Seed", "Series A", ...
    pub founded: i32,
    pub location: String,
    pub website: String,
    pub employees: u64,
    pub total_funding: u64,
    pub last_funding_date: NaiveDate,
    #[serde(default)]
    pub signals: Vec<String>, // detection order
}

impl Company {
    /// Funding as shown in tables: `$1.8B`, `$630M`, `$250000`.
    pub fn funding_display(&self) -> String {
        let amount = self.total_funding as f64;
        if amount >= 1e9 {
            format!("${:.1}B", amount / 1e9)
        } else if amount >= 1e6 {
            format!("${:.0}M", amount / 1e6)
        } else {
            format!("${}", self.total_funding)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub url: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentResult {
    pub summary: String,
    pub what_they_do: Vec<String>,
    pub keywords: Vec<String>,
    pub derived_signals: Vec<String>,
    pub sources: Vec<Source>,
}

impl EnrichmentResult {
    /// Keep the first occurrence of each keyword, compared case-insensitively.
    pub fn dedup_keywords(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.keywords
            .retain(|keyword| seen.insert(keyword.trim().to_lowercase()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub company_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyList {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub company_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSearch {
    pub id: String,
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    pub created_at: DateTime<Utc>,
    pub result_count: usize,
}

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Record id derived from the current time in milliseconds.
///
/// Strictly increasing within the process, so two records created in the
/// same millisecond still get distinct ids.
pub fn generate_id() -> String {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_ID.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_ID.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next.to_string(),
            Err(actual) => last = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_is_unique_and_increasing() {
        let ids: Vec<i64> = (0..100)
            .map(|_| generate_id().parse().unwrap())
            .collect();
        for pair in ids.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_company_wire_format() {
        let json = r#"{
            "id": "9",
            "name": "Acme",
            "description": "Anvils",
            "industry": "Hardware",
            "stage": "Seed",
            "founded": 2020,
            "location": "Remote",
            "website": "https://acme.test",
            "employees": 12,
            "totalFunding": 4000000,
            "lastFundingDate": "2024-03-01"
        }"#;
        let company: Company = serde_json::from_str(json).unwrap();
        assert_eq!(company.total_funding, 4_000_000);
        assert_eq!(company.last_funding_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert!(company.signals.is_empty());

        let value = serde_json::to_value(&company).unwrap();
        assert_eq!(value["lastFundingDate"], "2024-03-01");
        assert_eq!(value["totalFunding"], 4_000_000);
    }

    #[test]
    fn test_funding_display() {
        let mut company = crate::seed::mock_companies().remove(0);
        assert_eq!(company.funding_display(), "$1.8B");
        company.total_funding = 630_000_000;
        assert_eq!(company.funding_display(), "$630M");
        company.total_funding = 250_000;
        assert_eq!(company.funding_display(), "$250000");
    }

    #[test]
    fn test_dedup_keywords_keeps_first() {
        let mut result = EnrichmentResult {
            summary: "s".to_string(),
            what_they_do: vec![],
            keywords: vec!["AI".into(), "research".into(), "ai".into(), "Research ".into()],
            derived_signals: vec![],
            sources: vec![],
        };
        result.dedup_keywords();
        assert_eq!(result.keywords, vec!["AI".to_string(), "research".to_string()]);
    }

    #[test]
    fn test_saved_search_filters_are_optional() {
        let json = r#"{"id":"1","query":"climate tech","filters":{"industry":"CleanTech"},
            "createdAt":"2024-02-10T00:00:00Z","resultCount":8}"#;
        let search: SavedSearch = serde_json::from_str(json).unwrap();
        assert_eq!(search.filters.industry.as_deref(), Some("CleanTech"));
        assert_eq!(search.filters.stage, None);
    }
}
