use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::models::{Company, CompanyList, SavedSearch, SearchFilters};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn signals(tags: &[&str]) -> Vec<String> {
    tags.iter().map(|s| s.to_string()).collect()
}

#[allow(clippy::too_many_arguments)]
fn company(
    id: &str,
    name: &str,
    description: &str,
    industry: &str,
    stage: &str,
    founded: i32,
    location: &str,
    employees: u64,
    total_funding: u64,
    last_funding_date: NaiveDate,
    tags: &[&str],
) -> Company {
    Company {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        industry: industry.to_string(),
        stage: stage.to_string(),
        founded,
        location: location.to_string(),
        website: format!("https://{}.com", name.to_lowercase()),
        employees,
        total_funding,
        last_funding_date,
        signals: signals(tags),
    }
}

/// The built-in company collection used until a real data feed exists.
pub fn mock_companies() -> Vec<Company> {
    vec![
        company(
            "1",
            "Anthropic",
            "AI research and safety company building reliable, interpretable AI systems",
            "Artificial Intelligence",
            "Series C",
            2021,
            "San Francisco, CA",
            300,
            1_750_000_000,
            date(2023, 5, 23),
            &["recent_blog_post", "careers_page", "product_launch"],
        ),
        company(
            "2",
            "Rippling",
            "Employee management platform unifying payroll, benefits, and IT",
            "HR Tech",
            "Series F",
            2016,
            "San Francisco, CA",
            2000,
            1_200_000_000,
            date(2023, 11, 1),
            &["rapid_growth", "enterprise_clients", "changelog_active"],
        ),
        company(
            "3",
            "Vercel",
            "Frontend cloud platform for developers to build and deploy web applications",
            "Developer Tools",
            "Series D",
            2015,
            "San Francisco, CA",
            500,
            313_000_000,
            date(2023, 12, 5),
            &["open_source", "viral_product", "hiring_surge"],
        ),
        company(
            "4",
            "Glean",
            "AI-powered enterprise search and knowledge discovery platform",
            "Enterprise Software",
            "Series D",
            2019,
            "Palo Alto, CA",
            400,
            355_000_000,
            date(2023, 9, 12),
            &["ai_forward", "fortune_500_clients", "rapid_growth"],
        ),
        company(
            "5",
            "Deel",
            "Global payroll and compliance platform for remote teams",
            "HR Tech",
            "Series D",
            2019,
            "San Francisco, CA",
            2500,
            630_000_000,
            date(2023, 10, 24),
            &["global_scale", "hypergrowth", "product_expansion"],
        ),
    ]
}

/// Lists created on first run, before the user has made any.
pub fn default_lists() -> Vec<CompanyList> {
    vec![
        CompanyList {
            id: "1".to_string(),
            name: "AI Infrastructure".to_string(),
            description: "Companies building AI infrastructure and tooling".to_string(),
            company_ids: vec![],
            created_at: day(2024, 1, 15),
        },
        CompanyList {
            id: "2".to_string(),
            name: "Enterprise SaaS".to_string(),
            description: "Promising enterprise software startups".to_string(),
            company_ids: vec![],
            created_at: day(2024, 2, 1),
        },
    ]
}

pub fn default_saved_searches() -> Vec<SavedSearch> {
    vec![
        SavedSearch {
            id: "1".to_string(),
            query: "AI infrastructure".to_string(),
            filters: SearchFilters {
                industry: None,
                stage: Some("Series A".to_string()),
            },
            created_at: day(2024, 2, 15),
            result_count: 12,
        },
        SavedSearch {
            id: "2".to_string(),
            query: "climate tech".to_string(),
            filters: SearchFilters {
                industry: Some("CleanTech".to_string()),
                stage: None,
            },
            created_at: day(2024, 2, 10),
            result_count: 8,
        },
    ]
}
