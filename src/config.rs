use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate, Utc};

use crate::models::evaluation_period;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub semester: String,
    pub school_year: String,
    pub fallback_cache_path: PathBuf,
    pub bind_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = get("DATABASE_URL")?;
        let max_connections = match std::env::var("DB_MAX_CONNECTIONS") {
            Ok(value) => value
                .parse()
                .with_context(|| format!("DB_MAX_CONNECTIONS must be a number, got '{value}'"))?,
            Err(_) => 5,
        };

        let today = Utc::now().date_naive();
        let semester =
            std::env::var("EVALUATION_SEMESTER").unwrap_or_else(|_| semester_for(today).to_string());
        let school_year =
            std::env::var("EVALUATION_SCHOOL_YEAR").unwrap_or_else(|_| school_year_for(today));

        let fallback_cache_path = std::env::var("FALLBACK_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".evaluation-cache.json"));
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        if !database_url.starts_with("postgres://") && !database_url.starts_with("postgresql://") {
            bail!("DATABASE_URL must be a postgres:// connection string");
        }
        if max_connections == 0 {
            bail!("DB_MAX_CONNECTIONS must be at least 1");
        }

        Ok(Self {
            database_url,
            max_connections,
            semester,
            school_year,
            fallback_cache_path,
            bind_addr,
        })
    }

    pub fn evaluation_period(&self) -> String {
        evaluation_period(&self.semester, &self.school_year)
    }
}

fn get(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Missing required env var: {key}"))
}

/// June to October is the first semester, November to March the second,
/// April and May the summer term.
pub fn semester_for(date: NaiveDate) -> &'static str {
    match date.month() {
        6..=10 => "1st Semester",
        11 | 12 | 1..=3 => "2nd Semester",
        _ => "Summer",
    }
}

/// School years start in June, e.g. "2025-2026" from June 2025 to May 2026.
pub fn school_year_for(date: NaiveDate) -> String {
    let start = if date.month() >= 6 {
        date.year()
    } else {
        date.year() - 1
    };
    format!("{}-{}", start, start + 1)
}
