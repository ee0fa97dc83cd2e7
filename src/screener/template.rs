//! Named SQL templates loaded from JSON.
//!
//! ```json
//! { "queries": { "candidates": { "description": "...", "sql": "SELECT ... WHERE year = :year" } } }
//! ```
//!
//! `:name` placeholders are rewritten to positional `?` parameters; a name may
//! appear more than once and is bound once per occurrence.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::{Result, StockError};

const BUILTIN_TEMPLATES: &str = include_str!("../../queries/screener.json");

static NAMED_PARAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("Failed to compile named parameter regex")
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryTemplate {
    #[serde(default)]
    pub description: String,
    pub sql: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryTemplates {
    queries: BTreeMap<String, QueryTemplate>,
}

/// A value bound to a named parameter
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for TemplateValue {
    fn from(v: i64) -> Self {
        TemplateValue::Int(v)
    }
}

impl From<i32> for TemplateValue {
    fn from(v: i32) -> Self {
        TemplateValue::Int(v as i64)
    }
}

impl From<u32> for TemplateValue {
    fn from(v: u32) -> Self {
        TemplateValue::Int(v as i64)
    }
}

impl From<f64> for TemplateValue {
    fn from(v: f64) -> Self {
        TemplateValue::Real(v)
    }
}

impl From<&str> for TemplateValue {
    fn from(v: &str) -> Self {
        TemplateValue::Text(v.to_string())
    }
}

/// SQL with positional placeholders plus the parameter name for each one
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    pub sql: String,
    pub params: Vec<String>,
}

impl QueryTemplates {
    /// Templates shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_TEMPLATES)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
            .map_err(|e| StockError::Template(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let templates: QueryTemplates = serde_json::from_str(content)?;
        if let Some((name, _)) = templates.queries.iter().find(|(_, t)| t.sql.trim().is_empty()) {
            return Err(StockError::Template(format!("query {} has empty sql", name)));
        }
        Ok(templates)
    }

    pub fn get(&self, name: &str) -> Result<&QueryTemplate> {
        self.queries
            .get(name)
            .ok_or_else(|| StockError::Template(format!("no query named {}", name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.queries.keys().map(String::as_str)
    }

    pub fn prepare(&self, name: &str) -> Result<PreparedQuery> {
        Ok(prepare_sql(&self.get(name)?.sql))
    }
}

/// Rewrite `:name` placeholders into `?`, remembering their order
pub fn prepare_sql(sql: &str) -> PreparedQuery {
    let mut params = Vec::new();
    let rewritten = NAMED_PARAM.replace_all(sql, |caps: &Captures| {
        params.push(caps[1].to_string());
        "?"
    });

    PreparedQuery {
        sql: rewritten.into_owned(),
        params,
    }
}

impl PreparedQuery {
    /// Build a sqlx query with every placeholder bound from `values`
    pub fn bind<'q>(&'q self, values: &HashMap<&str, TemplateValue>) -> Result<Query<'q, Sqlite, SqliteArguments<'q>>> {
        let mut query = sqlx::query(&self.sql);
        for name in &self.params {
            let value = values
                .get(name.as_str())
                .ok_or_else(|| StockError::Template(format!("missing value for parameter :{}", name)))?;
            query = match value.clone() {
                TemplateValue::Int(v) => query.bind(v),
                TemplateValue::Real(v) => query.bind(v),
                TemplateValue::Text(v) => query.bind(v),
            };
        }
        Ok(query)
    }
}
