use crate::domain::company::Company;
use anyhow::{ensure, Context};
use std::collections::BTreeSet;
use std::path::Path;

/// Immutable company list loaded once at startup.
#[derive(Debug, Clone)]
pub struct CompanyCatalog {
    companies: Vec<Company>,
}

impl CompanyCatalog {
    pub fn new(companies: Vec<Company>) -> anyhow::Result<Self> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::with_capacity(companies.len());
        for company in companies {
            let symbol = company.symbol.trim().to_string();
            ensure!(!symbol.is_empty(), "company symbol must be non-empty");

            let name = company.name.trim().to_string();
            ensure!(!name.is_empty(), "company name must be non-empty (symbol={symbol})");

            ensure!(
                seen.insert(symbol.clone()),
                "duplicate company symbol: {symbol}"
            );
            out.push(Company { symbol, name });
        }
        Ok(Self { companies: out })
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let companies = serde_json::from_str::<Vec<Company>>(json)
            .context("company catalog is not a JSON array of {symbol, name}")?;
        Self::new(companies)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read company catalog {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("invalid company catalog {}", path.display()))
    }

    pub fn companies(&self) -> &[Company] {
        &self.companies
    }

    pub fn len(&self) -> usize {
        self.companies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.companies.iter().map(|c| c.symbol.as_str())
    }
}
