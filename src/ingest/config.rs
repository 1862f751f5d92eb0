// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_PATH: &str = "NEWS_QUERIES_PATH";

/// One news search: term + language ("pt", "en").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NewsQuery {
    pub term: String,
    pub language: String,
}

impl NewsQuery {
    pub fn new(term: &str, language: &str) -> Self {
        Self {
            term: term.to_string(),
            language: language.to_string(),
        }
    }

    /// Result key, `"<term>_<language>"`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.term, self.language)
    }
}

const BUILTIN_QUERIES: &[(&str, &str)] = &[
    ("economia", "pt"),
    ("inflação", "pt"),
    ("PIB", "pt"),
    ("Selic", "pt"),
    ("Copom", "pt"),
    ("bolsa", "pt"),
    ("ações", "pt"),
    ("criptomoedas", "pt"),
    ("bitcoin", "pt"),
    ("ethereum", "pt"),
    ("renda fixa", "pt"),
    ("tesouro direto", "pt"),
    ("dólar", "pt"),
    ("câmbio", "pt"),
    ("finance", "en"),
    ("economy", "en"),
    ("inflation", "en"),
    ("interest rate", "en"),
    ("Federal Reserve", "en"),
    ("NASDAQ", "en"),
    ("Dow Jones", "en"),
    ("S&P500", "en"),
    ("stocks", "en"),
    ("bitcoin", "en"),
    ("ethereum", "en"),
    ("cryptocurrency", "en"),
    ("Petrobras", "pt"),
    ("Vale", "pt"),
    ("Nubank", "pt"),
    ("Banco Central", "pt"),
    ("Amazon", "en"),
    ("Apple", "en"),
    ("JP Morgan", "en"),
    ("Goldman Sachs", "en"),
];

/// The built-in search list, in collection order.
pub fn builtin_queries() -> Vec<NewsQuery> {
    BUILTIN_QUERIES
        .iter()
        .map(|(t, l)| NewsQuery::new(t, l))
        .collect()
}

/// Load queries from an explicit path. Supports TOML or JSON formats.
pub fn load_queries_from(path: &Path) -> Result<Vec<NewsQuery>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading news queries from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_queries(&content, ext.as_str())
}

/// Load queries using env var + fallbacks:
/// 1) $NEWS_QUERIES_PATH
/// 2) config/news_queries.toml
/// 3) config/news_queries.json
/// 4) built-in list
pub fn load_queries_default() -> Result<Vec<NewsQuery>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_queries_from(&pb);
        } else {
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/news_queries.toml");
    if toml_p.exists() {
        return load_queries_from(&toml_p);
    }
    let json_p = PathBuf::from("config/news_queries.json");
    if json_p.exists() {
        return load_queries_from(&json_p);
    }
    Ok(builtin_queries())
}

fn parse_queries(s: &str, hint_ext: &str) -> Result<Vec<NewsQuery>> {
    let try_toml = hint_ext == "toml" || s.contains("[[queries]]") || s.contains("queries =");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported news query list format"))
}

fn parse_toml(s: &str) -> Result<Vec<NewsQuery>> {
    #[derive(Deserialize)]
    struct TomlQueries {
        queries: Vec<NewsQuery>,
    }
    let v: TomlQueries = toml::from_str(s)?;
    clean_list(v.queries)
}

fn parse_json(s: &str) -> Result<Vec<NewsQuery>> {
    let v: Vec<NewsQuery> = serde_json::from_str(s)?;
    clean_list(v)
}

/// Trim, drop blanks and duplicates; keeps first-seen order (it drives batching).
fn clean_list(items: Vec<NewsQuery>) -> Result<Vec<NewsQuery>> {
    let mut out: Vec<NewsQuery> = Vec::with_capacity(items.len());
    for it in items {
        let q = NewsQuery::new(it.term.trim(), &it.language.trim().to_ascii_lowercase());
        if q.term.is_empty() || q.language.is_empty() || out.contains(&q) {
            continue;
        }
        out.push(q);
    }
    if out.is_empty() {
        return Err(anyhow!("news query list is empty"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_list_has_unique_keys() {
        let qs = builtin_queries();
        assert_eq!(qs.len(), 34);
        let mut keys: Vec<String> = qs.iter().map(NewsQuery::key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 34);
        assert!(keys.contains(&"bitcoin_pt".to_string()));
        assert!(keys.contains(&"bitcoin_en".to_string()));
    }

    #[test]
    fn dedup_trim_and_formats_work() {
        let toml = r#"
[[queries]]
term = " Selic "
language = "PT"

[[queries]]
term = ""
language = "pt"

[[queries]]
term = "Selic"
language = "pt"
"#;
        let json = r#"[{"term": "stocks", "language": "en"}, {"term": " ", "language": "en"}]"#;
        assert_eq!(parse_toml(toml).unwrap(), vec![NewsQuery::new("Selic", "pt")]);
        assert_eq!(parse_json(json).unwrap(), vec![NewsQuery::new("stocks", "en")]);
    }

    #[test]
    fn empty_list_is_an_error() {
        assert!(parse_json("[]").is_err());
    }
}
