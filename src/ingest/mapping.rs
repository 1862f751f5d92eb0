// src/ingest/mapping.rs
//! Upstream JSON → canonical records.
//!
//! Each entity has a declarative table of [`FieldSpec`]s listing, per
//! canonical field, the upstream names it may arrive under (first non-empty
//! candidate wins). A record either maps cleanly or is rejected with the
//! field that made it fail; nothing is filled with placeholder text.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::ingest::normalize_text;
use crate::model::{Bank, Indicator, IndicatorKind, NewsArticle, NewsOutlet, Quote};

/// Longest description/content kept per article (chars).
const TEXT_CAP: usize = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: &'static str,
    /// Upstream names, dotted for nested objects ("source.name").
    pub candidates: &'static [&'static str],
    pub required: bool,
}

const fn req(field: &'static str, candidates: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        field,
        candidates,
        required: true,
    }
}

const fn opt(field: &'static str, candidates: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        field,
        candidates,
        required: false,
    }
}

pub const QUOTE_FIELDS: &[FieldSpec] = &[
    req("code", &["code"]),
    req("codein", &["codein"]),
    opt("name", &["name"]),
    opt("high", &["high"]),
    opt("low", &["low"]),
    opt("varBid", &["varBid"]),
    opt("pctChange", &["pctChange"]),
    req("bid", &["bid"]),
    req("ask", &["ask"]),
    req("timestamp", &["timestamp"]),
];

pub const INDICATOR_FIELDS: &[FieldSpec] = &[
    req("value", &["valor", "value"]),
    opt("date", &["data", "date"]),
];

pub const BANK_FIELDS: &[FieldSpec] = &[
    req("ispb", &["ispb", "code", "codigo"]),
    req("name", &["name", "nome", "shortName"]),
    opt(
        "fullName",
        &["fullName", "nomeCompleto", "nome_completo", "name"],
    ),
    opt("code", &["code", "codigo"]),
];

pub const NEWS_FIELDS: &[FieldSpec] = &[
    req("title", &["title", "titulo"]),
    opt("description", &["description", "descricao"]),
    opt("content", &["content", "description", "descricao"]),
    req("url", &["url", "link"]),
    opt("urlToImage", &["urlToImage", "imagem"]),
    opt("author", &["author", "autor"]),
    req("publishedAt", &["publishedAt", "data"]),
    opt("source.id", &["source.id", "fonte.id"]),
    opt("source.name", &["source.name", "fonte.nome"]),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("missing required field `{0}`")]
    Missing(&'static str),
    #[error("field `{field}` is invalid: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl Rejection {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Rejection::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// A raw record bound to its field table.
struct Fields<'a> {
    raw: &'a Value,
    table: &'static [FieldSpec],
}

impl<'a> Fields<'a> {
    fn bind(raw: &'a Value, table: &'static [FieldSpec]) -> Result<Self, Rejection> {
        if !raw.is_object() {
            return Err(Rejection::NotAnObject);
        }
        let fields = Fields { raw, table };
        for spec in table.iter().filter(|s| s.required) {
            if fields.lookup(spec).is_none() {
                return Err(Rejection::Missing(spec.field));
            }
        }
        Ok(fields)
    }

    fn lookup(&self, spec: &FieldSpec) -> Option<&'a Value> {
        spec.candidates
            .iter()
            .filter_map(|path| path.split('.').try_fold(self.raw, |cur, seg| cur.get(seg)))
            .find(|v| !is_blank(v))
    }

    fn get(&self, field: &'static str) -> Option<&'a Value> {
        self.table
            .iter()
            .find(|s| s.field == field)
            .and_then(|s| self.lookup(s))
    }

    fn text(&self, field: &'static str) -> Option<String> {
        self.get(field).and_then(as_text)
    }

    fn required_text(&self, field: &'static str) -> Result<String, Rejection> {
        self.text(field).ok_or(Rejection::Missing(field))
    }

    fn number(&self, field: &'static str) -> Result<Option<f64>, Rejection> {
        match self.get(field) {
            None => Ok(None),
            Some(v) => as_number(v)
                .map(Some)
                .ok_or_else(|| Rejection::invalid(field, format!("not a number: {v}"))),
        }
    }

    fn required_number(&self, field: &'static str) -> Result<f64, Rejection> {
        self.number(field)?.ok_or(Rejection::Missing(field))
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numbers or numeric strings; a lone decimal comma ("13,25") is accepted.
pub fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<f64>()
                .ok()
                .or_else(|| s.replace(',', ".").parse::<f64>().ok())
                .filter(|n| n.is_finite())
        }
        _ => None,
    }
}

/// `dd/mm/yyyy`, ISO `yyyy-mm-dd` or a full RFC 3339 timestamp.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .ok()
        .or_else(|| parse_timestamp(s).map(|ts| ts.date_naive()))
}

/// RFC 3339, or a naive `yyyy-mm-dd hh:mm:ss` read as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|n| n.and_utc())
        })
}

pub fn quote_from(raw: &Value) -> Result<Quote, Rejection> {
    let f = Fields::bind(raw, QUOTE_FIELDS)?;
    let code = f.required_text("code")?;
    let codein = f.required_text("codein")?;
    let bid = f.required_number("bid")?;
    let ask = f.required_number("ask")?;
    let timestamp = f
        .get("timestamp")
        .and_then(as_number)
        .map(|n| n as i64)
        .ok_or_else(|| Rejection::invalid("timestamp", "expected unix seconds"))?;
    let create_date = Utc
        .timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| Rejection::invalid("timestamp", "out of range"))?;

    Ok(Quote {
        name: f
            .text("name")
            .unwrap_or_else(|| format!("{code}/{codein}")),
        high: f.number("high")?.unwrap_or(bid),
        low: f.number("low")?.unwrap_or(bid),
        var_bid: f.number("varBid")?.unwrap_or(0.0),
        pct_change: f.number("pctChange")?.unwrap_or(0.0),
        code,
        codein,
        bid,
        ask,
        timestamp,
        create_date,
    })
}

/// `today` stands in when the row carries no date (current-rate objects).
pub fn indicator_from(
    raw: &Value,
    kind: IndicatorKind,
    today: NaiveDate,
) -> Result<Indicator, Rejection> {
    let f = Fields::bind(raw, INDICATOR_FIELDS)?;
    let value = f.required_number("value")?;
    let date = match f.text("date") {
        None => today,
        Some(s) => parse_date(&s).ok_or_else(|| Rejection::invalid("date", s))?,
    };
    Ok(Indicator { kind, value, date })
}

pub fn bank_from(raw: &Value) -> Result<Bank, Rejection> {
    let f = Fields::bind(raw, BANK_FIELDS)?;
    let name = f.required_text("name")?;
    Ok(Bank {
        ispb: f.required_text("ispb")?,
        full_name: f.text("fullName").unwrap_or_else(|| name.clone()),
        name,
        code: f.text("code"),
    })
}

pub fn news_from(raw: &Value, query: &str, language: &str) -> Result<NewsArticle, Rejection> {
    let f = Fields::bind(raw, NEWS_FIELDS)?;
    let title = normalize_text(&f.required_text("title")?, TEXT_CAP);
    // NewsAPI blanks out articles pulled by the publisher.
    if title.is_empty() || title == "[Removed]" {
        return Err(Rejection::invalid("title", "article was removed upstream"));
    }
    let published = f.required_text("publishedAt")?;
    let published_at =
        parse_timestamp(&published).ok_or_else(|| Rejection::invalid("publishedAt", published))?;

    Ok(NewsArticle {
        title,
        description: f
            .text("description")
            .map(|s| normalize_text(&s, TEXT_CAP))
            .unwrap_or_default(),
        content: f
            .text("content")
            .map(|s| normalize_text(&s, TEXT_CAP))
            .unwrap_or_default(),
        url: f.required_text("url")?,
        url_to_image: f.text("urlToImage"),
        author: f.text("author"),
        published_at,
        source: NewsOutlet {
            id: f.text("source.id"),
            name: f.text("source.name").unwrap_or_else(|| "unknown".into()),
        },
        query: query.to_string(),
        language: language.to_string(),
    })
}
