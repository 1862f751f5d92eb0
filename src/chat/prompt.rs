// src/chat/prompt.rs
use serde_json::Value;

pub const SYSTEM_PROMPT: &str = concat!(
    "You are a financial assistant specialised in economics, ",
    "investments and the Brazilian financial market."
);

/// Stored as the prompt of generated analyses.
pub const ANALYSIS_LABEL: &str = "Automatic financial analysis";

/// Analysis prompt over the latest quotes, indicators and news (JSON rows).
pub fn analysis_prompt(quotes: &[Value], indicators: &[Value], news: &[Value]) -> String {
    format!(
        "Analyse the following financial data and provide relevant insights.\n\n\
         Quotes:\n{}\n\n\
         Economic indicators:\n{}\n\n\
         Recent news:\n{}\n\n\
         Please provide:\n\
         1. A summary of the current economic situation\n\
         2. Trends observed in the quotes\n\
         3. Impact of the economic indicators\n\
         4. Analysis of the most relevant news\n\
         5. General recommendations for investors",
        compact(quotes),
        compact(indicators),
        compact(news),
    )
}

fn compact(rows: &[Value]) -> String {
    serde_json::to_string(rows).unwrap_or_else(|_| "[]".to_string())
}
