// tests/ingest_config.rs
use fin_pulse::ingest::config::{
    builtin_queries, load_queries_default, load_queries_from, NewsQuery, ENV_PATH,
};
use std::{env, fs};

#[test]
fn parse_toml_and_json_paths() {
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("news_queries.toml");
    fs::write(
        &p_toml,
        r#"
queries = [
  { term = " Selic ", language = "pt" },
  { term = "", language = "pt" },
  { term = "NASDAQ", language = "EN" },
  { term = "NASDAQ", language = "en" },
]
"#,
    )
    .unwrap();
    let v = load_queries_from(&p_toml).unwrap();
    assert_eq!(
        v,
        vec![NewsQuery::new("Selic", "pt"), NewsQuery::new("NASDAQ", "en")]
    );

    let p_json = dir.path().join("news_queries.json");
    fs::write(&p_json, r#"[{"term": "Vale", "language": "pt"}]"#).unwrap();
    assert_eq!(
        load_queries_from(&p_json).unwrap(),
        vec![NewsQuery::new("Vale", "pt")]
    );
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // Isolate CWD so the repo's own config/ is not read.
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    env::remove_var(ENV_PATH);

    // 1) nothing on disk → built-ins
    assert_eq!(load_queries_default().unwrap(), builtin_queries());

    // 2) ./config/news_queries.toml
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(
        cfg_dir.join("news_queries.toml"),
        "[[queries]]\nterm = \"Copom\"\nlanguage = \"pt\"\n",
    )
    .unwrap();
    assert_eq!(
        load_queries_default().unwrap(),
        vec![NewsQuery::new("Copom", "pt")]
    );

    // 3) env var wins
    let p_env = tmp.path().join("custom.json");
    fs::write(&p_env, r#"[{"term": "stocks", "language": "en"}]"#).unwrap();
    env::set_var(ENV_PATH, p_env.display().to_string());
    assert_eq!(
        load_queries_default().unwrap(),
        vec![NewsQuery::new("stocks", "en")]
    );

    // 4) env var pointing nowhere is an error, not a silent fallback
    env::set_var(ENV_PATH, tmp.path().join("missing.toml").display().to_string());
    assert!(load_queries_default().is_err());
    env::remove_var(ENV_PATH);

    env::set_current_dir(&old).unwrap();
}
