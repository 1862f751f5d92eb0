// tests/collect_isolation.rs
//
// Full collection runs against stubbed upstreams: each flow fails on its own.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fin_pulse::ingest::config::NewsQuery;
use fin_pulse::ingest::providers::{build_http_client, AwesomeQuotes, BrasilApi, NewsApi};
use fin_pulse::ingest::retry::RetryPolicy;
use fin_pulse::ingest::Collector;
use fin_pulse::store::{Collection, DocumentStore, FileStore, MemoryStore, SharedStore};

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(10),
        batch_size: 5,
        batch_pause: Duration::from_millis(5),
    }
}

async fn mount_market_data(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/json/last/USD-BRL,EUR-BRL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "USDBRL": {
                "code": "USD", "codein": "BRL", "name": "Dólar Americano/Real Brasileiro",
                "bid": "5.0321", "ask": "5.0331", "pctChange": "0.12", "timestamp": "1712345678"
            },
            "EURBRL": {
                "code": "EUR", "codein": "BRL", "name": "Euro/Real Brasileiro",
                "bid": "5.4810", "ask": "5.4850", "pctChange": "-0.05", "timestamp": "1712345680"
            }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/taxas/v1/selic"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"nome": "Selic", "valor": 14.25})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/taxas/v1/cdi"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"nome": "CDI", "valor": 14.15})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/taxas/v1/ipca"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"data": "01/02/2025", "valor": "1.31"},
            {"data": "01/03/2025", "valor": "0.56"}
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/banks/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "ispb": "00000000", "name": "BCO DO BRASIL S.A.",
                "code": 1, "fullName": "Banco do Brasil S.A."
            },
            {"ispb": null, "name": "NU PAGAMENTOS - IP", "code": 260, "fullName": null}
        ])))
        .mount(server)
        .await;
}

fn collector(server: &MockServer, store: SharedStore, news_key: &str) -> Collector {
    let client = build_http_client().unwrap();
    Collector::new(
        store,
        AwesomeQuotes::new(
            client.clone(),
            &server.uri(),
            vec!["USD-BRL".into(), "EUR-BRL".into()],
        ),
        BrasilApi::new(client.clone(), &format!("{}/api", server.uri())),
        NewsApi::new(client, &format!("{}/v2", server.uri()), news_key),
        vec![NewsQuery::new("Selic", "pt"), NewsQuery::new("stocks", "en")],
    )
    .with_retry_policy(fast_policy())
}

#[tokio::test]
async fn news_outage_does_not_block_quotes_and_indicators() {
    let server = MockServer::start().await;
    mount_market_data(&server).await;
    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store: SharedStore = Arc::new(MemoryStore::new());
    let summary = collector(&server, store.clone(), "news-key").run().await;

    assert!(summary.success);
    assert!(summary.error.is_none());
    let r = summary.results;
    assert_eq!(r.quotes.added, 2);
    assert_eq!(r.indicators.added, 4);
    assert_eq!(r.banks.added, 2);
    assert_eq!(r.news.added, 0);
    assert_eq!(r.news.errors, 2);

    assert_eq!(store.count(Collection::Quotes).await.unwrap(), 2);
    assert!(store.find_by_key(Collection::Banks, "260").await.unwrap().is_some());
}

#[tokio::test]
async fn second_run_skips_everything_already_stored() {
    let server = MockServer::start().await;
    mount_market_data(&server).await;
    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok", "totalResults": 1,
            "articles": [{
                "source": {"name": "Valor"}, "title": "Selic sobe",
                "url": "https://example.com/selic", "publishedAt": "2025-03-19T21:30:00Z"
            }]
        })))
        .mount(&server)
        .await;

    let store: SharedStore = Arc::new(MemoryStore::new());
    let c = collector(&server, store.clone(), "news-key");
    let first = c.run().await.results;
    // both queries surface the same article
    assert_eq!((first.news.added, first.news.skipped), (1, 1));

    let second = c.run().await.results;
    assert_eq!(second.total_added(), 0);
    assert_eq!(second.quotes.skipped, 2);
    assert_eq!(second.indicators.skipped, 4);
    assert_eq!(second.banks.skipped, 2);
}

#[tokio::test]
async fn missing_news_key_counts_one_error() {
    let server = MockServer::start().await;
    mount_market_data(&server).await;
    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store: SharedStore = Arc::new(MemoryStore::new());
    let summary = collector(&server, store, "").run().await;
    assert!(summary.success);
    assert_eq!(summary.results.news.errors, 1);
    assert_eq!(summary.results.quotes.added, 2);
}

#[tokio::test]
async fn unreachable_store_aborts_the_run() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    // a plain file where the store directory should be
    let blocker = tmp.path().join("data");
    std::fs::write(&blocker, "not a dir").unwrap();

    let store: SharedStore = Arc::new(FileStore::new(&blocker));
    let summary = collector(&server, store, "news-key").run().await;

    assert!(!summary.success);
    assert!(summary.error.unwrap().contains("store connection failed"));
    assert_eq!(summary.results.total_added(), 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}
