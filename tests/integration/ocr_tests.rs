use super::*;
use lunchbox::RefreshOutcome;
use lunchbox::config::{ProviderConfig, ResolverConfig};
use lunchbox::models::catalog_from_config;
use lunchbox::ocr::{OcrClient, OcrError};
use lunchbox::web_scraper::WebScraper;
use reqwest::StatusCode;
use serde_json::json;
use std::time::Instant;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn image() -> Url {
    Url::parse("http://menus.example.com/kw24.jpg").unwrap()
}

async fn ocr_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == "/ocr")
        .count()
}

#[tokio::test]
async fn test_transient_failures_are_retried_with_backoff() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ocr"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ocr"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Montag 10.06.2024\nSoljanka 3,50 €"))
        .mount(&server)
        .await;

    let client = OcrClient::new(test_ocr_config(&server.uri(), 6))?;
    let started = Instant::now();
    let text = client.recognize_text(&image()).await?;

    assert_eq!(text, "Montag 10.06.2024\nSoljanka 3,50 €");
    // 50 ms + 100 ms before the second and third attempt
    assert!(started.elapsed() >= Duration::from_millis(150));
    let attempts = ocr_requests(&server).await;
    assert_eq!(attempts, 4);
    assert!(attempts <= 6);
    Ok(())
}

#[tokio::test]
async fn test_exhausted_retries_fail_instead_of_returning_empty_text() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ocr"))
        .respond_with(ResponseTemplate::new(500).set_body_string("engine crashed"))
        .mount(&server)
        .await;

    let client = OcrClient::new(test_ocr_config(&server.uri(), 3))?;
    let result = client.recognize_text(&image()).await;

    match result {
        Err(OcrError::Status { status, body }) => {
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body, "engine crashed");
        }
        other => panic!("expected terminal status error, got {:?}", other),
    }
    assert_eq!(ocr_requests(&server).await, 3);
    Ok(())
}

#[tokio::test]
async fn test_malformed_request_is_not_retried() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ocr"))
        .respond_with(ResponseTemplate::new(400).set_body_string("img_url missing"))
        .mount(&server)
        .await;

    let client = OcrClient::new(test_ocr_config(&server.uri(), 6))?;
    let error = client.recognize_text(&image()).await.unwrap_err();

    assert!(!error.is_recoverable());
    assert_eq!(ocr_requests(&server).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_successful_empty_response_is_empty_text() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ocr"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = OcrClient::new(test_ocr_config(&server.uri(), 6))?;
    let text = client.recognize_text(&image()).await?;

    assert_eq!(text, "");
    assert_eq!(ocr_requests(&server).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_request_carries_image_and_engine_parameters() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ocr"))
        .and(body_json(json!({
            "image_url": "http://menus.example.com/kw24.jpg",
            "engine": "tesseract",
            "engine_args": { "lang": "deu" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let client = OcrClient::new(test_ocr_config(&server.uri(), 1))?;
    assert_eq!(client.recognize_text(&image()).await?, "ok");
    Ok(())
}

#[tokio::test]
async fn test_unreachable_service_is_retried_as_transport_error() -> anyhow::Result<()> {
    // a port nobody listens on once the listener is gone
    let port = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
    let uri = format!("http://127.0.0.1:{}", port);

    let client = OcrClient::new(test_ocr_config(&uri, 3))?;
    let started = Instant::now();
    let error = client.recognize_text(&image()).await.unwrap_err();

    assert!(matches!(error, OcrError::Transport(_)), "expected transport error, got {:?}", error);
    assert!(error.is_recoverable());
    // three attempts wait 50 ms + 100 ms in between
    assert!(started.elapsed() >= Duration::from_millis(150));
    Ok(())
}

#[tokio::test]
async fn test_image_menu_is_recognized_and_stored() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/speiseplan"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<div><img class="logo" src="/logo.png"><img class="speiseplan" src="/plans/kw24.jpg"></div>"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ocr"))
        .and(body_json(json!({
            "image_url": format!("{}/plans/kw24.jpg", server.uri()),
            "engine": "tesseract",
            "engine_args": { "lang": "deu" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "Speiseplan KW 24\nMontag, 10.06.2024\nSoljanka 3,50 €\nDienstag, 11.06.2024\nKohlroulade 5,20 €\n",
        ))
        .mount(&server)
        .await;

    let providers = vec![ProviderConfig {
        id: "aok_cafeteria".to_string(),
        label: "AOK Cafeteria".to_string(),
        location: "Neubrandenburg".to_string(),
        active: true,
        resolver: Some(ResolverConfig::OcrImage {
            page_url: format!("{}/speiseplan", server.uri()),
            image_selector: "img.speiseplan".to_string(),
        }),
    }];

    let registry = ResolverRegistry::from_providers(
        &providers,
        &WebScraper::new(&test_scraper_config())?,
        Arc::new(OcrClient::new(test_ocr_config(&server.uri(), 2))?),
        chrono_tz::Europe::Berlin,
    )?;

    let repo = test_repo().await;
    let worker = Arc::new(OfferUpdateWorker::new(repo.clone(), Arc::new(registry), Duration::from_secs(10)));
    let update = OfferUpdate::new(repo.clone(), worker, catalog_from_config(&providers), chrono_tz::Europe::Berlin);

    let report = update.update_offers_on(date(2024, 6, 12)).await.wait().await?;

    assert_eq!(
        report.outcome_of(&ProviderId::from("aok_cafeteria")),
        Some(&RefreshOutcome::Replaced {
            from: date(2024, 6, 10),
            deleted: 0,
            inserted: 2,
        })
    );
    assert_eq!(
        names_of(&repo, "aok_cafeteria").await,
        vec![
            ("Soljanka".to_string(), date(2024, 6, 10)),
            ("Kohlroulade".to_string(), date(2024, 6, 11)),
        ]
    );
    Ok(())
}
