use httpmock::prelude::*;
use serde_json::json;
use statement_etl::adapters::{BankSettings, EndpointOfxProvider, InterBankClient};
use statement_etl::core::retry::RetryPolicy;
use statement_etl::domain::model::{
    AccessToken, BankCredentials, DateRange, TransactionDirection,
};
use statement_etl::domain::ports::{BankStatementClient, OfxProvider, TransactionSource};
use statement_etl::utils::error::ErrorKind;
use std::time::Duration;

fn client_for(server: &MockServer) -> InterBankClient {
    let settings = BankSettings {
        base_url: server.base_url(),
        ..BankSettings::default()
    };
    InterBankClient::with_http_client(settings, reqwest::Client::new())
}

fn credentials() -> BankCredentials {
    BankCredentials {
        client_id: "cid".into(),
        client_secret: "secret".into(),
        certificate_path: "unused.crt".into(),
        key_path: "unused.key".into(),
        account_id: "123456".into(),
    }
}

fn january() -> DateRange {
    DateRange::parse("2024-01-01", "2024-01-31").unwrap()
}

#[tokio::test]
async fn test_authenticate_posts_client_credentials() {
    let server = MockServer::start_async().await;
    let token_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/oauth/v2/token")
                .body_contains("grant_type=client_credentials")
                .body_contains("client_id=cid")
                .body_contains("scope=extrato.read");
            then.status(200)
                .json_body(json!({ "access_token": "tok-1", "expires_in": 3600 }));
        })
        .await;

    let token = client_for(&server).authenticate(&credentials()).await.unwrap();

    assert_eq!(token.secret(), "tok-1");
    token_mock.assert_async().await;
}

#[tokio::test]
async fn test_authenticate_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/oauth/v2/token");
            then.status(401).body("invalid_client");
        })
        .await;

    let err = client_for(&server)
        .authenticate(&credentials())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(!err.to_string().contains("secret"));
}

#[tokio::test]
async fn test_authenticate_without_access_token() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/oauth/v2/token");
            then.status(200).json_body(json!({ "token_type": "bearer" }));
        })
        .await;

    let err = client_for(&server)
        .authenticate(&credentials())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
}

#[tokio::test]
async fn test_fetch_export_sends_range_and_account() {
    let server = MockServer::start_async().await;
    let export_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/banking/v2/extrato/exportar")
                .query_param("dataInicio", "2024-01-01")
                .query_param("dataFim", "2024-01-31")
                .header("authorization", "Bearer tok-1")
                .header("x-conta-corrente", "123456");
            then.status(200).json_body(json!({ "pdf": "JVBERi0xLjQK" }));
        })
        .await;

    let response = client_for(&server)
        .fetch_export(&AccessToken::new("tok-1"), &january(), "123456")
        .await
        .unwrap();

    assert_eq!(response.pdf_base64(), Some(&json!("JVBERi0xLjQK")));
    export_mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_export_server_error_keeps_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/banking/v2/extrato/exportar");
            then.status(503).body("maintenance");
        })
        .await;

    let err = client_for(&server)
        .fetch_export(&AccessToken::new("tok-1"), &january(), "123456")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BankApi);
    assert!(err.is_transient());
    assert!(err.to_string().contains("503"));
}

fn unreachable_client() -> InterBankClient {
    // port 1 上沒有服務
    let settings = BankSettings {
        base_url: "http://127.0.0.1:1".into(),
        ..BankSettings::default()
    };
    InterBankClient::with_http_client(settings, reqwest::Client::new())
}

#[tokio::test]
async fn test_fetch_export_connection_refused_is_bank_error() {
    let err = unreachable_client()
        .fetch_export(&AccessToken::new("tok-1"), &january(), "123456")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BankApi);
    assert_eq!(err.exit_code(), 5);
    assert!(err.is_transient());
    assert!(!err.to_string().contains("tok-1"));
}

#[tokio::test]
async fn test_authenticate_connection_refused_is_auth_error() {
    let err = unreachable_client()
        .authenticate(&credentials())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(!err.to_string().contains("secret"));
}

#[tokio::test]
async fn test_range_over_limit_makes_no_request() {
    let server = MockServer::start_async().await;
    let export_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/banking/v2/extrato/exportar");
            then.status(200).json_body(json!({ "pdf": "JVBERi0xLjQK" }));
        })
        .await;
    let range = DateRange::parse("2024-01-01", "2024-04-30").unwrap();

    let err = client_for(&server)
        .fetch_export(&AccessToken::new("tok-1"), &range, "123456")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    export_mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_fetch_transactions() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/banking/v2/extrato");
            then.status(200).json_body(json!({
                "transacoes": [
                    {
                        "dataEntrada": "2024-01-05",
                        "tipoTransacao": "PIX",
                        "tipoOperacao": "C",
                        "valor": "150.00",
                        "titulo": "Pix recebido",
                        "descricao": "PIX RECEBIDO - Cliente"
                    },
                    {
                        "dataEntrada": "2024-01-07",
                        "tipoTransacao": "PAGAMENTO",
                        "tipoOperacao": "D",
                        "valor": 42.5,
                        "titulo": "Boleto",
                        "descricao": "PAGAMENTO DE TITULO"
                    }
                ]
            }));
        })
        .await;

    let transactions = client_for(&server)
        .fetch_transactions(&AccessToken::new("tok-1"), &january(), "123456")
        .await
        .unwrap();

    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0].direction, TransactionDirection::Credit);
    assert_eq!(transactions[1].direction, TransactionDirection::Debit);
}

#[tokio::test]
async fn test_endpoint_ofx_provider_decodes_envelope() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/banking/v2/extrato/exportar/ofx");
            // "OFXHEADER:100\n"
            then.status(200).json_body(json!({ "ofx": "T0ZYSEVBREVSOjEwMAo=" }));
        })
        .await;

    let provider = EndpointOfxProvider::new(client_for(&server));
    let bytes = provider
        .provide(&january(), "123456", &AccessToken::new("tok-1"))
        .await
        .unwrap();

    assert_eq!(bytes, b"OFXHEADER:100\n");
}

#[tokio::test]
async fn test_endpoint_ofx_provider_accepts_raw_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/banking/v2/extrato/exportar/ofx");
            then.status(200)
                .header("content-type", "application/x-ofx")
                .body("OFXHEADER:100\n");
        })
        .await;

    let provider = EndpointOfxProvider::new(client_for(&server));
    let bytes = provider
        .provide(&january(), "123456", &AccessToken::new("tok-1"))
        .await
        .unwrap();

    assert_eq!(bytes, b"OFXHEADER:100\n");
}

#[tokio::test]
async fn test_endpoint_ofx_provider_retries_transient_failures() {
    let server = MockServer::start_async().await;
    let ofx_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/banking/v2/extrato/exportar/ofx");
            then.status(503).body("maintenance");
        })
        .await;

    let provider = EndpointOfxProvider::new(client_for(&server))
        .with_retry(RetryPolicy::new(3, Duration::from_millis(1)));
    let err = provider
        .provide(&january(), "123456", &AccessToken::new("tok-1"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BankApi);
    ofx_mock.assert_hits_async(3).await;
}
