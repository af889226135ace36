//! Integration tests for the middleware pipeline using wiremock
//!
//! These tests drive the transport against mocked endpoints to check retry,
//! fault injection, redirect, compression and header behaviour end to end.

use m365_provider::config::ClientOptions;
use m365_provider::http::fault::{FaultInjection, CHAOS_HEADER};
use m365_provider::http::retry::RetryStage;
use m365_provider::http::transport::CLIENT_REQUEST_ID_HEADER;
use m365_provider::http::user_agent::PRODUCT_USER_AGENT;
use m365_provider::http::{build as build_pipeline, MiddlewarePipeline, RetryPolicy, Transport};
use m365_provider::TransportError;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(options: &ClientOptions) -> Transport {
    Transport::from_options(options, build_pipeline(options), false).expect("transport should build")
}

fn retrying(max_retries: u32) -> ClientOptions {
    ClientOptions {
        enable_retry: true,
        max_retries,
        retry_delay_seconds: 0,
        ..Default::default()
    }
}

async fn get(transport: &Transport, url: &str) -> Result<reqwest::Response, TransportError> {
    let request = transport.request(Method::GET, url).build().unwrap();
    transport.execute(request).await
}

/// Retry stage tests
mod retry_tests {
    use super::*;

    #[tokio::test]
    async fn test_transient_503_then_success() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&server)
            .await;

        let t = transport(&retrying(3));
        let response = get(&t, &format!("{}/v1.0/users", server.uri())).await.unwrap();
        assert_eq!(response.status(), 200);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].headers.get("retry-attempt").is_none());
        assert_eq!(requests[1].headers.get("retry-attempt").unwrap(), "1");
        assert_eq!(requests[2].headers.get("retry-attempt").unwrap(), "2");
    }

    #[tokio::test]
    async fn test_budget_exhausted_returns_last_response() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let t = transport(&retrying(2));
        let response = get(&t, &format!("{}/v1.0/groups", server.uri())).await.unwrap();
        assert_eq!(response.status(), 429);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let t = transport(&retrying(5));
        let response = get(&t, &format!("{}/v1.0/users/missing", server.uri())).await.unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_connection_failure_is_retried_then_surfaced() {
        // Nothing listens on port 9 of localhost in test environments
        let t = transport(&retrying(1));
        let err = get(&t, "http://127.0.0.1:9/v1.0/users").await.unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
    }

    #[tokio::test]
    async fn test_overall_timeout_bounds_backoff() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let options = ClientOptions {
            retry_delay_seconds: 1,
            timeout_seconds: 1,
            ..retrying(2)
        };
        let t = transport(&options);

        let started = Instant::now();
        let err = get(&t, &format!("{}/v1.0/users", server.uri())).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, TransportError::Timeout(d) if d == Duration::from_secs(1)));
        assert!(elapsed < Duration::from_millis(1_800), "took {:?}", elapsed);
        assert!(server.received_requests().await.unwrap().len() < 3);
    }

    #[tokio::test]
    async fn test_no_timeout_when_unset() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;

        let t = transport(&ClientOptions::default());
        assert_eq!(get(&t, &server.uri()).await.unwrap().status(), 200);
    }
}

/// Fault injection tests
mod fault_injection_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_chaos_never_reaches_network() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let options = ClientOptions {
            enable_chaos: true,
            chaos_percentage: 100,
            chaos_status_code: 503,
            chaos_status_message: "Injected outage".to_string(),
            ..retrying(2)
        };
        let t = transport(&options);
        let response = get(&t, &format!("{}/v1.0/users", server.uri())).await.unwrap();

        assert_eq!(response.status(), 503);
        assert_eq!(response.headers()[CHAOS_HEADER], "true");
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"]["message"], "Injected outage");
    }

    #[tokio::test]
    async fn test_zero_percent_passes_through() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(5)
            .mount(&server)
            .await;

        let options = ClientOptions {
            enable_chaos: true,
            chaos_percentage: 0,
            ..Default::default()
        };
        let t = transport(&options);
        for _ in 0..5 {
            let response = get(&t, &format!("{}/v1.0/users", server.uri())).await.unwrap();
            assert_eq!(response.status(), 200);
            assert!(response.headers().get(CHAOS_HEADER).is_none());
        }
    }

    #[tokio::test]
    async fn test_injected_faults_are_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(20)
            .mount(&server)
            .await;

        // Wire-first: fault injection below retry
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.push(Arc::new(FaultInjection::new(50, 503, "").with_seed(7)));
        pipeline.push(Arc::new(RetryStage::new(
            RetryPolicy::new(40, Duration::ZERO, Duration::ZERO).with_seed(7),
        )));
        let t = Transport::new(reqwest::Client::new(), pipeline, true);

        for _ in 0..20 {
            let response = get(&t, &format!("{}/v1.0/users", server.uri())).await.unwrap();
            assert_eq!(response.status(), 200);
            assert!(response.headers().get(CHAOS_HEADER).is_none());
        }

        // A request that reached the network after a retry was preceded by an injected 503
        let requests = server.received_requests().await.unwrap();
        assert!(requests.iter().any(|r| r.headers.contains_key("retry-attempt")));
    }

    #[tokio::test]
    async fn test_built_pipeline_retries_partial_chaos() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .expect(10)
            .mount(&server)
            .await;

        let options = ClientOptions {
            enable_chaos: true,
            chaos_percentage: 50,
            chaos_status_code: 503,
            ..retrying(40)
        };
        let t = transport(&options);
        for _ in 0..10 {
            assert_eq!(get(&t, &server.uri()).await.unwrap().status(), 204);
        }
    }
}

/// Redirect stage tests
mod redirect_tests {
    use super::*;

    fn redirecting() -> ClientOptions {
        ClientOptions {
            enable_redirect: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_follows_same_origin_redirect_with_auth() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/old"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/v1.0/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1.0/new"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"moved": true})))
            .expect(1)
            .mount(&server)
            .await;

        let t = transport(&redirecting());
        let request = t
            .request(Method::GET, &format!("{}/v1.0/old", server.uri()))
            .bearer_auth("abc")
            .build()
            .unwrap();
        let response = t.execute(request).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_cross_origin_redirect_drops_authorization() {
        let origin = MockServer::start().await;
        let elsewhere = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(
                ResponseTemplate::new(307).insert_header("Location", format!("{}/landing", elsewhere.uri()).as_str()),
            )
            .mount(&origin)
            .await;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&elsewhere)
            .await;

        let t = transport(&redirecting());
        let request = t
            .request(Method::GET, &format!("{}/start", origin.uri()))
            .bearer_auth("secret")
            .build()
            .unwrap();
        let response = t.execute(request).await.unwrap();
        assert_eq!(response.status(), 200);

        let landed = elsewhere.received_requests().await.unwrap();
        assert_eq!(landed.len(), 1);
        assert!(landed[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_see_other_switches_to_get() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/submit"))
            .respond_with(ResponseTemplate::new(303).insert_header("Location", "/result"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/result"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let t = transport(&redirecting());
        let request = t
            .request(Method::POST, &format!("{}/submit", server.uri()))
            .json(&json!({"a": 1}))
            .build()
            .unwrap();
        assert_eq!(t.execute(request).await.unwrap().status(), 200);
    }

    #[tokio::test]
    async fn test_redirect_loop_hits_limit() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(301).insert_header("Location", "/loop"))
            .expect(3)
            .mount(&server)
            .await;

        let options = ClientOptions {
            max_redirects: 2,
            ..redirecting()
        };
        let t = transport(&options);
        let err = get(&t, &format!("{}/loop", server.uri())).await.unwrap_err();
        assert!(matches!(err, TransportError::TooManyRedirects(2)));
    }

    #[tokio::test]
    async fn test_redirect_not_followed_when_disabled() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
            .mount(&server)
            .await;

        let t = transport(&ClientOptions::default());
        let response = get(&t, &format!("{}/old", server.uri())).await.unwrap();
        assert_eq!(response.status(), 302);
    }

    #[tokio::test]
    async fn test_missing_location_returned_as_is() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(302))
            .mount(&server)
            .await;

        let t = transport(&redirecting());
        let response = get(&t, &format!("{}/nowhere", server.uri())).await.unwrap();
        assert_eq!(response.status(), 302);
    }
}

/// Compression stage tests
mod compression_tests {
    use super::*;

    #[tokio::test]
    async fn test_gzip_body_with_415_fallback() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1.0/groups"))
            .and(header("content-encoding", "gzip"))
            .respond_with(ResponseTemplate::new(415))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1.0/groups"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "g1"})))
            .mount(&server)
            .await;

        let options = ClientOptions {
            enable_compression: true,
            ..Default::default()
        };
        let t = transport(&options);
        let payload = json!({"displayName": "Contoso"});
        let request = t
            .request(Method::POST, &format!("{}/v1.0/groups", server.uri()))
            .json(&payload)
            .build()
            .unwrap();
        let response = t.execute(request).await.unwrap();
        assert_eq!(response.status(), 201);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].body.starts_with(&[0x1f, 0x8b]));
        assert!(requests[1].headers.get("content-encoding").is_none());
        let resent: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(resent, payload);
    }

    #[tokio::test]
    async fn test_bodyless_requests_untouched() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let options = ClientOptions {
            enable_compression: true,
            ..Default::default()
        };
        let t = transport(&options);
        get(&t, &format!("{}/v1.0/me", server.uri())).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("content-encoding").is_none());
    }
}

/// User agent, correlation id and header inspection
mod header_tests {
    use super::*;

    #[tokio::test]
    async fn test_custom_user_agent_prefix() {
        let server = MockServer::start().await;
        let expected = format!("terraform/1.9 {}", PRODUCT_USER_AGENT);

        Mock::given(method("GET"))
            .and(header("user-agent", expected.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let options = ClientOptions {
            custom_user_agent: "terraform/1.9".to_string(),
            ..Default::default()
        };
        let t = transport(&options);
        assert_eq!(get(&t, &server.uri()).await.unwrap().status(), 200);
    }

    #[tokio::test]
    async fn test_client_request_id_unless_opted_out() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(header_exists(CLIENT_REQUEST_ID_HEADER))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let options = ClientOptions::default();
        let with_telemetry = Transport::from_options(&options, build_pipeline(&options), false).unwrap();
        assert_eq!(get(&with_telemetry, &server.uri()).await.unwrap().status(), 200);

        let opted_out = Transport::from_options(&options, build_pipeline(&options), true).unwrap();
        assert_eq!(get(&opted_out, &server.uri()).await.unwrap().status(), 204);
    }

    #[tokio::test]
    async fn test_headers_inspector_records_last_exchange() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).insert_header("request-id", "rid-42"))
            .mount(&server)
            .await;

        let options = ClientOptions {
            enable_headers_inspection: true,
            ..Default::default()
        };
        let t = transport(&options);
        let inspector = t.pipeline().headers_inspector().cloned().unwrap();
        assert!(inspector.last().is_none());

        get(&t, &server.uri()).await.unwrap();

        let response_headers = inspector.last_response_headers().unwrap();
        assert_eq!(response_headers["request-id"], "rid-42");
        let request_headers = inspector.last_request_headers().unwrap();
        assert!(request_headers.contains_key(CLIENT_REQUEST_ID_HEADER));
    }
}
