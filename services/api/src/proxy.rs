//! Streaming passthrough to the internal custom LLM service.
//!
//! The agent platform calls the public `/api/llm/chat/completions` URL; the
//! request is forwarded as-is and the upstream's event stream is relayed chunk
//! by chunk so speech synthesis can start before the completion finishes.

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::models::ErrorResponse;

/// Headers that describe a single connection and must not be forwarded.
fn is_hop_by_hop_header(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

fn forwardable_request_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| {
            !is_hop_by_hop_header(name) && **name != header::HOST && **name != header::CONTENT_LENGTH
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn forwardable_response_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| {
            !is_hop_by_hop_header(name)
                && **name != header::CONTENT_ENCODING
                && **name != header::CONTENT_LENGTH
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Forwards a request to `upstream_url` and streams the response back.
pub async fn forward(
    http_client: &reqwest::Client,
    upstream_url: &str,
    method: Method,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    debug!(%method, upstream_url, "Proxying LLM request");
    let upstream = http_client
        .request(method, upstream_url)
        .headers(forwardable_request_headers(headers))
        .body(body)
        .send()
        .await;

    let upstream = match upstream {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, upstream_url, "LLM upstream unreachable");
            return (
                StatusCode::BAD_GATEWAY,
                axum::Json(ErrorResponse::new("LLM service unavailable")),
            )
                .into_response();
        }
    };

    let status = upstream.status();
    let headers = forwardable_response_headers(upstream.headers());
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, routing::post};
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn spawn_upstream(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/chat/completions")
    }

    #[test]
    fn test_request_headers_drop_hop_by_hop_host_and_length() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "public.example.com".parse().unwrap());
        headers.insert(header::CONTENT_LENGTH, "12".parse().unwrap());
        headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        headers.insert(header::AUTHORIZATION, "Bearer k".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());

        let forwarded = forwardable_request_headers(&headers);

        assert_eq!(forwarded.len(), 2);
        assert!(forwarded.contains_key(header::AUTHORIZATION));
        assert!(forwarded.contains_key(header::CONTENT_TYPE));
    }

    #[test]
    fn test_response_headers_drop_encoding_and_length() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, "gzip".parse().unwrap());
        headers.insert(header::CONTENT_LENGTH, "12".parse().unwrap());
        headers.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "text/event-stream".parse().unwrap());

        let forwarded = forwardable_response_headers(&headers);

        assert_eq!(forwarded.len(), 1);
        assert!(forwarded.contains_key(header::CONTENT_TYPE));
    }

    #[tokio::test]
    async fn test_status_and_body_pass_through() {
        let url = spawn_upstream(Router::new().route(
            "/chat/completions",
            post(|body: String| async move {
                (
                    StatusCode::IM_A_TEAPOT,
                    [(header::CONTENT_TYPE, "text/plain")],
                    format!("echo:{body}"),
                )
            }),
        ))
        .await;

        let response = forward(
            &reqwest::Client::new(),
            &url,
            Method::POST,
            &HeaderMap::new(),
            Bytes::from_static(b"hello"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"echo:hello");
    }

    #[tokio::test]
    async fn test_chunks_arrive_before_upstream_finishes() {
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let release_rx = std::sync::Arc::new(tokio::sync::Mutex::new(Some(release_rx)));

        let url = spawn_upstream(Router::new().route(
            "/chat/completions",
            post(move || {
                let release_rx = release_rx.clone();
                async move {
                    let first = futures::stream::once(async {
                        Ok::<_, std::io::Error>(Bytes::from_static(b"data: one\n\n"))
                    });
                    let second = futures::stream::once(async move {
                        if let Some(rx) = release_rx.lock().await.take() {
                            let _ = rx.await;
                        }
                        Ok::<_, std::io::Error>(Bytes::from_static(b"data: two\n\n"))
                    });
                    Body::from_stream(first.chain(second))
                }
            }),
        ))
        .await;

        let response = forward(
            &reqwest::Client::new(),
            &url,
            Method::POST,
            &HeaderMap::new(),
            Bytes::new(),
        )
        .await;
        let mut body = response.into_body().into_data_stream();

        let first = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .expect("first chunk should arrive while upstream is still open")
            .unwrap()
            .unwrap();
        assert_eq!(&first[..], b"data: one\n\n");

        release_tx.send(()).unwrap();
        let mut rest = Vec::new();
        while let Some(chunk) = body.next().await {
            rest.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(rest, b"data: two\n\n");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let response = forward(
            &reqwest::Client::new(),
            &format!("http://{addr}/chat/completions"),
            Method::POST,
            &HeaderMap::new(),
            Bytes::new(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
