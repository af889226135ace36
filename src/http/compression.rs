//! Request body compression
//!
//! Gzips buffered request bodies. A server answering 415 gets the request
//! once more, uncompressed. Response decoding is left to the HTTP client.

use super::middleware::{Middleware, MiddlewareFuture, Next};
use crate::error::TransportError;
use flate2::write::GzEncoder;
use reqwest::header::{HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH};
use reqwest::{Request, StatusCode};
use std::io::Write;

pub struct Compression;

pub(crate) fn gzip(data: &[u8]) -> Result<Vec<u8>, TransportError> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| TransportError::Body(e.to_string()))?;
    encoder.finish().map_err(|e| TransportError::Body(e.to_string()))
}

impl Middleware for Compression {
    fn name(&self) -> &'static str {
        "compression"
    }

    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> MiddlewareFuture<'a> {
        Box::pin(async move {
            let already_encoded = req.headers().contains_key(CONTENT_ENCODING);
            let body = req
                .body()
                .and_then(|b| b.as_bytes())
                .filter(|b| !b.is_empty())
                .map(<[u8]>::to_vec);

            let (Some(body), false) = (body, already_encoded) else {
                return next.run(req).await;
            };
            let Some(mut compressed) = req.try_clone() else {
                return next.run(req).await;
            };

            let gz = gzip(&body)?;
            tracing::trace!("Compressed request body {} -> {} bytes", body.len(), gz.len());
            compressed.headers_mut().remove(CONTENT_LENGTH);
            compressed
                .headers_mut()
                .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            *compressed.body_mut() = Some(gz.into());

            let response = next.run(compressed).await?;
            if response.status() != StatusCode::UNSUPPORTED_MEDIA_TYPE {
                return Ok(response);
            }

            tracing::debug!("Server rejected gzip body, re-sending uncompressed");
            next.run(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_gzip_round_trips_json_body() {
        let body = br#"{"displayName":"Contoso","mailEnabled":false}"#;
        let compressed = gzip(body).unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);

        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, body);
    }
}
