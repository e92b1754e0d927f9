//! Time-bounded, size-capped media downloads.

use std::time::Duration;

use {futures::StreamExt, tracing::debug};

use courier_channels::DownloadRequest;

use crate::error::{Error, Result};

/// A completed download.
#[derive(Debug)]
pub struct Downloaded {
    pub bytes: Vec<u8>,
    /// `Content-Type` reported by the remote, if any.
    pub content_type: Option<String>,
}

/// Fetch `request`, aborting once `max_bytes` is exceeded mid-stream.
///
/// The cap is enforced while streaming, not after the fact, so an oversized
/// body never fully transits the network.
pub async fn fetch_limited(
    client: &reqwest::Client,
    request: &DownloadRequest,
    timeout: Duration,
    max_bytes: u64,
) -> Result<Downloaded> {
    let mut builder = client.get(&request.url).timeout(timeout);
    if let Some(token) = &request.bearer {
        builder = builder.bearer_auth(token);
    }

    let response = builder.send().await.map_err(|e| {
        if e.is_timeout() {
            Error::Timeout
        } else {
            Error::external("media download request", e)
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Http {
            status: status.as_u16(),
        });
    }

    if let Some(declared) = response.content_length()
        && declared > max_bytes
    {
        return Err(Error::TooLarge { limit: max_bytes });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout
            } else {
                Error::external("media download stream", e)
            }
        })?;
        if (bytes.len() + chunk.len()) as u64 > max_bytes {
            return Err(Error::TooLarge { limit: max_bytes });
        }
        bytes.extend_from_slice(&chunk);
    }

    debug!(size = bytes.len(), ?content_type, "media downloaded");
    Ok(Downloaded {
        bytes,
        content_type,
    })
}
