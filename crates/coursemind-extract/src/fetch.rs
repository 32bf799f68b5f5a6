//! HTTP fetcher for files held in object storage.

use std::time::Duration;

use async_trait::async_trait;
use coursemind_core::{Error, FetchedFile, ParseError, SourceFetcher};
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

/// Downloads stored files by URL.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, max_bytes })
    }
}

/// Validate a file URL before any network traffic.
pub fn parse_file_url(url: &str) -> Result<Url, ParseError> {
    let parsed =
        Url::parse(url).map_err(|e| ParseError::Fetch(format!("invalid file URL '{url}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ParseError::Fetch(format!(
            "unsupported URL scheme '{other}'"
        ))),
    }
}

fn file_name(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedFile, ParseError> {
        let url = parse_file_url(url)?;
        debug!("Fetching source file {}", url);

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ParseError::Fetch(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ParseError::Fetch(format!("{url} returned {status}")));
        }

        if let Some(len) = response.content_length()
            && len > self.max_bytes
        {
            return Err(ParseError::Fetch(format!(
                "file is {len} bytes, limit is {}",
                self.max_bytes
            )));
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Content-Length may be absent, so the limit is enforced while reading
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ParseError::Fetch(format!("failed to read body: {e}")))?
        {
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(ParseError::Fetch(format!(
                    "file exceeds {} bytes",
                    self.max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(FetchedFile {
            bytes,
            mime_type,
            file_name: file_name(&url),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_url_accepts_https() {
        let url = parse_file_url("https://storage.example.com/course/week1.pdf").unwrap();
        assert_eq!(file_name(&url).as_deref(), Some("week1.pdf"));
    }

    #[test]
    fn test_parse_file_url_rejects_other_schemes() {
        assert!(parse_file_url("file:///etc/passwd").is_err());
        assert!(parse_file_url("not a url").is_err());
    }

    /// Serve one chunked response with no Content-Length and return its URL.
    async fn serve_chunked(body: &'static [u8]) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await.unwrap();
            let mut response =
                b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
                    .to_vec();
            for piece in body.chunks(16) {
                response.extend_from_slice(format!("{:x}\r\n", piece.len()).as_bytes());
                response.extend_from_slice(piece);
                response.extend_from_slice(b"\r\n");
            }
            response.extend_from_slice(b"0\r\n\r\n");
            let _ = socket.write_all(&response).await;
        });
        format!("http://{addr}/notes.txt")
    }

    #[tokio::test]
    async fn test_fetch_without_length_stops_at_limit() {
        let url = serve_chunked(&[b'x'; 256]).await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5), 64).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(err.to_string().contains("exceeds 64 bytes"));
    }

    #[tokio::test]
    async fn test_fetch_without_length_under_limit() {
        let url = serve_chunked(b"loops repeat statements").await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5), 64).unwrap();
        let file = fetcher.fetch(&url).await.unwrap();
        assert_eq!(file.bytes, b"loops repeat statements");
        assert_eq!(file.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(file.file_name.as_deref(), Some("notes.txt"));
    }

    #[test]
    fn test_file_name_missing() {
        let url = parse_file_url("https://storage.example.com/").unwrap();
        assert_eq!(file_name(&url), None);
    }
}
