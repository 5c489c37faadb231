use std::{ops::Deref, sync::Arc};

use bytes::{Buf, Bytes};
use reqwest::{header, Client, IntoUrl};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use url::Url;

use crate::{DashError, DashOptions, DashResult};

/// HTTP client with a shared cookie store. Cookies set by the server on the
/// manifest fetch are replayed on every subsequent segment request.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cookies_store: Arc<CookieStoreMutex>,
}

impl HttpClient {
    pub fn new(options: &DashOptions) -> DashResult<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));

        let mut headers = header::HeaderMap::new();
        for (name, value) in &options.headers {
            match (
                header::HeaderName::try_from(name.as_str()),
                header::HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(name = %name, "skipping malformed header"),
            }
        }
        if let Some(referer) = &options.referer {
            if let Ok(value) = header::HeaderValue::try_from(referer.as_str()) {
                headers.insert(header::REFERER, value);
            }
        }

        let mut builder = Client::builder()
            .cookie_provider(cookies_store.clone())
            .default_headers(headers)
            .timeout(options.request_timeout);
        if let Some(user_agent) = &options.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        if let Some(proxy) = &options.http_proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.clone())?);
        }

        Ok(Self {
            client: builder.build()?,
            cookies_store,
        })
    }

    pub fn add_cookies(&self, cookies: Vec<String>, url: impl IntoUrl) {
        let Ok(url) = url.into_url() else { return };
        let mut lock = self.cookies_store.lock().unwrap();
        for cookie in cookies {
            _ = lock.parse(&cookie, &url);
        }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(&DashOptions::default()).expect("default client")
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

/// Opens segment byte ranges. Only `http(s)`, allowlisted `file` paths and
/// the `crypto+http(s)` passthrough are accepted.
#[derive(Clone)]
pub struct Fetcher {
    pub client: HttpClient,
    allowed_extensions: String,
}

impl Fetcher {
    pub fn new(client: HttpClient, options: &DashOptions) -> Self {
        Self {
            client,
            allowed_extensions: options.allowed_extensions.clone(),
        }
    }

    /// Scheme gate. Returns the URL to actually fetch (the inner URL for
    /// `crypto+` resources, which this crate forwards without decrypting).
    pub fn validate_url(&self, url: &str) -> DashResult<Url> {
        let (inner, crypto) = match url.strip_prefix("crypto+") {
            Some(rest) => (rest, true),
            None => (url, false),
        };
        let parsed = Url::parse(inner)
            .map_err(|e| DashError::InvalidManifest(format!("bad segment url '{inner}': {e}")))?;

        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            "file" if !crypto => {
                if self.allowed_extensions != "ALL" && !self.extension_allowed(parsed.path()) {
                    return Err(DashError::InvalidManifest(format!(
                        "filename extension of '{url}' is not a common multimedia extension, \
                         blocked for security reasons (set allowed_extensions to 'ALL' to override)"
                    )));
                }
                Ok(parsed)
            }
            other => Err(DashError::InvalidManifest(format!(
                "unsupported scheme '{other}'"
            ))),
        }
    }

    fn extension_allowed(&self, path: &str) -> bool {
        let Some(ext) = path.rsplit('.').next().filter(|e| !e.contains('/')) else {
            return false;
        };
        self.allowed_extensions
            .split(',')
            .any(|allowed| allowed.trim().eq_ignore_ascii_case(ext))
    }

    /// Resource size in bytes, `-1` when it cannot be determined. When the
    /// size stays unknown, reads simply run until EOF.
    pub async fn probe_size(&self, url: &str) -> i64 {
        let Ok(parsed) = self.validate_url(url) else {
            return -1;
        };
        match parsed.scheme() {
            "file" => match parsed.to_file_path() {
                Ok(path) => tokio::fs::metadata(path)
                    .await
                    .map(|m| m.len() as i64)
                    .unwrap_or(-1),
                Err(()) => -1,
            },
            _ => match self.client.head(parsed).send().await {
                Ok(response) if response.status().is_success() => response
                    .headers()
                    .get(header::CONTENT_LENGTH)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(-1),
                _ => -1,
            },
        }
    }

    /// Open `url` for reading, optionally restricted to `size` bytes starting
    /// at `offset` (`size < 0` reads to EOF). Over HTTP the restriction is a
    /// single `Range: bytes=offset-(offset+size-1)` request.
    pub async fn open(&self, url: &str, offset: i64, size: i64) -> DashResult<ByteSource> {
        let parsed = self.validate_url(url)?;
        tracing::trace!(url, offset, size, "opening segment");

        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|()| DashError::InvalidManifest(format!("bad file url '{url}'")))?;
            let mut file = tokio::fs::File::open(path).await?;
            if offset > 0 {
                file.seek(std::io::SeekFrom::Start(offset as u64)).await?;
            }
            return Ok(ByteSource::File {
                file,
                remaining: (size >= 0).then_some(size as u64),
            });
        }

        let mut request = self.client.get(parsed);
        if offset > 0 || size >= 0 {
            let range = if size >= 0 {
                format!("bytes={}-{}", offset, offset + size - 1)
            } else {
                format!("bytes={offset}-")
            };
            request = request.header(header::RANGE, range);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(DashError::HttpStatus(response.status()));
        }

        Ok(ByteSource::Http {
            response,
            pending: Bytes::new(),
        })
    }
}

/// A readable byte stream over one opened resource.
pub enum ByteSource {
    Http {
        response: reqwest::Response,
        pending: Bytes,
    },
    File {
        file: tokio::fs::File,
        remaining: Option<u64>,
    },
}

impl ByteSource {
    /// Read into `buf`, returning the number of bytes read; `0` is EOF.
    pub async fn read(&mut self, buf: &mut [u8]) -> DashResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self {
            ByteSource::Http { response, pending } => {
                while pending.is_empty() {
                    match response.chunk().await? {
                        Some(chunk) => *pending = chunk,
                        None => return Ok(0),
                    }
                }
                let n = pending.len().min(buf.len());
                buf[..n].copy_from_slice(&pending[..n]);
                pending.advance(n);
                Ok(n)
            }
            ByteSource::File { file, remaining } => {
                let limit = match remaining {
                    Some(remaining) => (*remaining as usize).min(buf.len()),
                    None => buf.len(),
                };
                if limit == 0 {
                    return Ok(0);
                }
                let n = file.read(&mut buf[..limit]).await?;
                if let Some(remaining) = remaining {
                    *remaining -= n as u64;
                }
                Ok(n)
            }
        }
    }
}
