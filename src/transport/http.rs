//! Production HTTP transport over reqwest
//!
//! Redirects are handled manually (client policy is `none`): each hop is
//! resolved against the current URL, recorded in a seen-set for loop
//! detection, and capped by the session's `max-redirects`.

use crate::config::SessionConfig;
use crate::transport::{FetchedResponse, Transport, TransportError};
use crate::{ConfigError, ConfigResult};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// HTTP(S) transport with optional proxy (HTTP or SOCKS5/SOCKS5h)
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    max_redirects: u32,
}

impl HttpTransport {
    /// Builds a transport from a session configuration
    ///
    /// A malformed or unsupported proxy endpoint fails here, before any
    /// fetch is attempted.
    pub fn new(session: &SessionConfig) -> ConfigResult<Self> {
        let mut builder = Client::builder()
            .user_agent(session.user_agent.clone())
            .timeout(Duration::from_secs(session.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .redirect(Policy::none())
            .gzip(true)
            .brotli(true);

        if let Some(endpoint) = &session.proxy {
            let proxy = reqwest::Proxy::all(endpoint)
                .map_err(|e| ConfigError::InvalidProxy(format!("'{}': {}", endpoint, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ConfigError::Validation(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_redirects: session.max_redirects,
        })
    }

    fn classify(url: &Url, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
            }
        } else {
            TransportError::Connection {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }

    fn collect_headers(response: &reqwest::Response) -> Vec<(String, String)> {
        response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).to_string(),
                )
            })
            .collect()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        url: &Url,
        headers: &[(String, String)],
    ) -> Result<FetchedResponse, TransportError> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(TransportError::UnsupportedScheme {
                scheme: url.scheme().to_string(),
            });
        }

        let mut current = url.clone();
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(current.to_string());
        let mut hops = 0u32;

        loop {
            let mut request = self.client.get(current.clone());
            for (name, value) in headers {
                request = request.header(name, value);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Self::classify(&current, e))?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or(TransportError::Status {
                        url: current.to_string(),
                        status: status.as_u16(),
                    })?;

                let next = current
                    .join(location)
                    .map_err(|e| TransportError::Malformed(format!("{}: {}", location, e)))?;

                hops += 1;
                if hops > self.max_redirects {
                    return Err(TransportError::TooManyRedirects {
                        url: url.to_string(),
                        limit: self.max_redirects,
                    });
                }
                if !seen.insert(next.to_string()) {
                    return Err(TransportError::RedirectLoop {
                        url: next.to_string(),
                    });
                }

                tracing::trace!(from = %current, to = %next, hop = hops, "following redirect");
                current = next;
                continue;
            }

            if status.as_u16() == 429 {
                return Err(TransportError::RateLimited {
                    url: current.to_string(),
                });
            }

            if !status.is_success() {
                return Err(TransportError::Status {
                    url: current.to_string(),
                    status: status.as_u16(),
                });
            }

            let collected = Self::collect_headers(&response);
            let body = response
                .bytes()
                .await
                .map_err(|e| Self::classify(&current, e))?
                .to_vec();

            return Ok(FetchedResponse {
                url: current,
                status: status.as_u16(),
                headers: collected,
                body,
            });
        }
    }

    async fn head(&self, url: &Url) -> Result<FetchedResponse, TransportError> {
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| Self::classify(url, e))?;
        let status = response.status();

        if status.as_u16() == 429 {
            return Err(TransportError::RateLimited {
                url: url.to_string(),
            });
        }

        Ok(FetchedResponse {
            url: url.clone(),
            status: status.as_u16(),
            headers: Self::collect_headers(&response),
            body: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session() -> SessionConfig {
        SessionConfig::default()
    }

    #[test]
    fn test_build_direct_transport() {
        let transport = HttpTransport::new(&test_session());
        assert!(transport.is_ok());
    }

    #[test]
    fn test_build_with_socks_proxy() {
        let mut session = test_session();
        session.proxy = Some("socks5h://127.0.0.1:9050".to_string());
        let transport = HttpTransport::new(&session);
        assert!(transport.is_ok());
    }

    #[test]
    fn test_build_with_bad_proxy() {
        let mut session = test_session();
        session.proxy = Some("not a proxy".to_string());
        assert!(matches!(
            HttpTransport::new(&session),
            Err(ConfigError::InvalidProxy(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_scheme_rejected() {
        let transport = HttpTransport::new(&test_session()).unwrap();
        let url = Url::parse("ftp://example.com/file").unwrap();
        let result = transport.fetch(&url, &[]).await;
        assert!(matches!(
            result,
            Err(TransportError::UnsupportedScheme { .. })
        ));
    }
}
