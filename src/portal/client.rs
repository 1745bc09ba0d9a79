//! Cookie-authenticated HTTP access to the portal.
//!
//! Every page is server-rendered HTML, so responses come back as text and
//! the callers parse them. Status codes are checked here; content is not.

use std::sync::Arc;

use anyhow::Context;
use reqwest::cookie::Jar;
use reqwest::{Client, RequestBuilder, StatusCode, Url};

use crate::config::ResolvedConfig;
use crate::error::PortalError;
use crate::session::SessionData;

/// A rendered portal page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: Url,
    pub body: String,
}

/// Portal HTTP client carrying the captured session cookies.
pub struct PortalClient {
    client: Client,
    base_url: Url,
    login_path: String,
}

impl PortalClient {
    /// Build a client whose cookie jar is seeded with the session's cookies.
    pub fn new(config: &ResolvedConfig, session: &SessionData) -> anyhow::Result<Self> {
        let jar = Jar::default();
        for (name, value) in &session.cookies {
            jar.add_cookie_str(&format!("{name}={value}; Path=/"), &config.base_url);
        }

        let client = Client::builder()
            .user_agent(config.http.user_agent.as_str())
            .timeout(config.http.timeout)
            .cookie_provider(Arc::new(jar))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            login_path: config.endpoints.login.clone(),
        })
    }

    /// Resolve a configured path against the portal base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, PortalError> {
        self.base_url.join(path).map_err(|e| {
            PortalError::unexpected_page(&self.base_url, format!("bad endpoint path {path:?}: {e}"))
        })
    }

    pub async fn get(&self, url: &Url, query: &[(&str, &str)]) -> Result<Page, PortalError> {
        tracing::debug!(%url, "GET");
        let req = self
            .client
            .get(url.clone())
            .query(query)
            .header("accept", "text/html,application/xhtml+xml")
            .header("referer", self.base_url.as_str());
        self.send(req, url).await
    }

    /// POST an `application/x-www-form-urlencoded` body. Pairs are sent in
    /// the given order, duplicates included.
    pub async fn post_form(
        &self,
        url: &Url,
        form: &[(String, String)],
    ) -> Result<Page, PortalError> {
        tracing::debug!(%url, fields = form.len(), "POST");
        let req = self
            .client
            .post(url.clone())
            .form(form)
            .header("accept", "text/html,application/xhtml+xml")
            .header("origin", self.base_url.origin().ascii_serialization())
            .header("referer", self.base_url.as_str());
        self.send(req, url).await
    }

    async fn send(&self, req: RequestBuilder, url: &Url) -> Result<Page, PortalError> {
        let response = req
            .send()
            .await
            .map_err(|e| PortalError::transport(url, e))?;

        let status = response.status();
        let final_url = response.url().clone();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PortalError::AuthExpired {
                url: final_url.to_string(),
            });
        }
        if self.is_login_page(&final_url) {
            return Err(PortalError::AuthExpired {
                url: final_url.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| PortalError::transport(url, e))?;

        if status.is_server_error() {
            return Err(PortalError::Transport {
                url: url.to_string(),
                message: format!("HTTP {status}: {}", snippet(&body)),
            });
        }
        if !status.is_success() {
            return Err(PortalError::unexpected_page(
                url,
                format!("HTTP {status}: {}", snippet(&body)),
            ));
        }

        Ok(Page {
            url: final_url,
            body,
        })
    }

    fn is_login_page(&self, url: &Url) -> bool {
        let login = self.login_path.trim_end_matches('/');
        !login.is_empty() && url.path().trim_end_matches('/') == login
    }
}

fn snippet(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(300)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    &body[..end]
}
