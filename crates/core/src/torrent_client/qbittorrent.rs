//! qBittorrent WebUI client implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::QBittorrentConfig;
use crate::sync::{BatchAction, Rid, Snapshot};

use super::{TorrentClient, TorrentClientError};

/// qBittorrent client implementation.
pub struct QBittorrentClient {
    client: Client,
    config: QBittorrentConfig,
    /// Set once a login succeeded (the cookie itself lives in the jar).
    session: Arc<RwLock<Option<String>>>,
}

impl QBittorrentClient {
    /// Create a new qBittorrent client.
    pub fn new(config: QBittorrentConfig) -> Result<Self, TorrentClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()
            .map_err(|e| TorrentClientError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            session: Arc::new(RwLock::new(None)),
        })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Login and store session cookie.
    async fn login(&self) -> Result<(), TorrentClientError> {
        let url = format!("{}/api/v2/auth/login", self.base_url());

        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            // Newer WebUI versions reject logins without a matching Referer.
            .header(reqwest::header::REFERER, self.base_url())
            .form(&params)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!("qBittorrent login successful");
            let mut session = self.session.write().await;
            *session = Some("authenticated".to_string());
            Ok(())
        } else if body.contains("Fails.") || status == StatusCode::FORBIDDEN {
            Err(TorrentClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(TorrentClientError::AuthenticationFailed(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    /// Ensure we have a valid session, logging in if needed.
    async fn ensure_authenticated(&self) -> Result<(), TorrentClientError> {
        let session = self.session.read().await;
        if session.is_some() {
            return Ok(());
        }
        drop(session);
        self.login().await
    }

    /// Send an authenticated request, logging in again once on a 403.
    ///
    /// `build` is called again for the retry since a sent request cannot be
    /// reused.
    async fn send<F>(&self, build: F) -> Result<(StatusCode, String), TorrentClientError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.ensure_authenticated().await?;

        let mut response = build(&self.client).send().await.map_err(map_send_error)?;

        if response.status() == StatusCode::FORBIDDEN {
            warn!("qBittorrent session expired, re-authenticating");
            {
                let mut session = self.session.write().await;
                *session = None;
            }
            self.login().await?;
            response = build(&self.client).send().await.map_err(map_send_error)?;
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TorrentClientError::ApiError(e.to_string()))?;
        Ok((status, body))
    }

    /// Make an authenticated GET request.
    async fn get(&self, endpoint: &str) -> Result<String, TorrentClientError> {
        let url = format!("{}{}", self.base_url(), endpoint);
        let (status, body) = self.send(|client| client.get(&url)).await?;
        if !status.is_success() {
            return Err(TorrentClientError::ApiError(format!("HTTP {}", status)));
        }
        Ok(body)
    }

    /// Make an authenticated POST request with form data, returning the
    /// status so callers can react to specific codes.
    async fn post_form(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<StatusCode, TorrentClientError> {
        let url = format!("{}{}", self.base_url(), endpoint);
        let (status, body) = self.send(|client| client.post(&url).form(params)).await?;
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(TorrentClientError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(100).collect::<String>()
            )));
        }
        Ok(status)
    }
}

fn map_send_error(e: reqwest::Error) -> TorrentClientError {
    if e.is_timeout() {
        TorrentClientError::Timeout
    } else if e.is_connect() {
        TorrentClientError::ConnectionFailed(e.to_string())
    } else {
        TorrentClientError::ApiError(e.to_string())
    }
}

/// Hashes as the WebUI expects them: one `|`-separated parameter.
fn join_hashes(hashes: &[String]) -> String {
    hashes.join("|")
}

/// `sync/maindata` path for a cursor; no cursor asks for a full snapshot.
fn maindata_endpoint(cursor: Option<Rid>) -> String {
    format!(
        "/api/v2/sync/maindata?rid={}",
        cursor.map(Rid::get).unwrap_or(0)
    )
}

/// Endpoint, fallback endpoint for WebUI 5 naming, and form for an action.
fn action_request(
    action: &BatchAction,
    hashes: &[String],
) -> (&'static str, Option<&'static str>, Vec<(&'static str, String)>) {
    let mut form = vec![("hashes", join_hashes(hashes))];
    match action {
        BatchAction::Pause => ("/api/v2/torrents/pause", Some("/api/v2/torrents/stop"), form),
        BatchAction::Resume => (
            "/api/v2/torrents/resume",
            Some("/api/v2/torrents/start"),
            form,
        ),
        BatchAction::Delete { delete_files } => {
            form.push(("deleteFiles", delete_files.to_string()));
            ("/api/v2/torrents/delete", None, form)
        }
        BatchAction::SetCategory { name } => {
            form.push(("category", name.clone()));
            ("/api/v2/torrents/setCategory", None, form)
        }
    }
}

#[async_trait]
impl TorrentClient for QBittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn fetch_snapshot(&self, cursor: Option<Rid>) -> Result<Snapshot, TorrentClientError> {
        let body = self.get(&maindata_endpoint(cursor)).await?;
        Ok(Snapshot::decode(cursor, &body)?)
    }

    async fn apply_action(
        &self,
        action: &BatchAction,
        hashes: &[String],
    ) -> Result<(), TorrentClientError> {
        let (endpoint, fallback, form) = action_request(action, hashes);

        let mut status = self.post_form(endpoint, &form).await?;
        if status == StatusCode::NOT_FOUND {
            if let Some(fallback) = fallback {
                debug!(endpoint, fallback, "Endpoint missing, trying renamed endpoint");
                status = self.post_form(fallback, &form).await?;
            }
        }

        if status == StatusCode::NOT_FOUND {
            return Err(TorrentClientError::ApiError(format!(
                "{} is not supported by this qBittorrent version",
                action.as_str()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(list: &[&str]) -> Vec<String> {
        list.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn test_join_hashes() {
        assert_eq!(join_hashes(&hashes(&["a"])), "a");
        assert_eq!(join_hashes(&hashes(&["a", "b", "c"])), "a|b|c");
    }

    #[test]
    fn test_maindata_endpoint() {
        assert_eq!(maindata_endpoint(None), "/api/v2/sync/maindata?rid=0");
        assert_eq!(
            maindata_endpoint(Some(Rid(42))),
            "/api/v2/sync/maindata?rid=42"
        );
    }

    #[test]
    fn test_delete_request_carries_delete_files_flag() {
        let (endpoint, fallback, form) = action_request(
            &BatchAction::Delete {
                delete_files: false,
            },
            &hashes(&["H1"]),
        );
        assert_eq!(endpoint, "/api/v2/torrents/delete");
        assert!(fallback.is_none());
        assert_eq!(
            form,
            vec![
                ("hashes", "H1".to_string()),
                ("deleteFiles", "false".to_string())
            ]
        );
    }

    #[test]
    fn test_pause_and_resume_have_renamed_fallbacks() {
        let (endpoint, fallback, form) = action_request(&BatchAction::Pause, &hashes(&["a", "b"]));
        assert_eq!(endpoint, "/api/v2/torrents/pause");
        assert_eq!(fallback, Some("/api/v2/torrents/stop"));
        assert_eq!(form, vec![("hashes", "a|b".to_string())]);

        let (endpoint, fallback, _) = action_request(&BatchAction::Resume, &hashes(&["a"]));
        assert_eq!(endpoint, "/api/v2/torrents/resume");
        assert_eq!(fallback, Some("/api/v2/torrents/start"));
    }

    #[test]
    fn test_set_category_request() {
        let (endpoint, _, form) = action_request(
            &BatchAction::SetCategory {
                name: "movies".to_string(),
            },
            &hashes(&["a", "b"]),
        );
        assert_eq!(endpoint, "/api/v2/torrents/setCategory");
        assert_eq!(form[1], ("category", "movies".to_string()));
    }

    #[test]
    fn test_new_client() {
        let client = QBittorrentClient::new(QBittorrentConfig {
            url: "http://localhost:8081/".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8081");
        assert_eq!(client.name(), "qbittorrent");
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_transport_error() {
        let client = QBittorrentClient::new(QBittorrentConfig {
            url: "http://127.0.0.1:1".to_string(),
            username: String::new(),
            password: String::new(),
            timeout_secs: 2,
        })
        .unwrap();
        let err = client.fetch_snapshot(None).await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err}");
    }
}
