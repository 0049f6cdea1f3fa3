//! Vercel project domains API client

use async_trait::async_trait;
use hostgate_shared::CustomDomain;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use super::{DomainProvisioner, ProvisioningError, ProvisioningStatus};

/// Maximum number of retries for transient failures
const MAX_RETRIES: usize = 2;

/// Backoff base; delays grow 100ms, 200ms, ...
const RETRY_BASE_MS: u64 = 2;
const RETRY_FACTOR: u64 = 50;

/// Upper bound for any single backoff delay
const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// Error codes Vercel uses when the domain is already on this project
const ALREADY_ATTACHED_CODES: &[&str] = &["domain_already_exists", "domain_already_in_project"];

#[derive(Debug, Clone)]
pub struct VercelSettings {
    pub api_url: String,
    pub token: String,
    pub project_id: String,
    pub team_id: Option<String>,
    pub request_timeout: Duration,
}

/// Vercel client for one project
pub struct VercelClient {
    http: Client,
    base: Url,
    token: String,
    project_id: String,
    team_id: Option<String>,
}

/// Non-retryable response from the API
struct ApiResponse {
    status: StatusCode,
    body: Value,
}

impl ApiResponse {
    fn error_code(&self) -> Option<&str> {
        self.body["error"]["code"].as_str()
    }

    fn error_message(&self) -> String {
        self.body["error"]["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", self.status))
    }

    /// Map a failed response that is neither retryable nor handled by the caller
    fn into_error(self) -> ProvisioningError {
        match self.status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ProvisioningError::Misconfigured(self.error_message())
            }
            _ => ProvisioningError::Rejected(self.error_message()),
        }
    }
}

impl VercelClient {
    pub fn new(settings: VercelSettings) -> Result<Self, ProvisioningError> {
        let base = Url::parse(&settings.api_url)
            .map_err(|e| ProvisioningError::Misconfigured(format!("VERCEL_API_URL: {}", e)))?;
        if base.cannot_be_a_base() {
            return Err(ProvisioningError::Misconfigured(
                "VERCEL_API_URL must be an http(s) URL".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(settings.request_timeout)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| ProvisioningError::Misconfigured(e.to_string()))?;

        Ok(Self {
            http,
            base,
            token: settings.token,
            project_id: settings.project_id,
            team_id: settings.team_id,
        })
    }

    /// `/v10/projects/{project}/domains[/...]`, with `teamId` when configured
    fn endpoint(&self, extra: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v10", "projects", self.project_id.as_str(), "domains"])
                .extend(extra);
        }
        if let Some(team_id) = &self.team_id {
            url.query_pairs_mut().append_pair("teamId", team_id);
        }
        url
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ProvisioningError> {
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProvisioningError::Timeout
            } else {
                ProvisioningError::Transient(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProvisioningError::RateLimited);
        }
        if status.is_server_error() {
            return Err(ProvisioningError::Transient(format!("HTTP {}", status)));
        }

        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok(ApiResponse { status, body })
    }

    /// Send with exponential backoff on transient failures
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<ApiResponse, ProvisioningError> {
        use tokio_retry::strategy::{jitter, ExponentialBackoff};
        use tokio_retry::RetryIf;

        let strategy = ExponentialBackoff::from_millis(RETRY_BASE_MS)
            .factor(RETRY_FACTOR)
            .max_delay(RETRY_MAX_DELAY)
            .map(jitter)
            .take(MAX_RETRIES);

        RetryIf::spawn(
            strategy,
            || async {
                let result = self.send_once(&method, &url, body.as_ref()).await;
                if let Err(e) = &result {
                    tracing::debug!(method = %method, path = url.path(), error = %e, "Vercel request failed");
                }
                result
            },
            |e: &ProvisioningError| e.is_retryable(),
        )
        .await
    }
}

#[async_trait]
impl DomainProvisioner for VercelClient {
    fn name(&self) -> &'static str {
        "vercel"
    }

    async fn add_domain(&self, domain: &CustomDomain) -> Result<(), ProvisioningError> {
        let response = self
            .send(
                Method::POST,
                self.endpoint(&[]),
                Some(json!({ "name": domain.domain })),
            )
            .await?;

        if response.status.is_success() {
            tracing::info!(domain = %domain.domain, "Domain added to Vercel project");
            return Ok(());
        }

        if response
            .error_code()
            .is_some_and(|code| ALREADY_ATTACHED_CODES.contains(&code))
        {
            return Ok(());
        }

        tracing::warn!(
            domain = %domain.domain,
            status = %response.status,
            code = ?response.error_code(),
            "Vercel refused domain"
        );
        Err(response.into_error())
    }

    async fn check_verification(
        &self,
        domain: &CustomDomain,
    ) -> Result<ProvisioningStatus, ProvisioningError> {
        let response = self
            .send(
                Method::POST,
                self.endpoint(&[domain.domain.as_str(), "verify"]),
                None,
            )
            .await?;

        match response.status {
            s if s.is_success() => {
                if response.body["verified"].as_bool().unwrap_or(false) {
                    Ok(ProvisioningStatus::Verified)
                } else {
                    Ok(ProvisioningStatus::Pending)
                }
            }
            // DNS not in place yet
            StatusCode::BAD_REQUEST => Ok(ProvisioningStatus::Pending),
            // Lost from the project (e.g. the initial add was deferred)
            StatusCode::NOT_FOUND => {
                tracing::info!(domain = %domain.domain, "Domain missing from Vercel project, re-adding");
                self.add_domain(domain).await?;
                Ok(ProvisioningStatus::Pending)
            }
            _ => Err(response.into_error()),
        }
    }

    async fn remove_domain(&self, domain: &str) -> Result<(), ProvisioningError> {
        let response = self
            .send(Method::DELETE, self.endpoint(&[domain]), None)
            .await?;

        if response.status.is_success() || response.status == StatusCode::NOT_FOUND {
            tracing::info!(domain = %domain, "Domain removed from Vercel project");
            return Ok(());
        }
        Err(response.into_error())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use hostgate_shared::DomainStatus;
    use mockito::{Matcher, Server};
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn client(url: &str, team_id: Option<&str>) -> VercelClient {
        VercelClient::new(VercelSettings {
            api_url: url.to_string(),
            token: "test-token".to_string(),
            project_id: "prj_1".to_string(),
            team_id: team_id.map(str::to_string),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn domain(name: &str) -> CustomDomain {
        CustomDomain {
            id: Uuid::new_v4(),
            domain: name.to_string(),
            tenant_id: Uuid::new_v4(),
            cname: "alif-12345678.cname.example.com".to_string(),
            status: DomainStatus::Pending,
            verified_at: None,
            verification_attempts: 0,
            last_checked_at: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn test_endpoint_includes_team() {
        let client = client("https://api.vercel.com", Some("team_9"));
        assert_eq!(
            client.endpoint(&["alif.com", "verify"]).as_str(),
            "https://api.vercel.com/v10/projects/prj_1/domains/alif.com/verify?teamId=team_9"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = VercelClient::new(VercelSettings {
            api_url: "not a url".to_string(),
            token: "t".to_string(),
            project_id: "p".to_string(),
            team_id: None,
            request_timeout: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(ProvisioningError::Misconfigured(_))));
    }

    #[tokio::test]
    async fn test_add_domain_sends_name_and_team() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v10/projects/prj_1/domains")
            .match_query(Matcher::UrlEncoded("teamId".into(), "team_9".into()))
            .match_header("authorization", "Bearer test-token")
            .match_body(Matcher::Json(json!({ "name": "alif.com" })))
            .with_status(200)
            .with_body(r#"{"name":"alif.com","apexName":"alif.com","verified":false}"#)
            .create_async()
            .await;

        let client = client(&server.url(), Some("team_9"));
        client.add_domain(&domain("alif.com")).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_add_domain_already_attached_is_ok() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v10/projects/prj_1/domains")
            .with_status(409)
            .with_body(r#"{"error":{"code":"domain_already_in_project","message":"exists"}}"#)
            .create_async()
            .await;

        let client = client(&server.url(), None);
        assert!(client.add_domain(&domain("alif.com")).await.is_ok());
    }

    #[tokio::test]
    async fn test_add_domain_owned_elsewhere_is_rejected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v10/projects/prj_1/domains")
            .with_status(409)
            .with_body(r#"{"error":{"code":"domain_already_in_use","message":"in use by another project"}}"#)
            .create_async()
            .await;

        let client = client(&server.url(), None);
        let err = client.add_domain(&domain("alif.com")).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::Rejected(msg) if msg.contains("another project")));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v10/projects/prj_1/domains")
            .with_status(502)
            .expect(MAX_RETRIES + 1)
            .create_async()
            .await;

        let client = client(&server.url(), None);
        let err = client.add_domain(&domain("alif.com")).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::Transient(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_credentials_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v10/projects/prj_1/domains")
            .with_status(403)
            .with_body(r#"{"error":{"code":"forbidden","message":"Not authorized"}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client(&server.url(), None);
        let err = client.add_domain(&domain("alif.com")).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::Misconfigured(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_check_verified() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v10/projects/prj_1/domains/alif.com/verify")
            .with_status(200)
            .with_body(r#"{"name":"alif.com","verified":true}"#)
            .create_async()
            .await;

        let client = client(&server.url(), None);
        assert_eq!(
            client.check_verification(&domain("alif.com")).await.unwrap(),
            ProvisioningStatus::Verified
        );
    }

    #[tokio::test]
    async fn test_check_unverified_is_pending() {
        let mut server = Server::new_async().await;
        let _verify = server
            .mock("POST", "/v10/projects/prj_1/domains/alif.com/verify")
            .with_status(400)
            .with_body(r#"{"error":{"code":"missing_txt_record","message":"not yet"}}"#)
            .create_async()
            .await;

        let client = client(&server.url(), None);
        assert_eq!(
            client.check_verification(&domain("alif.com")).await.unwrap(),
            ProvisioningStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_check_missing_domain_is_re_added() {
        let mut server = Server::new_async().await;
        let _verify = server
            .mock("POST", "/v10/projects/prj_1/domains/alif.com/verify")
            .with_status(404)
            .with_body(r#"{"error":{"code":"not_found","message":"missing"}}"#)
            .create_async()
            .await;
        let add = server
            .mock("POST", "/v10/projects/prj_1/domains")
            .with_status(200)
            .with_body(r#"{"name":"alif.com","verified":false}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client(&server.url(), None);
        assert_eq!(
            client.check_verification(&domain("alif.com")).await.unwrap(),
            ProvisioningStatus::Pending
        );
        add.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v10/projects/prj_1/domains/alif.com/verify")
            .with_status(429)
            .create_async()
            .await;

        let client = client(&server.url(), None);
        let err = client
            .check_verification(&domain("alif.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::RateLimited));
    }

    #[tokio::test]
    async fn test_remove_unknown_domain_is_ok() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/v10/projects/prj_1/domains/alif.com")
            .with_status(404)
            .create_async()
            .await;

        let client = client(&server.url(), None);
        client.remove_domain("alif.com").await.unwrap();
        mock.assert_async().await;
    }
}
