//! HTTP client for the on-device control agent.
//!
//! The agent exposes a small JSON API:
//!
//! - `GET /v1/system/fingerprint` - running system image
//! - `POST /v1/reboot` - reboot the device
//! - `POST /v1/sessions` - open a session
//! - `GET /v1/sessions/:id/boot-configuration` - active boot slot
//! - `GET /v1/sessions/:id/system/fingerprint` - running system image
//! - `DELETE /v1/sessions/:id` - close a session

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reboot_test_artifacts::PackageRepository;
use reboot_test_core::{BootConfiguration, Fingerprint};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::device::{cancellable, Device, Session};
use crate::error::{DeviceError, Result};

/// Connection settings for an [`HttpDevice`].
#[derive(Debug, Clone)]
pub struct HttpDeviceConfig {
    /// Device name.
    pub name: String,
    /// Base URL of the control agent (e.g., "http://192.168.42.2:8080").
    pub base_url: String,
    /// Timeout applied to each individual request.
    pub request_timeout: Duration,
    /// Interval between polls while waiting for the device to go down or come up.
    pub poll_interval: Duration,
    /// How long a reboot waits to see the agent stop answering.
    ///
    /// A device that goes down and comes back between two polls never looks
    /// offline. Once this window passes the reboot falls through to waiting
    /// for the agent to answer.
    pub offline_timeout: Duration,
}

impl HttpDeviceConfig {
    /// Create a configuration with default timeouts.
    #[must_use]
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(2),
            offline_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FingerprintResponse {
    fingerprint: String,
}

#[derive(Debug, Deserialize)]
struct BootConfigurationResponse {
    active: Option<String>,
}

#[derive(Debug, Serialize)]
struct StartSessionRequest<'a> {
    repository_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct StartSessionResponse {
    session_id: String,
}

/// Error response from the agent.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Map a non-success response to `DeviceError::Agent`.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let message = response
        .json::<ErrorResponse>()
        .await
        .map(|e| e.error)
        .unwrap_or_else(|_| format!("agent returned status {status}"));

    Err(DeviceError::Agent {
        status: status.as_u16(),
        message,
    })
}

fn transport_error(e: &reqwest::Error) -> DeviceError {
    DeviceError::Unreachable(e.to_string())
}

async fn get_fingerprint(client: &reqwest::Client, url: &str) -> Result<Fingerprint> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| transport_error(&e))?;
    let body: FingerprintResponse = check_status(response)
        .await?
        .json()
        .await
        .map_err(|e| DeviceError::InvalidResponse(e.to_string()))?;
    Ok(Fingerprint::from_hex(&body.fingerprint)?)
}

/// A device reached through its HTTP control agent.
#[derive(Debug)]
pub struct HttpDevice {
    client: reqwest::Client,
    config: HttpDeviceConfig,
    closed: AtomicBool,
}

impl HttpDevice {
    /// Create a device handle without contacting the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: HttpDeviceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| DeviceError::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            closed: AtomicBool::new(false),
        })
    }

    /// Create a device handle and confirm the agent answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created or the agent does not answer.
    pub async fn connect(config: HttpDeviceConfig, cancel: &CancellationToken) -> Result<Self> {
        let device = Self::new(config)?;
        let fingerprint = device.system_image_fingerprint(cancel).await?;
        tracing::info!(
            device = %device.config.name,
            endpoint = %device.config.base_url,
            fingerprint = %fingerprint.short(),
            "Connected to device"
        );
        Ok(device)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    async fn is_answering(&self) -> bool {
        get_fingerprint(&self.client, &self.url("/v1/system/fingerprint"))
            .await
            .is_ok()
    }

    /// Poll until the agent's answering state equals `online`.
    async fn wait_until(&self, cancel: &CancellationToken, online: bool) -> Result<()> {
        cancellable(cancel, async {
            while self.is_answering().await != online {
                tokio::time::sleep(self.config.poll_interval).await;
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl Device for HttpDevice {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn endpoint(&self) -> &str {
        &self.config.base_url
    }

    async fn system_image_fingerprint(&self, cancel: &CancellationToken) -> Result<Fingerprint> {
        let url = self.url("/v1/system/fingerprint");
        cancellable(cancel, get_fingerprint(&self.client, &url)).await
    }

    async fn start_session(
        &self,
        cancel: &CancellationToken,
        repository: &PackageRepository,
    ) -> Result<Box<dyn Session>> {
        let request = StartSessionRequest {
            repository_url: repository.url(),
        };

        let body: StartSessionResponse = cancellable(cancel, async {
            let response = self
                .client
                .post(self.url("/v1/sessions"))
                .json(&request)
                .send()
                .await
                .map_err(|e| transport_error(&e))?;
            check_status(response)
                .await?
                .json()
                .await
                .map_err(|e| DeviceError::InvalidResponse(e.to_string()))
        })
        .await?;

        tracing::debug!(device = %self.config.name, session_id = %body.session_id, "Started session");

        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            base_url: self.config.base_url.clone(),
            id: body.session_id,
            closed: false,
        }))
    }

    async fn reboot(&self, cancel: &CancellationToken) -> Result<()> {
        tracing::info!(device = %self.config.name, "Rebooting device");

        let sent = cancellable(cancel, async {
            Ok(self.client.post(self.url("/v1/reboot")).send().await)
        })
        .await?;

        match sent {
            Ok(response) => {
                check_status(response).await?;
            }
            Err(e) if e.is_connect() => return Err(transport_error(&e)),
            // The agent may go down before it finishes answering.
            Err(e) => {
                tracing::debug!(device = %self.config.name, error = %e, "Reboot request interrupted");
            }
        }

        match tokio::time::timeout(self.config.offline_timeout, self.wait_until(cancel, false)).await
        {
            Ok(result) => {
                result?;
                tracing::debug!(device = %self.config.name, "Device went offline");
            }
            Err(_) => tracing::warn!(
                device = %self.config.name,
                offline_timeout = ?self.config.offline_timeout,
                "Device never seen offline, waiting for it to answer"
            ),
        }
        self.wait_until(cancel, true).await?;
        tracing::info!(device = %self.config.name, "Device back online");
        Ok(())
    }

    async fn wait_for_online(&self, cancel: &CancellationToken) -> Result<()> {
        self.wait_until(cancel, true).await
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(device = %self.config.name, "Closed device handle");
        }
    }
}

/// A session with the device control agent.
#[derive(Debug)]
pub struct HttpSession {
    client: reqwest::Client,
    base_url: String,
    id: String,
    closed: bool,
}

impl HttpSession {
    fn url(&self, path: &str) -> String {
        format!("{}/v1/sessions/{}{path}", self.base_url, self.id)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(DeviceError::SessionClosed(self.id.clone()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Session for HttpSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn active_configuration(&self, cancel: &CancellationToken) -> Result<BootConfiguration> {
        self.ensure_open()?;

        let body: BootConfigurationResponse = cancellable(cancel, async {
            let response = self
                .client
                .get(self.url("/boot-configuration"))
                .send()
                .await
                .map_err(|e| transport_error(&e))?;
            check_status(response)
                .await?
                .json()
                .await
                .map_err(|e| DeviceError::InvalidResponse(e.to_string()))
        })
        .await?;

        Ok(BootConfiguration::from_reported(body.active.as_deref())?)
    }

    async fn system_image_fingerprint(&self, cancel: &CancellationToken) -> Result<Fingerprint> {
        self.ensure_open()?;
        let url = self.url("/system/fingerprint");
        cancellable(cancel, get_fingerprint(&self.client, &url)).await
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let response = self
            .client
            .delete(self.url(""))
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        check_status(response).await?;

        tracing::debug!(session_id = %self.id, "Closed session");
        Ok(())
    }
}

impl Drop for HttpSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Abandoned without close, e.g. when a timed out cycle is dropped.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let request = self.client.delete(self.url(""));
            let id = self.id.clone();
            handle.spawn(async move {
                if let Err(e) = request.send().await {
                    tracing::debug!(session_id = %id, error = %e, "Failed to release abandoned session");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HEX: &str = "0101010101010101010101010101010101010101010101010101010101010101";

    fn device_for(server: &MockServer) -> HttpDevice {
        let mut config = HttpDeviceConfig::new("test-device", server.uri());
        config.poll_interval = Duration::from_millis(10);
        HttpDevice::new(config).unwrap()
    }

    async fn mount_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/sessions"))
            .and(body_json(serde_json::json!({ "repository_url": "file:///repo" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "session_id": "s1" })),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn config_trims_trailing_slash() {
        let config = HttpDeviceConfig::new("dev", "http://10.0.0.2:8080/");
        assert_eq!(config.base_url, "http://10.0.0.2:8080");
    }

    #[tokio::test]
    async fn fingerprint_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/system/fingerprint"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "fingerprint": HEX })),
            )
            .mount(&server)
            .await;

        let device = device_for(&server);
        let fingerprint = device
            .system_image_fingerprint(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fingerprint.to_hex(), HEX);
    }

    #[tokio::test]
    async fn agent_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/system/fingerprint"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(serde_json::json!({ "error": "booting" })),
            )
            .mount(&server)
            .await;

        let device = device_for(&server);
        let err = device
            .system_image_fingerprint(&CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            DeviceError::Agent { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "booting");
            }
            other => panic!("expected Agent error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn session_queries_and_close() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/sessions/s1/boot-configuration"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "active": "b" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1/sessions/s1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let device = device_for(&server);
        let cancel = CancellationToken::new();
        let repo = PackageRepository::new("/repo", "file:///repo");

        let mut session = device.start_session(&cancel, &repo).await.unwrap();
        assert_eq!(session.id(), "s1");
        assert_eq!(
            session.active_configuration(&cancel).await.unwrap(),
            BootConfiguration::B
        );

        session.close().await.unwrap();
        // Second close is a no-op and must not hit the agent again.
        session.close().await.unwrap();

        let err = session.active_configuration(&cancel).await.unwrap_err();
        assert!(matches!(err, DeviceError::SessionClosed(_)));
    }

    #[tokio::test]
    async fn missing_configuration_is_unsupported() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/sessions/s1/boot-configuration"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "active": null })),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let device = device_for(&server);
        let cancel = CancellationToken::new();
        let repo = PackageRepository::new("/repo", "file:///repo");

        let mut session = device.start_session(&cancel, &repo).await.unwrap();
        assert_eq!(
            session.active_configuration(&cancel).await.unwrap(),
            BootConfiguration::Unsupported
        );
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn session_start_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sessions"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(serde_json::json!({ "error": "no agent" })),
            )
            .mount(&server)
            .await;

        let device = device_for(&server);
        let repo = PackageRepository::new("/repo", "file:///repo");
        let result = device.start_session(&CancellationToken::new(), &repo).await;
        assert!(matches!(result, Err(DeviceError::Agent { status: 500, .. })));
    }

    #[tokio::test]
    async fn unreachable_device() {
        let mut config = HttpDeviceConfig::new("gone", "http://127.0.0.1:1");
        config.request_timeout = Duration::from_millis(200);
        let device = HttpDevice::new(config).unwrap();

        let err = device
            .system_image_fingerprint(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_unreachable());
    }

    #[tokio::test]
    async fn cancelled_wait_for_online() {
        let mut config = HttpDeviceConfig::new("gone", "http://127.0.0.1:1");
        config.request_timeout = Duration::from_millis(50);
        config.poll_interval = Duration::from_millis(10);
        let device = HttpDevice::new(config).unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = device.wait_for_online(&cancel).await.unwrap_err();
        assert!(matches!(err, DeviceError::Cancelled));
    }

    #[tokio::test]
    async fn reboot_missed_between_polls_still_completes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/reboot"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/system/fingerprint"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "fingerprint": HEX })),
            )
            .mount(&server)
            .await;

        let mut config = HttpDeviceConfig::new("fast-boot", server.uri());
        config.poll_interval = Duration::from_millis(10);
        config.offline_timeout = Duration::from_millis(100);
        let device = HttpDevice::new(config).unwrap();

        tokio::time::timeout(Duration::from_secs(5), device.reboot(&CancellationToken::new()))
            .await
            .expect("reboot kept waiting for the device to go offline")
            .unwrap();
    }

    #[tokio::test]
    async fn connect_probes_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/system/fingerprint"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "fingerprint": HEX })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = HttpDeviceConfig::new("probe", server.uri());
        let device = HttpDevice::connect(config, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(device.name(), "probe");
        device.close().await;
    }
}
