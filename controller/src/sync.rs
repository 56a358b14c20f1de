use serde_json::json;
use tracing::warn;

use autobell_common::protocol::{
    decode_command_poll, decode_registration, decode_schedule_document,
};
use autobell_common::{
    BackendConfig, Command, DeviceIdentity, DeviceStateMachine, RegistrationResult,
    ScheduleDocument, SyncError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
}

/// One remote exchange at the semantic level; the transport decides how it
/// goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport seam for the sync client. The production implementation is
/// [`HttpBackend`]; tests script responses through a fake.
#[allow(async_fn_in_trait)]
pub trait Backend {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SyncError>;
}

/// HTTP transport against the backend's REST surface, authenticated with the
/// provisioned API key on every request.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

impl Backend for HttpBackend {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SyncError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Patch => self.client.patch(&url),
        };

        builder = builder
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key));

        if let Some(body) = request.body {
            builder = builder
                .header("Content-Type", "application/json")
                .body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| SyncError::Network(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| SyncError::Network(err.to_string()))?;

        Ok(ApiResponse { status, body })
    }
}

/// The four remote operations. Each builds a request from current device
/// identity/state, performs one exchange, and decodes the response into core
/// types. None of them retries internally — the orchestrator's intervals are
/// the retry policy.
pub struct SyncClient<B: Backend> {
    backend: B,
}

impl<B: Backend> SyncClient<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub async fn register(
        &self,
        identity: &DeviceIdentity,
        device_name: &str,
    ) -> Result<RegistrationResult, SyncError> {
        let body = json!({
            "p_mac_address": identity.mac_address,
            "p_school_code": identity.school_code,
            "p_device_name": device_name,
        });

        let response = self
            .backend
            .execute(ApiRequest {
                method: Method::Post,
                path: "/rest/v1/rpc/register_device".to_string(),
                body: Some(body.to_string()),
            })
            .await?;

        if !response.is_success() {
            return Err(SyncError::Status(response.status));
        }
        decode_registration(&response.body)
    }

    pub async fn fetch_schedule(
        &self,
        device: &DeviceStateMachine,
    ) -> Result<ScheduleDocument, SyncError> {
        if !device.is_active() {
            return Err(SyncError::NotActive);
        }

        let response = self
            .backend
            .execute(ApiRequest {
                method: Method::Get,
                path: format!(
                    "/rest/v1/rpc/device_schedules?p_mac_address={}",
                    device.identity().mac_address
                ),
                body: None,
            })
            .await?;

        if !response.is_success() {
            return Err(SyncError::Status(response.status));
        }
        decode_schedule_document(&response.body)
    }

    pub async fn poll_command(
        &self,
        device: &DeviceStateMachine,
    ) -> Result<Option<Command>, SyncError> {
        let Some(remote_id) = device.identity().remote_id.as_deref() else {
            return Err(SyncError::NotActive);
        };

        let response = self
            .backend
            .execute(ApiRequest {
                method: Method::Get,
                path: format!(
                    "/rest/v1/command_queue?select=id,command,payload\
                     &status=eq.pending&device_id=eq.{remote_id}\
                     &limit=1&order=created_at.asc"
                ),
                body: None,
            })
            .await?;

        if !response.is_success() {
            return Err(SyncError::Status(response.status));
        }
        decode_command_poll(&response.body)
    }

    /// Best-effort: a failed acknowledgement is logged and never retried.
    /// Execution has already happened by the time the non-disruptive path
    /// gets here, so a failure risks a backend-side redelivery at worst.
    pub async fn acknowledge(&self, command_id: &str) -> bool {
        let request = ApiRequest {
            method: Method::Patch,
            path: format!("/rest/v1/command_queue?id=eq.{command_id}"),
            body: Some(json!({"status": "executed"}).to_string()),
        };

        match self.backend.execute(request).await {
            Ok(response) if response.is_success() => true,
            Ok(response) => {
                warn!(
                    "acknowledge of command {command_id} returned status {}",
                    response.status
                );
                false
            }
            Err(err) => {
                warn!("acknowledge of command {command_id} failed: {err}");
                false
            }
        }
    }

    /// Fire-and-forget liveness signal. Goes through the `update_heartbeat`
    /// RPC rather than patching the device row, which row-level security
    /// rejects and which would leave `last_heartbeat` stale.
    pub async fn send_heartbeat(&self, device: &DeviceStateMachine) -> bool {
        let Some(remote_id) = device.identity().remote_id.as_deref() else {
            return false;
        };

        let request = ApiRequest {
            method: Method::Post,
            path: "/rest/v1/rpc/update_heartbeat".to_string(),
            body: Some(
                json!({
                    "p_device_id": remote_id,
                    "p_status": "online",
                })
                .to_string(),
            ),
        };

        match self.backend.execute(request).await {
            Ok(response) if response.is_success() => true,
            Ok(response) => {
                warn!("heartbeat returned status {}", response.status);
                false
            }
            Err(err) => {
                warn!("heartbeat failed: {err}");
                false
            }
        }
    }
}
