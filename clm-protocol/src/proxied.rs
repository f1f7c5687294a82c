use crate::client::WorkerClient;
use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::{
    PollRequest, PollResponse, RegisterRequest, RegisterResponse, ReportFailureRequest,
    ReportSuccessRequest, WireJob,
};
use async_trait::async_trait;
use clm_common::{ExecutionMode, JobType, StructuredError};
use reqwest::Client;
use std::time::Duration;

/// Speaks to the loopback sidecar over HTTP. Used by workers started through
/// the `ContainerizedExecutor`, which run inside a container and reach the
/// host via its published loopback port (spec.md §4.2, §4.3).
pub struct ProxiedClient {
    base_url: String,
    http: Client,
}

impl ProxiedClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: Client::new(),
        }
    }

    async fn check(resp: reqwest::Response) -> ProtocolResult<reqwest::Response> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(ProtocolError::SidecarStatus { status, body })
        }
    }
}

#[async_trait]
impl WorkerClient for ProxiedClient {
    async fn register(
        &self,
        worker_type: JobType,
        execution_mode: ExecutionMode,
        executor_id: &str,
    ) -> ProtocolResult<i64> {
        let resp = self
            .http
            .post(format!("{}/workers/register", self.base_url))
            .json(&RegisterRequest {
                worker_type,
                execution_mode,
                executor_id: executor_id.to_string(),
            })
            .send()
            .await?;
        let body: RegisterResponse = Self::check(resp).await?.json().await?;
        Ok(body.worker_id)
    }

    async fn poll(
        &self,
        worker_type: JobType,
        worker_id: i64,
        wait_up_to: Duration,
    ) -> ProtocolResult<Option<WireJob>> {
        let resp = self
            .http
            .post(format!("{}/workers/{worker_id}/poll", self.base_url))
            .timeout(wait_up_to + Duration::from_secs(5))
            .json(&PollRequest {
                job_type: worker_type,
                wait_up_to,
            })
            .send()
            .await?;
        let body: PollResponse = Self::check(resp).await?.json().await?;
        Ok(body.job)
    }

    async fn heartbeat(&self, worker_id: i64) -> ProtocolResult<()> {
        let resp = self
            .http
            .post(format!("{}/workers/{worker_id}/heartbeat", self.base_url))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn report_success(
        &self,
        job_id: i64,
        worker_id: i64,
        content_hash: &str,
        cell_outputs: Option<serde_json::Value>,
    ) -> ProtocolResult<()> {
        let resp = self
            .http
            .post(format!("{}/jobs/{job_id}/success", self.base_url))
            .json(&ReportSuccessRequest {
                worker_id,
                content_hash: content_hash.to_string(),
                cell_outputs,
            })
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn report_failure(
        &self,
        job_id: i64,
        worker_id: i64,
        error: StructuredError,
    ) -> ProtocolResult<()> {
        let resp = self
            .http
            .post(format!("{}/jobs/{job_id}/failure", self.base_url))
            .json(&ReportFailureRequest { worker_id, error })
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn deregister(&self, worker_id: i64) -> ProtocolResult<()> {
        let resp = self
            .http
            .post(format!("{}/workers/{worker_id}/deregister", self.base_url))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}
