//! HTTP client for the ZBI repository service.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use zbi_manager::model::{
    BlockchainInfo, EventAction, Instance, PolicyInfo, Project, ResourceRequest,
};
use zbi_manager::Repository;

use crate::types::{
    ActivityBody, BlockchainEnvelope, InstanceEnvelope, InstancesEnvelope, PolicyEnvelope,
    ProjectEnvelope, UpdateRequestBody,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SECRET_HEADER: &str = "x-internal-secret";
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct HttpRepository {
    base_url: Url,
    secret: String,
    http: reqwest::Client,
}

impl HttpRepository {
    pub fn new(base_url: &str, secret: &str) -> Result<Self> {
        // A trailing slash makes `join` append to the base path
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).context("Invalid repository URL")?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build repository HTTP client")?;

        Ok(Self {
            base_url,
            secret: secret.to_string(),
            http,
        })
    }

    fn build_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("Failed to join base_url={} with path={}", self.base_url, path))
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Vec<u8>> {
        let url = self.build_url(path)?;
        let req_id = Uuid::new_v4().to_string();

        let mut req = self
            .http
            .request(method.clone(), url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .header(SECRET_HEADER, &self.secret)
            .header(REQUEST_ID_HEADER, &req_id);
        if let Some(b) = body {
            req = req.json(b);
        }

        debug!(method = %method, url = %url, request_id = %req_id, "Repository request");
        let resp = req
            .send()
            .await
            .with_context(|| format!("Request {} {} failed", method, url))?;
        let status = resp.status();
        let bytes = resp.bytes().await.unwrap_or_default();

        if !status.is_success() {
            bail!(
                "{} {} returned {}: {}",
                method,
                url,
                status,
                String::from_utf8_lossy(&bytes)
            );
        }

        Ok(bytes.to_vec())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let bytes = self.send::<()>(Method::GET, path, None).await?;
        serde_json::from_slice(&bytes).with_context(|| format!("Invalid response from {}", path))
    }
}

#[async_trait]
impl Repository for HttpRepository {
    async fn get_policy_info(&self) -> Result<PolicyInfo> {
        let envelope: PolicyEnvelope = self.get("config/policy").await?;
        Ok(envelope.policy)
    }

    async fn get_blockchain_info(&self, name: &str) -> Result<BlockchainInfo> {
        let envelope: BlockchainEnvelope = self.get(&format!("config/blockchains/{}", name)).await?;
        Ok(envelope.blockchain)
    }

    async fn get_project(&self, name: &str) -> Result<Project> {
        let envelope: ProjectEnvelope = self.get(&format!("projects/{}", name)).await?;
        Ok(envelope.project)
    }

    async fn get_project_instances(&self, project: &str) -> Result<Vec<Instance>> {
        let envelope: InstancesEnvelope =
            self.get(&format!("projects/{}/instances", project)).await?;
        Ok(envelope.instances)
    }

    async fn get_instance(&self, id: &str) -> Result<Instance> {
        let envelope: InstanceEnvelope = self.get(&format!("instances/{}", id)).await?;
        Ok(envelope.instance)
    }

    async fn update_instance_request(&self, id: &str, request: &ResourceRequest) -> Result<()> {
        let body = UpdateRequestBody { request };
        self.send(Method::PUT, &format!("instances/{}", id), Some(&body))
            .await?;
        Ok(())
    }

    async fn add_instance_activity(&self, id: &str, action: EventAction, success: bool) -> Result<()> {
        let body = ActivityBody {
            operation: action,
            success,
            completed: true,
        };
        self.send(Method::POST, &format!("instances/{}/activities", id), Some(&body))
            .await?;
        Ok(())
    }
}
