// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! OCI Load Balancing REST client.
//!
//! Implements [`LoadBalancerApi`] over `https://<endpoint>/20170115`. Every
//! mutation is asynchronous on the provider and answers with an
//! `opc-work-request-id` header; the adapter polls
//! `loadBalancerWorkRequests/{id}` for completion.
//!
//! When `auth_token_file` is configured the file is re-read for every request
//! and sent as a bearer token, so a sidecar can rotate it.

pub mod wire;

use super::{ChangeOp, CreateLoadBalancer, LoadBalancerApi, WorkRequestStatus};
use crate::annotations::OWNERSHIP_TAG_KEY;
use crate::config::ApiConfig;
use crate::constants::{API_VERSION_PATH, LIST_PAGE_LIMIT};
use crate::errors::ApiError;
use crate::model::{ObservedLoadBalancer, WorkRequestId};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method, Response, StatusCode};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, error};
use url::Url;
use wire::{
    BackendDetails, BackendSetDetails, CertificateDetails, CreateLoadBalancerDetails, ErrorBody,
    ListenerDetails, LoadBalancer, PathRouteSetDetails, UpdateLoadBalancerDetails,
    UpdateShapeDetails, WorkRequest,
};

const HEADER_WORK_REQUEST_ID: &str = "opc-work-request-id";
const HEADER_NEXT_PAGE: &str = "opc-next-page";
const HEADER_RETRY_TOKEN: &str = "opc-retry-token";

/// Production [`LoadBalancerApi`] backed by the OCI REST API.
pub struct OciLoadBalancerClient {
    http: HttpClient,
    base: Url,
    token_file: Option<PathBuf>,
}

impl OciLoadBalancerClient {
    /// Build a client from the `api` configuration block.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Transport` if the endpoint is not a base URL or the
    /// HTTP client cannot be constructed.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let base = Url::parse(&config.endpoint).map_err(|e| {
            ApiError::Transport(format!("invalid endpoint {}: {e}", config.endpoint))
        })?;
        if base.cannot_be_a_base() {
            return Err(ApiError::Transport(format!(
                "endpoint {} cannot be used as a base URL",
                config.endpoint
            )));
        }

        let http = HttpClient::builder()
            .timeout(config.call_timeout())
            .build()?;

        Ok(Self {
            http,
            base,
            token_file: config.auth_token_file.clone(),
        })
    }

    /// `<endpoint>/20170115/<segments...>`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Transport(format!("{} is not a base URL", self.base)))?
            .pop_if_empty()
            .push(API_VERSION_PATH)
            .extend(segments);
        Ok(url)
    }

    async fn token(&self) -> Result<Option<String>, ApiError> {
        let Some(path) = &self.token_file else {
            return Ok(None);
        };
        let token = tokio::fs::read_to_string(path).await.map_err(|e| {
            ApiError::Transport(format!("failed to read token file {}: {e}", path.display()))
        })?;
        Ok(Some(token.trim().to_string()))
    }

    /// Send one request and turn non-2xx responses into `ApiError::Status`.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
        retry_token: Option<&str>,
    ) -> Result<Response, ApiError> {
        debug!(method = %method, url = %url, "OCI API request");

        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(token) = self.token().await? {
            request = request.bearer_auth(token);
        }
        if let Some(retry_token) = retry_token {
            request = request.header(HEADER_RETRY_TOKEN, retry_token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.code, body.message),
            Err(_) => (status.canonical_reason().unwrap_or("Unknown").to_string(), text),
        };

        if status != StatusCode::NOT_FOUND {
            error!(
                method = %method,
                url = %url,
                status = %status,
                code = %code,
                error = %message,
                "OCI API request failed"
            );
        }

        Err(ApiError::Status {
            status: status.as_u16(),
            code,
            message,
        })
    }

    async fn mutate<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
        retry_token: Option<&str>,
    ) -> Result<WorkRequestId, ApiError> {
        let response = self.send(method, url, body, retry_token).await?;
        work_request_id(&response)
    }
}

fn work_request_id(response: &Response) -> Result<WorkRequestId, ApiError> {
    response
        .headers()
        .get(HEADER_WORK_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(|v| WorkRequestId(v.to_string()))
        .ok_or_else(|| ApiError::Decode(format!("response has no {HEADER_WORK_REQUEST_ID} header")))
}

fn next_page(response: &Response) -> Option<String> {
    response
        .headers()
        .get(HEADER_NEXT_PAGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl LoadBalancerApi for OciLoadBalancerClient {
    async fn find(
        &self,
        compartment: &str,
        owner: &str,
    ) -> Result<Option<ObservedLoadBalancer>, ApiError> {
        let mut page: Option<String> = None;
        loop {
            let mut url = self.url(&["loadBalancers"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("compartmentId", compartment);
                query.append_pair("limit", &LIST_PAGE_LIMIT.to_string());
                if let Some(page) = &page {
                    query.append_pair("page", page);
                }
            }

            let response = self.send(Method::GET, url, None::<&()>, None).await?;
            let next = next_page(&response);
            let items: Vec<LoadBalancer> = response.json().await?;

            let owned = items.into_iter().find(|lb| {
                lb.lifecycle_state != "DELETED"
                    && lb.freeform_tags.get(OWNERSHIP_TAG_KEY).map(String::as_str) == Some(owner)
            });
            if let Some(lb) = owned {
                return Ok(Some(lb.into_observed()));
            }

            match next {
                Some(token) => page = Some(token),
                None => return Ok(None),
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<ObservedLoadBalancer>, ApiError> {
        let url = self.url(&["loadBalancers", id])?;
        match self.send(Method::GET, url, None::<&()>, None).await {
            Ok(response) => {
                let lb: LoadBalancer = response.json().await?;
                Ok(Some(lb.into_observed()))
            }
            Err(ApiError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, request: &CreateLoadBalancer) -> Result<WorkRequestId, ApiError> {
        let url = self.url(&["loadBalancers"])?;
        let body = CreateLoadBalancerDetails::from_spec(&request.spec, &request.certificates);
        self.mutate(Method::POST, url, Some(&body), Some(&request.retry_token))
            .await
    }

    async fn update(&self, id: &str, op: &ChangeOp) -> Result<WorkRequestId, ApiError> {
        match op {
            ChangeOp::UpdateShape { shape } => {
                let url = self.url(&["loadBalancers", id, "updateShape"])?;
                let body = UpdateShapeDetails {
                    shape_name: shape.clone(),
                };
                self.mutate(Method::PUT, url, Some(&body), None).await
            }
            ChangeOp::CreateCertificate { name, bundle } => {
                let url = self.url(&["loadBalancers", id, "certificates"])?;
                let body = CertificateDetails::from_bundle(name, bundle);
                self.mutate(Method::POST, url, Some(&body), None).await
            }
            ChangeOp::CreateBackendSet { name, spec } => {
                let url = self.url(&["loadBalancers", id, "backendSets"])?;
                let body = BackendSetDetails::from_spec(Some(name), spec);
                self.mutate(Method::POST, url, Some(&body), None).await
            }
            ChangeOp::UpdateBackendSet { name, spec } => {
                let url = self.url(&["loadBalancers", id, "backendSets", name])?;
                let body = BackendSetDetails::from_spec(None, spec);
                self.mutate(Method::PUT, url, Some(&body), None).await
            }
            ChangeOp::AddBackend {
                backend_set,
                backend,
            } => {
                let url = self.url(&["loadBalancers", id, "backendSets", backend_set, "backends"])?;
                let body = BackendDetails::from(backend);
                self.mutate(Method::POST, url, Some(&body), None).await
            }
            ChangeOp::RemoveBackend {
                backend_set,
                backend,
            } => {
                let backend_name = backend.to_string();
                let url = self.url(&[
                    "loadBalancers",
                    id,
                    "backendSets",
                    backend_set,
                    "backends",
                    &backend_name,
                ])?;
                self.mutate(Method::DELETE, url, None::<&()>, None).await
            }
            ChangeOp::CreatePathRouteSet { name, routes } => {
                let url = self.url(&["loadBalancers", id, "pathRouteSets"])?;
                let body = PathRouteSetDetails::from_routes(Some(name), routes);
                self.mutate(Method::POST, url, Some(&body), None).await
            }
            ChangeOp::UpdatePathRouteSet { name, routes } => {
                let url = self.url(&["loadBalancers", id, "pathRouteSets", name])?;
                let body = PathRouteSetDetails::from_routes(None, routes);
                self.mutate(Method::PUT, url, Some(&body), None).await
            }
            ChangeOp::CreateListener { name, spec } => {
                let url = self.url(&["loadBalancers", id, "listeners"])?;
                let body = ListenerDetails::from_spec(Some(name), spec);
                self.mutate(Method::POST, url, Some(&body), None).await
            }
            ChangeOp::UpdateListener { name, spec } => {
                let url = self.url(&["loadBalancers", id, "listeners", name])?;
                let body = ListenerDetails::from_spec(None, spec);
                self.mutate(Method::PUT, url, Some(&body), None).await
            }
            ChangeOp::DeleteListener { name } => {
                let url = self.url(&["loadBalancers", id, "listeners", name])?;
                self.mutate(Method::DELETE, url, None::<&()>, None).await
            }
            ChangeOp::DeletePathRouteSet { name } => {
                let url = self.url(&["loadBalancers", id, "pathRouteSets", name])?;
                self.mutate(Method::DELETE, url, None::<&()>, None).await
            }
            ChangeOp::DeleteBackendSet { name } => {
                let url = self.url(&["loadBalancers", id, "backendSets", name])?;
                self.mutate(Method::DELETE, url, None::<&()>, None).await
            }
            ChangeOp::DeleteCertificate { name } => {
                let url = self.url(&["loadBalancers", id, "certificates", name])?;
                self.mutate(Method::DELETE, url, None::<&()>, None).await
            }
            ChangeOp::UpdateTags { tags } => {
                let url = self.url(&["loadBalancers", id])?;
                let body = UpdateLoadBalancerDetails {
                    freeform_tags: tags.clone(),
                };
                self.mutate(Method::PUT, url, Some(&body), None).await
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<WorkRequestId, ApiError> {
        let url = self.url(&["loadBalancers", id])?;
        self.mutate(Method::DELETE, url, None::<&()>, None).await
    }

    async fn work_request_status(
        &self,
        id: &WorkRequestId,
    ) -> Result<WorkRequestStatus, ApiError> {
        let url = self.url(&["loadBalancerWorkRequests", &id.0])?;
        let response = self.send(Method::GET, url, None::<&()>, None).await?;
        let work_request: WorkRequest = response.json().await?;

        Ok(match work_request.lifecycle_state.as_str() {
            "SUCCEEDED" => WorkRequestStatus::Succeeded,
            "FAILED" => {
                let message = work_request
                    .error_details
                    .into_iter()
                    .map(|d| d.message)
                    .next()
                    .or(work_request.message)
                    .unwrap_or_else(|| "no details".to_string());
                WorkRequestStatus::Failed(message)
            }
            _ => WorkRequestStatus::InProgress,
        })
    }
}
