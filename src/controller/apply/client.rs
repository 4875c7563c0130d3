//! # Member Cluster Client
//!
//! The seam between the engine and the member cluster's API server.
//! `KubeMemberClient` talks to a real cluster through kube's dynamic API;
//! tests substitute an in-memory implementation.

use crate::constants::{DEFAULT_NAMESPACE, FIELD_MANAGER};
use crate::controller::apply::ApplyError;
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::{ApiResource, Scope};
use kube::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// A resource type resolved through discovery
#[derive(Debug, Clone)]
pub struct ResolvedResource {
    pub api_resource: ApiResource,
    pub namespaced: bool,
}

impl ResolvedResource {
    /// Namespace to address an object in; `None` for cluster-scoped kinds
    #[must_use]
    pub fn scope<'a>(&self, namespace: &'a str) -> Option<&'a str> {
        if self.namespaced {
            Some(if namespace.is_empty() { DEFAULT_NAMESPACE } else { namespace })
        } else {
            None
        }
    }
}

/// Operations the engine performs against the member cluster
///
/// Every mutating call is idempotent by object identity, so callers may
/// retry freely.
#[async_trait]
pub trait MemberClient: Send + Sync {
    /// Map a group/version/kind to its resource and scope
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResolvedResource, ApplyError>;

    async fn get(
        &self,
        resource: &ResolvedResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, ApplyError>;

    async fn create(
        &self,
        resource: &ResolvedResource,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<DynamicObject, ApplyError>;

    /// JSON merge patch (RFC 7386)
    async fn patch_merge(
        &self,
        resource: &ResolvedResource,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject, ApplyError>;

    /// Server-side apply under the agent's field manager
    async fn apply_server_side(
        &self,
        resource: &ResolvedResource,
        namespace: Option<&str>,
        name: &str,
        object: &Value,
        force: bool,
    ) -> Result<DynamicObject, ApplyError>;

    /// Delete an object; deleting a missing object succeeds
    async fn delete(
        &self,
        resource: &ResolvedResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ApplyError>;
}

/// kube-backed member client with a discovery cache
pub struct KubeMemberClient {
    client: Client,
    discovery: Mutex<HashMap<String, ResolvedResource>>,
}

impl std::fmt::Debug for KubeMemberClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self
            .discovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("KubeMemberClient")
            .field("cached_resources", &cached)
            .finish_non_exhaustive()
    }
}

impl KubeMemberClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            discovery: Mutex::new(HashMap::new()),
        }
    }

    fn api(&self, resource: &ResolvedResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource.api_resource),
            None => Api::all_with(self.client.clone(), &resource.api_resource),
        }
    }
}

/// Discovery answered and the kind is not among the served resources
///
/// Transport failures and other API errors are not an answer and must not
/// be read as "not served".
fn kind_not_served(e: &kube::Error) -> bool {
    match e {
        kube::Error::Discovery(_) => true,
        kube::Error::Api(api_err) => api_err.code == 404,
        _ => false,
    }
}

fn cache_key(gvk: &GroupVersionKind) -> String {
    format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
}

#[async_trait]
impl MemberClient for KubeMemberClient {
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResolvedResource, ApplyError> {
        let key = cache_key(gvk);
        let cached = self
            .discovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(hit) = cached {
            return Ok(hit);
        }

        let (api_resource, capabilities) = match kube::discovery::pinned_kind(&self.client, gvk).await {
            Ok(found) => found,
            Err(e) if kind_not_served(&e) => {
                return Err(ApplyError::Resolve {
                    gvk: key,
                    message: e.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let resolved = ResolvedResource {
            api_resource,
            namespaced: matches!(capabilities.scope, Scope::Namespaced),
        };
        debug!(gvk = %key, plural = %resolved.api_resource.plural, "Resolved resource");
        self.discovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, resolved.clone());
        Ok(resolved)
    }

    async fn get(
        &self,
        resource: &ResolvedResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, ApplyError> {
        Ok(self.api(resource, namespace).get_opt(name).await?)
    }

    async fn create(
        &self,
        resource: &ResolvedResource,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<DynamicObject, ApplyError> {
        let object: DynamicObject = serde_json::from_value(object.clone())?;
        Ok(self
            .api(resource, namespace)
            .create(
                &PostParams {
                    field_manager: Some(FIELD_MANAGER.to_string()),
                    ..PostParams::default()
                },
                &object,
            )
            .await?)
    }

    async fn patch_merge(
        &self,
        resource: &ResolvedResource,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject, ApplyError> {
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PatchParams::default()
        };
        Ok(self
            .api(resource, namespace)
            .patch(name, &params, &Patch::Merge(patch))
            .await?)
    }

    async fn apply_server_side(
        &self,
        resource: &ResolvedResource,
        namespace: Option<&str>,
        name: &str,
        object: &Value,
        force: bool,
    ) -> Result<DynamicObject, ApplyError> {
        let mut params = PatchParams::apply(FIELD_MANAGER);
        if force {
            params = params.force();
        }
        Ok(self
            .api(resource, namespace)
            .patch(name, &params, &Patch::Apply(object))
            .await?)
    }

    async fn delete(
        &self,
        resource: &ResolvedResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ApplyError> {
        match self
            .api(resource, namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::{DiscoveryError, ErrorResponse};

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "discovery request failed".to_string(),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn test_missing_kind_is_not_served() {
        let missing = kube::Error::Discovery(DiscoveryError::MissingKind("Widget".to_string()));
        assert!(kind_not_served(&missing));
        assert!(kind_not_served(&api_error(404)));
    }

    #[test]
    fn test_transient_discovery_failures_are_not_unserved() {
        assert!(!kind_not_served(&api_error(503)));
        assert!(!kind_not_served(&api_error(500)));
        assert!(!matches!(ApplyError::from(api_error(503)), ApplyError::Resolve { .. }));
    }
}
