//! Output record: only what the executed branches produced.

use rtsvg_deferred::{Deferred, DeferredGraph, Resolution, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outputs {
    pub deployment_name: String,
    pub service_name: String,
    pub service_type: String,
    /// Present iff the ingress was built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_url: Option<String>,
    /// Present iff the cache was built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_service_name: Option<String>,
}

/// Output slots declared before any branch runs. A branch binds only the
/// slots of the resources it creates; unbound slots never resolve and come
/// out as `None`.
pub struct OutputSlots {
    pub deployment_name: Deferred<String>,
    pub service_name: Deferred<String>,
    pub service_type: Deferred<String>,
    pub ingress_url: Deferred<String>,
    pub cache_service_name: Deferred<String>,
}

impl OutputSlots {
    pub fn declare(g: &mut DeferredGraph) -> Self {
        Self {
            deployment_name: g.pending("output.deploymentName"),
            service_name: g.pending("output.serviceName"),
            service_type: g.pending("output.serviceType"),
            ingress_url: g.pending("output.ingressUrl"),
            cache_service_name: g.pending("output.cacheServiceName"),
        }
    }

    /// Required slots must have resolved; optional ones may be absent, but a
    /// slot that resolved to something unreadable is still an error.
    pub fn collect(&self, r: &Resolution) -> Result<Outputs> {
        Ok(Outputs {
            deployment_name: r.require(&self.deployment_name)?,
            service_name: r.require(&self.service_name)?,
            service_type: r.require(&self.service_type)?,
            ingress_url: r.get(&self.ingress_url)?,
            cache_service_name: r.get(&self.cache_service_name)?,
        })
    }
}
