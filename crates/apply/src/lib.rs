//! rtsvg apply: hand composed descriptors to a platform.
//!
//! Two sinks: a manifest renderer (multi-document YAML) and a one-shot
//! server-side apply through kube. Neither polls, watches nor retries; a
//! failed descriptor stops the run and the error is returned as is.

#![forbid(unsafe_code)]

use std::io::Write;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use kube::{
    api::{Api, Patch, PatchParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client,
};
use metrics::{counter, histogram};
use rtsvg_compose::Descriptor;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Field manager recorded by server-side apply.
pub const FIELD_MANAGER: &str = "rtsvg";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterEntry {
    pub key: String,
    /// Set by the API server; `None` for rendered manifests.
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterReport {
    pub dry_run: bool,
    pub entries: Vec<RegisterEntry>,
}

/// Where a composition goes once built.
#[async_trait::async_trait]
pub trait Platform: Send + Sync {
    async fn register(&self, descriptors: &[Descriptor]) -> Result<RegisterReport>;
}

/// Dependency order: config and secret first, ingress last. Stable within a kind.
pub fn apply_order(descriptors: &[Descriptor]) -> Vec<&Descriptor> {
    let mut out: Vec<&Descriptor> = descriptors.iter().collect();
    out.sort_by_key(|d| d.kind());
    out
}

/// Multi-document YAML stream in [`apply_order`].
pub fn render_manifests(descriptors: &[Descriptor]) -> Result<String> {
    let mut out = String::new();
    for d in apply_order(descriptors) {
        let doc = serde_yaml::to_string(d).with_context(|| format!("rendering {}", d.key()))?;
        out.push_str("---\n");
        out.push_str(&doc);
    }
    Ok(out)
}

/// Writes rendered manifests to any writer (stdout, a file, a buffer).
pub struct ManifestSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> ManifestSink<W> {
    pub fn new(out: W) -> Self { Self { out: Mutex::new(out) } }

    pub fn into_inner(self) -> Result<W> {
        self.out.into_inner().map_err(|_| anyhow!("manifest writer poisoned"))
    }
}

#[async_trait::async_trait]
impl<W: Write + Send> Platform for ManifestSink<W> {
    async fn register(&self, descriptors: &[Descriptor]) -> Result<RegisterReport> {
        let text = render_manifests(descriptors)?;
        let mut out = self.out.lock().map_err(|_| anyhow!("manifest writer poisoned"))?;
        out.write_all(text.as_bytes()).context("writing manifests")?;
        out.flush().context("flushing manifests")?;
        let entries = apply_order(descriptors)
            .into_iter()
            .map(|d| RegisterEntry { key: d.key(), resource_version: None })
            .collect();
        Ok(RegisterReport { dry_run: false, entries })
    }
}

/// Server-side apply against the cluster of the current kube context.
pub struct KubeApply {
    client: Client,
    dry_run: bool,
}

impl KubeApply {
    pub fn new(client: Client, dry_run: bool) -> Self { Self { client, dry_run } }

    pub async fn try_default(dry_run: bool) -> Result<Self> {
        let client = Client::try_default().await.context("building kube client from current context")?;
        Ok(Self::new(client, dry_run))
    }

    fn params(&self) -> PatchParams {
        let pp = PatchParams::apply(FIELD_MANAGER);
        if self.dry_run { pp.dry_run() } else { pp }
    }

    async fn apply_one(&self, d: &Descriptor) -> Result<RegisterEntry> {
        let kind = d.kind();
        let gvk = GroupVersionKind::gvk(kind.group(), kind.version(), kind.as_str());
        let ar = ApiResource::from_gvk_with_plural(&gvk, kind.plural());
        let ns = d.namespace().ok_or_else(|| anyhow!("{} has no namespace", d.key()))?;
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), ns, &ar);
        let body = d.to_json().with_context(|| format!("serializing {}", d.key()))?;
        let obj = match api.patch(d.name(), &self.params(), &Patch::Apply(&body)).await {
            Ok(o) => o,
            Err(e) => {
                counter!("rtsvg_apply_err", 1u64);
                return Err(anyhow!("server-side apply of {} failed: {}", d.key(), e));
            }
        };
        debug!(key = %d.key(), rv = ?obj.metadata.resource_version, "applied");
        Ok(RegisterEntry { key: d.key(), resource_version: obj.metadata.resource_version })
    }
}

#[async_trait::async_trait]
impl Platform for KubeApply {
    async fn register(&self, descriptors: &[Descriptor]) -> Result<RegisterReport> {
        let t0 = std::time::Instant::now();
        let mut entries = Vec::with_capacity(descriptors.len());
        for d in apply_order(descriptors) {
            entries.push(self.apply_one(d).await?);
            counter!("rtsvg_apply_ok", 1u64);
        }
        histogram!("rtsvg_apply_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        info!(count = entries.len(), dry_run = self.dry_run, "descriptors registered");
        Ok(RegisterReport { dry_run: self.dry_run, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtsvg_compose::{compose, Kind};
    use rtsvg_core::Config;

    #[test]
    fn order_puts_config_first_and_ingress_last() {
        let comp = compose(&Config::default()).unwrap();
        let mut shuffled = comp.descriptors.clone();
        shuffled.reverse();
        let kinds: Vec<Kind> = apply_order(&shuffled).iter().map(|d| d.kind()).collect();
        assert_eq!(kinds.first(), Some(&Kind::ConfigMap));
        assert_eq!(kinds.last(), Some(&Kind::Ingress));
        assert!(kinds.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn manifests_are_one_document_per_descriptor() {
        let comp = compose(&Config::default()).unwrap();
        let text = render_manifests(&comp.descriptors).unwrap();
        assert_eq!(text.matches("---\n").count(), comp.descriptors.len());
        assert!(text.starts_with("---\napiVersion: v1\nkind: ConfigMap\n"));
        assert!(text.contains("kind: Ingress"));
    }
}
