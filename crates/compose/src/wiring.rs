//! Cross-resource values: the combinators that turn config leaves into
//! connection strings, URLs and argument lists.
//!
//! Each combinator is a plain function plus a declaration on [`Inputs`] that
//! places it in the deferred graph.

use k8s_openapi::api::networking::v1::IngressTLS;
use rtsvg_core::Config;
use rtsvg_deferred::{Deferred, DeferredGraph, Result};

pub const CACHE_SCHEME: &str = "redis";
pub const CACHE_PORT: i32 = 6379;

/// Connection string handed to the backend.
///
/// Disabled cache: the external URL is passed through verbatim, even when empty.
pub fn cache_url(enabled: bool, password: &str, external_url: &str, host: &str) -> String {
    if !enabled {
        return external_url.to_string();
    }
    if password.is_empty() {
        format!("{}://{}:{}/", CACHE_SCHEME, host, CACHE_PORT)
    } else {
        format!("{}://:{}@{}:{}/", CACHE_SCHEME, password, host, CACHE_PORT)
    }
}

/// One TLS block when TLS is on and a secret is named, else none.
pub fn tls_blocks(enabled: bool, secret_name: &str, host: &str) -> Vec<IngressTLS> {
    if enabled && !secret_name.is_empty() {
        vec![IngressTLS { hosts: Some(vec![host.to_string()]), secret_name: Some(secret_name.to_string()) }]
    } else {
        Vec::new()
    }
}

/// Public URL of the ingress. Follows the TLS flag only; a missing secret
/// still yields `https` (see [`tls_blocks`] for the stricter condition).
pub fn ingress_url(tls_enabled: bool, host: &str) -> String {
    if tls_enabled { format!("https://{}", host) } else { format!("http://{}", host) }
}

/// Cache server arguments; `--requirepass` only when a password is set.
pub fn cache_args(password: &str) -> Vec<String> {
    let mut args = Vec::with_capacity(10);
    if !password.is_empty() {
        args.push("--requirepass".to_string());
        args.push(password.to_string());
    }
    for a in ["--save", "", "--appendonly", "no", "--maxmemory", "256mb", "--maxmemory-policy", "allkeys-lru"] {
        args.push(a.to_string());
    }
    args
}

pub fn image_ref(repository: &str, tag: &str) -> String {
    format!("{}:{}", repository, tag)
}

/// Config fields that feed combinators, as graph leaves.
pub struct Inputs {
    pub cache_enabled: Deferred<bool>,
    pub cache_password: Deferred<String>,
    pub cache_external_url: Deferred<String>,
    pub tls_enabled: Deferred<bool>,
    pub tls_secret_name: Deferred<String>,
    pub ingress_host: Deferred<String>,
    pub image_repository: Deferred<String>,
    pub image_tag: Deferred<String>,
    pub listen_port: Deferred<i32>,
    pub service_type: Deferred<String>,
}

impl Inputs {
    pub fn declare(g: &mut DeferredGraph, c: &Config) -> Result<Self> {
        Ok(Self {
            cache_enabled: g.constant("config.cacheEnabled", c.cache_enabled)?,
            cache_password: g.constant("config.cachePassword", c.cache_password.clone())?,
            cache_external_url: g.constant("config.cacheExternalUrl", c.cache_external_url.clone())?,
            tls_enabled: g.constant("config.ingressTlsEnabled", c.ingress_tls_enabled)?,
            tls_secret_name: g.constant("config.ingressTlsSecretName", c.ingress_tls_secret_name.clone())?,
            ingress_host: g.constant("config.ingressHost", c.ingress_host.clone())?,
            image_repository: g.constant("config.imageRepository", c.image_repository.clone())?,
            image_tag: g.constant("config.imageTag", c.image_tag.clone())?,
            listen_port: g.constant("config.configPort", c.config_port)?,
            service_type: g.constant("config.serviceType", c.service_type.clone())?,
        })
    }

    pub fn cache_url(&self, g: &mut DeferredGraph, cache_host: &str) -> Result<Deferred<String>> {
        let host = cache_host.to_string();
        g.all3(
            "cacheUrl",
            &self.cache_enabled,
            &self.cache_password,
            &self.cache_external_url,
            move |enabled: bool, password: String, external: String| cache_url(enabled, &password, &external, &host),
        )
    }

    pub fn tls_blocks(&self, g: &mut DeferredGraph) -> Result<Deferred<Vec<IngressTLS>>> {
        g.all3(
            "ingressTls",
            &self.tls_enabled,
            &self.tls_secret_name,
            &self.ingress_host,
            |enabled: bool, secret: String, host: String| tls_blocks(enabled, &secret, &host),
        )
    }

    pub fn ingress_url(&self, g: &mut DeferredGraph) -> Result<Deferred<String>> {
        g.all2("ingressUrl", &self.tls_enabled, &self.ingress_host, |tls: bool, host: String| ingress_url(tls, &host))
    }

    pub fn cache_args(&self, g: &mut DeferredGraph) -> Result<Deferred<Vec<String>>> {
        g.map("cacheArgs", &self.cache_password, |pw: String| cache_args(&pw))
    }

    pub fn image(&self, g: &mut DeferredGraph) -> Result<Deferred<String>> {
        g.all2("image", &self.image_repository, &self.image_tag, |repo: String, tag: String| image_ref(&repo, &tag))
    }

    pub fn port_string(&self, g: &mut DeferredGraph) -> Result<Deferred<String>> {
        g.map("portString", &self.listen_port, |p: i32| p.to_string())
    }
}
