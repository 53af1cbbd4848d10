//! Partial configuration layers and their resolution against fixed defaults.
//!
//! Resolution never fails and never validates: a supplied value wins, a
//! missing one takes the default. Booleans are defaulted on presence, so an
//! explicit `false` survives resolution.

use serde::{Deserialize, Serialize};
use tracing::warn;

pub mod defaults {
    pub const NAMESPACE: &str = "default";
    pub const REPLICAS: i32 = 2;
    pub const IMAGE_REPOSITORY: &str = "ghcr.io/egoavara/realtime-svg";
    pub const IMAGE_TAG: &str = "v0.1.4";
    pub const IMAGE_PULL_POLICY: &str = "IfNotPresent";
    pub const REQUESTS_CPU: &str = "100m";
    pub const REQUESTS_MEMORY: &str = "128Mi";
    pub const LIMITS_CPU: &str = "500m";
    pub const LIMITS_MEMORY: &str = "512Mi";
    pub const CACHE_ENABLED: bool = true;
    pub const CACHE_PASSWORD: &str = "";
    pub const CACHE_EXTERNAL_URL: &str = "";
    pub const INGRESS_ENABLED: bool = true;
    pub const INGRESS_HOST: &str = "realtime-svg.example.com";
    pub const INGRESS_PATH: &str = "/";
    pub const INGRESS_PATH_TYPE: &str = "Prefix";
    pub const INGRESS_TLS_ENABLED: bool = false;
    pub const INGRESS_TLS_SECRET_NAME: &str = "";
    pub const SERVICE_TYPE: &str = "ClusterIP";
    pub const SERVICE_PORT: i32 = 80;
    pub const LOG_LEVEL: &str = "info";
    pub const LISTEN_PORT: i32 = 8080;
}

/// Input configuration: any subset of fields may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PartialConfig {
    pub namespace: Option<String>,
    pub replicas: Option<i32>,
    pub image_repository: Option<String>,
    pub image_tag: Option<String>,
    pub image_pull_policy: Option<String>,

    pub resources_requests_cpu: Option<String>,
    pub resources_requests_memory: Option<String>,
    pub resources_limits_cpu: Option<String>,
    pub resources_limits_memory: Option<String>,

    #[serde(alias = "redisEnabled")]
    pub cache_enabled: Option<bool>,
    #[serde(alias = "redisPassword")]
    pub cache_password: Option<String>,
    #[serde(alias = "redisExternalUrl")]
    pub cache_external_url: Option<String>,

    pub ingress_enabled: Option<bool>,
    pub ingress_host: Option<String>,
    pub ingress_path: Option<String>,
    pub ingress_path_type: Option<String>,
    pub ingress_tls_enabled: Option<bool>,
    pub ingress_tls_secret_name: Option<String>,

    pub service_type: Option<String>,
    pub service_port: Option<i32>,

    pub config_log_level: Option<String>,
    pub config_port: Option<i32>,
}

/// Fully populated configuration. Produced only by [`PartialConfig::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub namespace: String,
    pub replicas: i32,
    pub image_repository: String,
    pub image_tag: String,
    pub image_pull_policy: String,

    pub resources_requests_cpu: String,
    pub resources_requests_memory: String,
    pub resources_limits_cpu: String,
    pub resources_limits_memory: String,

    pub cache_enabled: bool,
    pub cache_password: String,
    pub cache_external_url: String,

    pub ingress_enabled: bool,
    pub ingress_host: String,
    pub ingress_path: String,
    pub ingress_path_type: String,
    pub ingress_tls_enabled: bool,
    pub ingress_tls_secret_name: String,

    pub service_type: String,
    pub service_port: i32,

    pub config_log_level: String,
    pub config_port: i32,
}

impl Default for Config {
    fn default() -> Self { PartialConfig::default().resolve() }
}

// Empty strings and zero count as unset; only the flags honor an explicit falsy value.
fn or_str(v: Option<String>, d: &str) -> String {
    v.filter(|s| !s.is_empty()).unwrap_or_else(|| d.to_string())
}

fn or_num(v: Option<i32>, d: i32) -> i32 { v.filter(|n| *n != 0).unwrap_or(d) }

impl PartialConfig {
    /// Fill every missing field with its default. Booleans default on presence;
    /// strings and numbers also fall back when empty or zero.
    pub fn resolve(self) -> Config {
        use defaults as d;
        Config {
            namespace: or_str(self.namespace, d::NAMESPACE),
            replicas: or_num(self.replicas, d::REPLICAS),
            image_repository: or_str(self.image_repository, d::IMAGE_REPOSITORY),
            image_tag: or_str(self.image_tag, d::IMAGE_TAG),
            image_pull_policy: or_str(self.image_pull_policy, d::IMAGE_PULL_POLICY),
            resources_requests_cpu: or_str(self.resources_requests_cpu, d::REQUESTS_CPU),
            resources_requests_memory: or_str(self.resources_requests_memory, d::REQUESTS_MEMORY),
            resources_limits_cpu: or_str(self.resources_limits_cpu, d::LIMITS_CPU),
            resources_limits_memory: or_str(self.resources_limits_memory, d::LIMITS_MEMORY),
            cache_enabled: self.cache_enabled.unwrap_or(d::CACHE_ENABLED),
            cache_password: or_str(self.cache_password, d::CACHE_PASSWORD),
            cache_external_url: or_str(self.cache_external_url, d::CACHE_EXTERNAL_URL),
            ingress_enabled: self.ingress_enabled.unwrap_or(d::INGRESS_ENABLED),
            ingress_host: or_str(self.ingress_host, d::INGRESS_HOST),
            ingress_path: or_str(self.ingress_path, d::INGRESS_PATH),
            ingress_path_type: or_str(self.ingress_path_type, d::INGRESS_PATH_TYPE),
            ingress_tls_enabled: self.ingress_tls_enabled.unwrap_or(d::INGRESS_TLS_ENABLED),
            ingress_tls_secret_name: or_str(self.ingress_tls_secret_name, d::INGRESS_TLS_SECRET_NAME),
            service_type: or_str(self.service_type, d::SERVICE_TYPE),
            service_port: or_num(self.service_port, d::SERVICE_PORT),
            config_log_level: or_str(self.config_log_level, d::LOG_LEVEL),
            config_port: or_num(self.config_port, d::LISTEN_PORT),
        }
    }

    /// Merge `upper` on top of `self`; fields defined in `upper` win.
    pub fn overlay(self, upper: PartialConfig) -> PartialConfig {
        PartialConfig {
            namespace: upper.namespace.or(self.namespace),
            replicas: upper.replicas.or(self.replicas),
            image_repository: upper.image_repository.or(self.image_repository),
            image_tag: upper.image_tag.or(self.image_tag),
            image_pull_policy: upper.image_pull_policy.or(self.image_pull_policy),
            resources_requests_cpu: upper.resources_requests_cpu.or(self.resources_requests_cpu),
            resources_requests_memory: upper.resources_requests_memory.or(self.resources_requests_memory),
            resources_limits_cpu: upper.resources_limits_cpu.or(self.resources_limits_cpu),
            resources_limits_memory: upper.resources_limits_memory.or(self.resources_limits_memory),
            cache_enabled: upper.cache_enabled.or(self.cache_enabled),
            cache_password: upper.cache_password.or(self.cache_password),
            cache_external_url: upper.cache_external_url.or(self.cache_external_url),
            ingress_enabled: upper.ingress_enabled.or(self.ingress_enabled),
            ingress_host: upper.ingress_host.or(self.ingress_host),
            ingress_path: upper.ingress_path.or(self.ingress_path),
            ingress_path_type: upper.ingress_path_type.or(self.ingress_path_type),
            ingress_tls_enabled: upper.ingress_tls_enabled.or(self.ingress_tls_enabled),
            ingress_tls_secret_name: upper.ingress_tls_secret_name.or(self.ingress_tls_secret_name),
            service_type: upper.service_type.or(self.service_type),
            service_port: upper.service_port.or(self.service_port),
            config_log_level: upper.config_log_level.or(self.config_log_level),
            config_port: upper.config_port.or(self.config_port),
        }
    }

    /// Read `RTSVG_*` variables from the process environment.
    pub fn from_env() -> PartialConfig {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`PartialConfig::from_env`] over an arbitrary key lookup.
    /// Values that do not parse are ignored (treated as not supplied).
    pub fn from_lookup<F>(lookup: F) -> PartialConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let s = |k: &str| lookup(k);
        let b = |k: &str| lookup(k).and_then(|v| parse_bool(k, &v));
        let n = |k: &str| lookup(k).and_then(|v| parse_i32(k, &v));
        PartialConfig {
            namespace: s("RTSVG_NAMESPACE"),
            replicas: n("RTSVG_REPLICAS"),
            image_repository: s("RTSVG_IMAGE_REPOSITORY"),
            image_tag: s("RTSVG_IMAGE_TAG"),
            image_pull_policy: s("RTSVG_IMAGE_PULL_POLICY"),
            resources_requests_cpu: s("RTSVG_RESOURCES_REQUESTS_CPU"),
            resources_requests_memory: s("RTSVG_RESOURCES_REQUESTS_MEMORY"),
            resources_limits_cpu: s("RTSVG_RESOURCES_LIMITS_CPU"),
            resources_limits_memory: s("RTSVG_RESOURCES_LIMITS_MEMORY"),
            cache_enabled: b("RTSVG_CACHE_ENABLED"),
            cache_password: s("RTSVG_CACHE_PASSWORD"),
            cache_external_url: s("RTSVG_CACHE_EXTERNAL_URL"),
            ingress_enabled: b("RTSVG_INGRESS_ENABLED"),
            ingress_host: s("RTSVG_INGRESS_HOST"),
            ingress_path: s("RTSVG_INGRESS_PATH"),
            ingress_path_type: s("RTSVG_INGRESS_PATH_TYPE"),
            ingress_tls_enabled: b("RTSVG_INGRESS_TLS_ENABLED"),
            ingress_tls_secret_name: s("RTSVG_INGRESS_TLS_SECRET_NAME"),
            service_type: s("RTSVG_SERVICE_TYPE"),
            service_port: n("RTSVG_SERVICE_PORT"),
            config_log_level: s("RTSVG_CONFIG_LOG_LEVEL"),
            config_port: n("RTSVG_CONFIG_PORT"),
        }
    }
}

fn parse_bool(key: &str, v: &str) -> Option<bool> {
    let t = v.trim();
    if t == "1" || t.eq_ignore_ascii_case("true") || t.eq_ignore_ascii_case("yes") {
        Some(true)
    } else if t == "0" || t.eq_ignore_ascii_case("false") || t.eq_ignore_ascii_case("no") {
        Some(false)
    } else {
        warn!(key, value = %v, "ignoring non-boolean environment value");
        None
    }
}

fn parse_i32(key: &str, v: &str) -> Option<i32> {
    match v.trim().parse::<i32>() {
        Ok(n) => Some(n),
        Err(e) => {
            warn!(key, value = %v, error = %e, "ignoring non-integer environment value");
            None
        }
    }
}
