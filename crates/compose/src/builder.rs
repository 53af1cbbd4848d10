//! Resource graph builder for realtime-svg.
//!
//! Two phases: declare every cross-resource value in a [`DeferredGraph`]
//! (branching on the feature flags), resolve it once, then materialize the
//! typed objects from the resolved values.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapKeySelector, Container, ContainerPort, EnvVar, EnvVarSource, HTTPGetAction, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements, Secret, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend, IngressSpec,
    IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use metrics::counter;
use rtsvg_core::{Config, LabelSet, Names, Role};
use rtsvg_deferred::{Deferred, DeferredGraph, Resolution};
use tracing::{debug, info, warn};

use crate::outputs::OutputSlots;
use crate::wiring::{Inputs, CACHE_PORT};
use crate::{ComposeError, Composition, Descriptor, Outputs};

pub const HTTP_PORT_NAME: &str = "http";
pub const CACHE_PORT_NAME: &str = "redis";
pub const CACHE_IMAGE: &str = "redis:8-alpine";
pub const CACHE_CONTAINER: &str = "redis";

pub const KEY_REDIS_URL: &str = "REDIS_URL";
pub const KEY_LOG_LEVEL: &str = "LOG_LEVEL";
pub const KEY_PORT: &str = "PORT";

/// Fixed probe timing: (path, initial delay, period, timeout, failure threshold).
pub const LIVENESS: (&str, i32, i32, i32, i32) = ("/health", 10, 10, 5, 3);
pub const READINESS: (&str, i32, i32, i32, i32) = ("/ready", 5, 5, 3, 3);

struct BackendPlan {
    redis_url: Deferred<String>,
    port: Deferred<String>,
    image: Deferred<String>,
    config_map_name: Deferred<String>,
}

struct CachePlan {
    args: Deferred<Vec<String>>,
}

struct IngressPlan {
    tls: Deferred<Vec<IngressTLS>>,
    backend_service: Deferred<String>,
}

struct Labels {
    base: LabelSet,
    backend: LabelSet,
    redis: LabelSet,
}

pub(crate) fn build(names: &Names, config: &Config) -> Result<Composition<Outputs>, ComposeError> {
    let mut g = DeferredGraph::new();
    let slots = OutputSlots::declare(&mut g);
    let inputs = Inputs::declare(&mut g, config)?;

    let base = LabelSet::base(&names.app, &config.image_tag);
    let labels = Labels { backend: base.for_role(Role::Backend), redis: base.for_role(Role::Redis), base };

    // Object names as the platform reports them back once created.
    let config_map_name = g.constant("configmap.metadata.name", names.config.clone())?;
    let deployment_name = g.constant("deployment.metadata.name", names.app.clone())?;
    let service_name = g.constant("service.metadata.name", names.app.clone())?;

    let backend = BackendPlan {
        redis_url: inputs.cache_url(&mut g, &names.cache)?,
        port: inputs.port_string(&mut g)?,
        image: inputs.image(&mut g)?,
        config_map_name,
    };
    g.bind(&slots.deployment_name, &deployment_name)?;
    g.bind(&slots.service_name, &service_name)?;
    g.bind(&slots.service_type, &inputs.service_type)?;

    let cache = if config.cache_enabled {
        let cache_service_name = g.constant("cache-service.metadata.name", names.cache.clone())?;
        g.bind(&slots.cache_service_name, &cache_service_name)?;
        Some(CachePlan { args: inputs.cache_args(&mut g)? })
    } else {
        None
    };

    let ingress = if config.ingress_enabled {
        if config.ingress_tls_enabled && config.ingress_tls_secret_name.is_empty() {
            warn!(host = %config.ingress_host, "TLS enabled without a secret name: ingress gets no TLS block but the URL is https");
        }
        let url = inputs.ingress_url(&mut g)?;
        g.bind(&slots.ingress_url, &url)?;
        Some(IngressPlan { tls: inputs.tls_blocks(&mut g)?, backend_service: service_name })
    } else {
        None
    };

    let r = g.resolve()?;

    let mut descriptors = Vec::with_capacity(7);
    descriptors.push(config_map(names, config, &labels, &r, &backend)?);
    descriptors.push(secret(names, config, &labels));
    descriptors.push(backend_deployment(names, config, &labels, &r, &backend)?);
    descriptors.push(backend_service(names, config, &labels));
    if let Some(plan) = &cache {
        descriptors.push(cache_deployment(names, config, &labels, &r, plan)?);
        descriptors.push(cache_service(names, config, &labels));
    }
    if let Some(plan) = &ingress {
        descriptors.push(ingress_descriptor(names, config, &labels, &r, plan)?);
    }
    for d in &descriptors {
        debug!(key = %d.key(), "descriptor built");
    }

    let outputs = slots.collect(&r)?;
    counter!("rtsvg_compositions_total", 1u64);
    info!(
        namespace = %config.namespace,
        descriptors = descriptors.len(),
        cache = cache.is_some(),
        ingress = ingress.is_some(),
        "composition built"
    );
    Ok(Composition { descriptors, outputs })
}

fn meta(name: &str, namespace: &str, labels: &LabelSet) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(labels.to_map()),
        ..Default::default()
    }
}

fn quantities(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(cpu.to_string())),
        ("memory".to_string(), Quantity(memory.to_string())),
    ])
}

fn probe((path, delay, period, timeout, failures): (&str, i32, i32, i32, i32), port: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction { path: Some(path.to_string()), port: IntOrString::Int(port), ..Default::default() }),
        initial_delay_seconds: Some(delay),
        period_seconds: Some(period),
        timeout_seconds: Some(timeout),
        failure_threshold: Some(failures),
        ..Default::default()
    }
}

fn env_from_config(key: &str, config_map: &str) -> EnvVar {
    EnvVar {
        name: key.to_string(),
        value_from: Some(EnvVarSource {
            config_map_key_ref: Some(ConfigMapKeySelector {
                name: Some(config_map.to_string()),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn config_map(names: &Names, c: &Config, l: &Labels, r: &Resolution, plan: &BackendPlan) -> Result<Descriptor, ComposeError> {
    let data = BTreeMap::from([
        (KEY_REDIS_URL.to_string(), r.require(&plan.redis_url)?),
        (KEY_LOG_LEVEL.to_string(), c.config_log_level.clone()),
        (KEY_PORT.to_string(), r.require(&plan.port)?),
    ]);
    Ok(Descriptor::ConfigMap(ConfigMap {
        metadata: meta(&names.config, &c.namespace, &l.base),
        data: Some(data),
        ..Default::default()
    }))
}

// Kept even with no data so credentials can be injected later under a stable name.
fn secret(names: &Names, c: &Config, l: &Labels) -> Descriptor {
    Descriptor::Secret(Secret {
        metadata: meta(&names.secret, &c.namespace, &l.base),
        type_: Some("Opaque".to_string()),
        data: Some(BTreeMap::new()),
        ..Default::default()
    })
}

fn backend_deployment(names: &Names, c: &Config, l: &Labels, r: &Resolution, plan: &BackendPlan) -> Result<Descriptor, ComposeError> {
    let cm_name: String = r.require(&plan.config_map_name)?;
    let container = Container {
        name: names.app.clone(),
        image: Some(r.require(&plan.image)?),
        image_pull_policy: Some(c.image_pull_policy.clone()),
        ports: Some(vec![ContainerPort {
            name: Some(HTTP_PORT_NAME.to_string()),
            container_port: c.config_port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(vec![
            EnvVar { name: "HOST".to_string(), value: Some("0.0.0.0".to_string()), ..Default::default() },
            env_from_config(KEY_REDIS_URL, &cm_name),
            env_from_config(KEY_LOG_LEVEL, &cm_name),
            env_from_config(KEY_PORT, &cm_name),
        ]),
        resources: Some(ResourceRequirements {
            requests: Some(quantities(&c.resources_requests_cpu, &c.resources_requests_memory)),
            limits: Some(quantities(&c.resources_limits_cpu, &c.resources_limits_memory)),
            ..Default::default()
        }),
        liveness_probe: Some(probe(LIVENESS, c.config_port)),
        readiness_probe: Some(probe(READINESS, c.config_port)),
        ..Default::default()
    };
    Ok(Descriptor::Deployment(Deployment {
        metadata: meta(&names.app, &c.namespace, &l.backend),
        spec: Some(DeploymentSpec {
            replicas: Some(c.replicas),
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_unavailable: Some(IntOrString::Int(1)),
                    max_surge: Some(IntOrString::Int(1)),
                }),
            }),
            selector: LabelSelector { match_labels: Some(l.backend.selector()), ..Default::default() },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(l.backend.to_map()), ..Default::default() }),
                spec: Some(PodSpec { containers: vec![container], ..Default::default() }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }))
}

fn backend_service(names: &Names, c: &Config, l: &Labels) -> Descriptor {
    Descriptor::Service(Service {
        metadata: meta(&names.app, &c.namespace, &l.backend),
        spec: Some(ServiceSpec {
            type_: Some(c.service_type.clone()),
            selector: Some(l.backend.selector()),
            ports: Some(vec![ServicePort {
                name: Some(HTTP_PORT_NAME.to_string()),
                port: c.service_port,
                target_port: Some(IntOrString::String(HTTP_PORT_NAME.to_string())),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn cache_deployment(names: &Names, c: &Config, l: &Labels, r: &Resolution, plan: &CachePlan) -> Result<Descriptor, ComposeError> {
    let container = Container {
        name: CACHE_CONTAINER.to_string(),
        image: Some(CACHE_IMAGE.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ports: Some(vec![ContainerPort {
            name: Some(CACHE_PORT_NAME.to_string()),
            container_port: CACHE_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        args: Some(r.require(&plan.args)?),
        resources: Some(ResourceRequirements {
            requests: Some(quantities("100m", "128Mi")),
            limits: Some(quantities("200m", "256Mi")),
            ..Default::default()
        }),
        ..Default::default()
    };
    Ok(Descriptor::Deployment(Deployment {
        metadata: meta(&names.cache, &c.namespace, &l.redis),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector { match_labels: Some(l.redis.selector()), ..Default::default() },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(l.redis.to_map()), ..Default::default() }),
                spec: Some(PodSpec { containers: vec![container], ..Default::default() }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }))
}

fn cache_service(names: &Names, c: &Config, l: &Labels) -> Descriptor {
    Descriptor::Service(Service {
        metadata: meta(&names.cache, &c.namespace, &l.redis),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(l.redis.selector()),
            ports: Some(vec![ServicePort {
                name: Some(CACHE_PORT_NAME.to_string()),
                port: CACHE_PORT,
                target_port: Some(IntOrString::String(CACHE_PORT_NAME.to_string())),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn ingress_descriptor(names: &Names, c: &Config, l: &Labels, r: &Resolution, plan: &IngressPlan) -> Result<Descriptor, ComposeError> {
    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: r.require(&plan.backend_service)?,
            port: Some(ServiceBackendPort { number: Some(c.service_port), ..Default::default() }),
        }),
        ..Default::default()
    };
    Ok(Descriptor::Ingress(Ingress {
        metadata: meta(&names.app, &c.namespace, &l.base),
        spec: Some(IngressSpec {
            tls: Some(r.require(&plan.tls)?),
            rules: Some(vec![IngressRule {
                host: Some(c.ingress_host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(c.ingress_path.clone()),
                        path_type: c.ingress_path_type.clone(),
                        backend,
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }))
}
