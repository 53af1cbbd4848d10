#![forbid(unsafe_code)]

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use rtsvg_compose::{compose, Composition, Kind, Outputs, KEY_LOG_LEVEL, KEY_PORT, KEY_REDIS_URL};
use rtsvg_core::PartialConfig;

fn build(p: PartialConfig) -> Composition<Outputs> {
    compose(&p.resolve()).unwrap()
}

fn redis_url(comp: &Composition<Outputs>) -> String {
    comp.find(Kind::ConfigMap, "realtime-svg-config")
        .and_then(|d| d.as_config_map())
        .and_then(|cm| cm.data.as_ref())
        .and_then(|data| data.get(KEY_REDIS_URL).cloned())
        .unwrap()
}

#[test]
fn scenario_tls_flag_without_secret() {
    let comp = build(PartialConfig {
        replicas: Some(3),
        cache_enabled: Some(false),
        ingress_enabled: Some(true),
        ingress_tls_enabled: Some(true),
        ingress_tls_secret_name: Some(String::new()),
        ..Default::default()
    });
    assert_eq!(comp.outputs.deployment_name, "realtime-svg");
    assert_eq!(comp.outputs.service_name, "realtime-svg");
    assert_eq!(comp.outputs.service_type, "ClusterIP");
    assert_eq!(comp.outputs.ingress_url.as_deref(), Some("https://realtime-svg.example.com"));
    assert_eq!(comp.outputs.cache_service_name, None);

    let ing = comp.find(Kind::Ingress, "realtime-svg").and_then(|d| d.as_ingress()).unwrap();
    let tls = ing.spec.as_ref().and_then(|s| s.tls.as_ref()).unwrap();
    assert!(tls.is_empty());

    let dep = comp.find(Kind::Deployment, "realtime-svg").and_then(|d| d.as_deployment()).unwrap();
    assert_eq!(dep.spec.as_ref().and_then(|s| s.replicas), Some(3));
}

#[test]
fn tls_block_present_with_flag_and_secret() {
    let comp = build(PartialConfig {
        ingress_tls_enabled: Some(true),
        ingress_tls_secret_name: Some("svg-tls".into()),
        ingress_host: Some("svg.example.org".into()),
        ..Default::default()
    });
    let ing = comp.find(Kind::Ingress, "realtime-svg").and_then(|d| d.as_ingress()).unwrap();
    let tls = ing.spec.as_ref().and_then(|s| s.tls.clone()).unwrap();
    assert_eq!(tls.len(), 1);
    assert_eq!(tls[0].secret_name.as_deref(), Some("svg-tls"));
    assert_eq!(tls[0].hosts, Some(vec!["svg.example.org".to_string()]));
    assert_eq!(comp.outputs.ingress_url.as_deref(), Some("https://svg.example.org"));
}

#[test]
fn tls_secret_without_flag_is_ignored() {
    let comp = build(PartialConfig { ingress_tls_secret_name: Some("svg-tls".into()), ..Default::default() });
    let ing = comp.find(Kind::Ingress, "realtime-svg").and_then(|d| d.as_ingress()).unwrap();
    assert!(ing.spec.as_ref().and_then(|s| s.tls.as_ref()).unwrap().is_empty());
    assert_eq!(comp.outputs.ingress_url.as_deref(), Some("http://realtime-svg.example.com"));
}

#[test]
fn ingress_disabled_drops_descriptor_and_url() {
    let comp = build(PartialConfig { ingress_enabled: Some(false), ..Default::default() });
    assert_eq!(comp.of_kind(Kind::Ingress).count(), 0);
    assert_eq!(comp.outputs.ingress_url, None);
    let v = serde_json::to_value(&comp.outputs).unwrap();
    assert!(v.get("ingressUrl").is_none());
}

#[test]
fn ingress_routes_to_primary_service_port() {
    let comp = build(PartialConfig {
        service_port: Some(8081),
        ingress_path: Some("/svg".into()),
        ingress_path_type: Some("Exact".into()),
        ..Default::default()
    });
    let v = comp.find(Kind::Ingress, "realtime-svg").unwrap().to_json().unwrap();
    let path = &v["spec"]["rules"][0]["http"]["paths"][0];
    assert_eq!(v["spec"]["rules"][0]["host"], "realtime-svg.example.com");
    assert_eq!(path["path"], "/svg");
    assert_eq!(path["pathType"], "Exact");
    assert_eq!(path["backend"]["service"]["name"], "realtime-svg");
    assert_eq!(path["backend"]["service"]["port"]["number"], 8081);
    assert!(v["metadata"]["labels"].get("app.kubernetes.io/component").is_none());
}

#[test]
fn cache_disabled_passes_external_url_verbatim() {
    let comp = build(PartialConfig {
        cache_enabled: Some(false),
        cache_password: Some("unused".into()),
        cache_external_url: Some("redis://managed.example:6380/2".into()),
        ..Default::default()
    });
    assert!(comp.find(Kind::Deployment, "realtime-svg-cache").is_none());
    assert!(comp.find(Kind::Service, "realtime-svg-cache").is_none());
    assert_eq!(comp.outputs.cache_service_name, None);
    assert_eq!(redis_url(&comp), "redis://managed.example:6380/2");

    let empty = build(PartialConfig { cache_enabled: Some(false), ..Default::default() });
    assert_eq!(redis_url(&empty), "");
}

#[test]
fn cache_url_and_args_follow_password() {
    let open = build(PartialConfig::default());
    assert_eq!(redis_url(&open), "redis://realtime-svg-cache:6379/");

    let locked = build(PartialConfig { cache_password: Some("hunter2".into()), ..Default::default() });
    assert_eq!(redis_url(&locked), "redis://:hunter2@realtime-svg-cache:6379/");

    let args_of = |c: &Composition<Outputs>| -> Vec<String> {
        let dep = c.find(Kind::Deployment, "realtime-svg-cache").and_then(|d| d.as_deployment()).unwrap();
        let pod = dep.spec.as_ref().and_then(|s| s.template.spec.as_ref()).unwrap();
        pod.containers[0].args.clone().unwrap()
    };
    assert!(!args_of(&open).contains(&"--requirepass".to_string()));
    assert_eq!(&args_of(&locked)[..2], &["--requirepass".to_string(), "hunter2".to_string()]);
}

#[test]
fn cache_workload_has_fixed_shape() {
    let comp = build(PartialConfig { replicas: Some(5), ..Default::default() });
    let v = comp.find(Kind::Deployment, "realtime-svg-cache").unwrap().to_json().unwrap();
    assert_eq!(v["spec"]["replicas"], 1);
    let c = &v["spec"]["template"]["spec"]["containers"][0];
    assert_eq!(c["image"], "redis:8-alpine");
    assert_eq!(c["ports"][0]["name"], "redis");
    assert_eq!(c["ports"][0]["containerPort"], 6379);
    assert_eq!(c["resources"]["requests"]["cpu"], "100m");
    assert_eq!(c["resources"]["requests"]["memory"], "128Mi");
    assert_eq!(c["resources"]["limits"]["cpu"], "200m");
    assert_eq!(c["resources"]["limits"]["memory"], "256Mi");

    let svc = comp.find(Kind::Service, "realtime-svg-cache").unwrap().to_json().unwrap();
    assert_eq!(svc["spec"]["type"], "ClusterIP");
    assert_eq!(svc["spec"]["ports"][0]["port"], 6379);
    assert_eq!(svc["spec"]["ports"][0]["targetPort"], "redis");
}

#[test]
fn selectors_match_pod_template_triples() {
    let comp = build(PartialConfig::default());
    for dep in comp.of_kind(Kind::Deployment).filter_map(|d| d.as_deployment()) {
        let spec = dep.spec.as_ref().unwrap();
        let selector = spec.selector.match_labels.clone().unwrap();
        let pod_labels = spec.template.metadata.as_ref().and_then(|m| m.labels.clone()).unwrap();
        assert_eq!(selector.len(), 3);
        for (k, v) in &selector {
            assert_eq!(pod_labels.get(k), Some(v), "selector key {k} missing on pods");
        }
        // the service of the same name selects the same pods
        let name = dep.metadata.name.as_deref().unwrap();
        let svc = comp.find(Kind::Service, name).and_then(|d| d.as_service()).unwrap();
        assert_eq!(svc.spec.as_ref().and_then(|s| s.selector.clone()), Some(selector));
    }
    let backend = comp.find(Kind::Service, "realtime-svg").and_then(|d| d.as_service()).unwrap();
    let cache = comp.find(Kind::Service, "realtime-svg-cache").and_then(|d| d.as_service()).unwrap();
    assert_ne!(backend.spec.as_ref().unwrap().selector, cache.spec.as_ref().unwrap().selector);
}

#[test]
fn backend_env_is_wired_through_config_map() {
    let comp = build(PartialConfig { config_port: Some(9090), config_log_level: Some("debug".into()), ..Default::default() });
    let v = comp.find(Kind::Deployment, "realtime-svg").unwrap().to_json().unwrap();
    let c = &v["spec"]["template"]["spec"]["containers"][0];
    let env = c["env"].as_array().unwrap();
    assert_eq!(env.len(), 4);
    assert_eq!(env[0], serde_json::json!({ "name": "HOST", "value": "0.0.0.0" }));
    for (entry, key) in env[1..].iter().zip([KEY_REDIS_URL, KEY_LOG_LEVEL, KEY_PORT]) {
        assert_eq!(entry["name"], key);
        assert!(entry.get("value").is_none(), "{key} must not be inlined");
        assert_eq!(entry["valueFrom"]["configMapKeyRef"]["name"], "realtime-svg-config");
        assert_eq!(entry["valueFrom"]["configMapKeyRef"]["key"], key);
    }

    let cm = comp.find(Kind::ConfigMap, "realtime-svg-config").unwrap().to_json().unwrap();
    assert_eq!(cm["data"]["LOG_LEVEL"], "debug");
    assert_eq!(cm["data"]["PORT"], "9090");
    assert_eq!(c["ports"][0]["containerPort"], 9090);
    assert_eq!(c["livenessProbe"]["httpGet"]["port"], 9090);
}

#[test]
fn backend_probes_and_strategy() {
    let comp = build(PartialConfig::default());
    let dep = comp.find(Kind::Deployment, "realtime-svg").and_then(|d| d.as_deployment()).unwrap();
    let spec = dep.spec.as_ref().unwrap();
    let strategy = spec.strategy.as_ref().unwrap();
    assert_eq!(strategy.type_.as_deref(), Some("RollingUpdate"));
    let ru = strategy.rolling_update.as_ref().unwrap();
    assert_eq!(ru.max_surge, Some(IntOrString::Int(1)));
    assert_eq!(ru.max_unavailable, Some(IntOrString::Int(1)));

    let c = &spec.template.spec.as_ref().unwrap().containers[0];
    assert_eq!(c.image.as_deref(), Some("ghcr.io/egoavara/realtime-svg:v0.1.4"));
    let live = c.liveness_probe.as_ref().unwrap();
    assert_eq!(live.http_get.as_ref().and_then(|h| h.path.as_deref()), Some("/health"));
    assert_eq!(
        (live.initial_delay_seconds, live.period_seconds, live.timeout_seconds, live.failure_threshold),
        (Some(10), Some(10), Some(5), Some(3))
    );
    let ready = c.readiness_probe.as_ref().unwrap();
    assert_eq!(ready.http_get.as_ref().and_then(|h| h.path.as_deref()), Some("/ready"));
    assert_eq!(
        (ready.initial_delay_seconds, ready.period_seconds, ready.timeout_seconds, ready.failure_threshold),
        (Some(5), Some(5), Some(3), Some(3))
    );
}

#[test]
fn secret_exists_even_when_empty() {
    let comp = build(PartialConfig { cache_enabled: Some(false), ingress_enabled: Some(false), ..Default::default() });
    let s = comp.find(Kind::Secret, "realtime-svg-secret").and_then(|d| d.as_secret()).unwrap();
    assert_eq!(s.type_.as_deref(), Some("Opaque"));
    assert!(s.data.as_ref().unwrap().is_empty());
}

#[test]
fn namespace_and_service_type_propagate() {
    let comp = build(PartialConfig {
        namespace: Some("svg".into()),
        service_type: Some("LoadBalancer".into()),
        ..Default::default()
    });
    assert!(comp.descriptors.iter().all(|d| d.namespace() == Some("svg")));
    assert_eq!(comp.outputs.service_type, "LoadBalancer");
    // the cache service stays internal
    let cache = comp.find(Kind::Service, "realtime-svg-cache").unwrap().to_json().unwrap();
    assert_eq!(cache["spec"]["type"], "ClusterIP");
}

#[test]
fn composition_is_deterministic() {
    let p = PartialConfig {
        replicas: Some(4),
        cache_password: Some("pw".into()),
        ingress_tls_enabled: Some(true),
        ingress_tls_secret_name: Some("tls".into()),
        ..Default::default()
    };
    let a = build(p.clone());
    let b = build(p);
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a.descriptors).unwrap(),
        serde_json::to_string(&b.descriptors).unwrap()
    );
}

#[test]
fn negative_replicas_pass_through() {
    let comp = build(PartialConfig { replicas: Some(-2), ..Default::default() });
    let dep = comp.find(Kind::Deployment, "realtime-svg").and_then(|d| d.as_deployment()).unwrap();
    assert_eq!(dep.spec.as_ref().and_then(|s| s.replicas), Some(-2));
}

#[test]
fn empty_and_zero_inputs_compose_like_defaults() {
    let comp = build(PartialConfig {
        replicas: Some(0),
        image_tag: Some(String::new()),
        ingress_host: Some(String::new()),
        service_port: Some(0),
        ..Default::default()
    });
    let dep = comp.find(Kind::Deployment, "realtime-svg").and_then(|d| d.as_deployment()).unwrap();
    assert_eq!(dep.spec.as_ref().and_then(|s| s.replicas), Some(2));
    let pod = dep.spec.as_ref().and_then(|s| s.template.spec.as_ref()).unwrap();
    assert_eq!(pod.containers[0].image.as_deref(), Some("ghcr.io/egoavara/realtime-svg:v0.1.4"));
    assert_eq!(comp.outputs.ingress_url.as_deref(), Some("http://realtime-svg.example.com"));
    let svc = comp.find(Kind::Service, "realtime-svg").and_then(|d| d.as_service()).unwrap();
    assert_eq!(svc.spec.as_ref().and_then(|s| s.ports.as_ref()).map(|p| p[0].port), Some(80));
}
