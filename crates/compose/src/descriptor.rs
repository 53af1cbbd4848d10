//! Typed resource descriptors handed to a platform.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    ConfigMap,
    Secret,
    Deployment,
    Service,
    Ingress,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::ConfigMap => "ConfigMap",
            Kind::Secret => "Secret",
            Kind::Deployment => "Deployment",
            Kind::Service => "Service",
            Kind::Ingress => "Ingress",
        }
    }

    pub fn group(&self) -> &'static str {
        match self {
            Kind::ConfigMap | Kind::Secret | Kind::Service => "",
            Kind::Deployment => "apps",
            Kind::Ingress => "networking.k8s.io",
        }
    }

    pub fn version(&self) -> &'static str { "v1" }

    pub fn api_version(&self) -> String {
        if self.group().is_empty() { self.version().to_string() } else { format!("{}/{}", self.group(), self.version()) }
    }

    /// Plural resource name used in API paths.
    pub fn plural(&self) -> &'static str {
        match self {
            Kind::ConfigMap => "configmaps",
            Kind::Secret => "secrets",
            Kind::Deployment => "deployments",
            Kind::Service => "services",
            Kind::Ingress => "ingresses",
        }
    }
}

/// One target object. Built once by the composer and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    ConfigMap(ConfigMap),
    Secret(Secret),
    Deployment(Deployment),
    Service(Service),
    Ingress(Ingress),
}

impl Descriptor {
    pub fn kind(&self) -> Kind {
        match self {
            Descriptor::ConfigMap(_) => Kind::ConfigMap,
            Descriptor::Secret(_) => Kind::Secret,
            Descriptor::Deployment(_) => Kind::Deployment,
            Descriptor::Service(_) => Kind::Service,
            Descriptor::Ingress(_) => Kind::Ingress,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Descriptor::ConfigMap(o) => &o.metadata,
            Descriptor::Secret(o) => &o.metadata,
            Descriptor::Deployment(o) => &o.metadata,
            Descriptor::Service(o) => &o.metadata,
            Descriptor::Ingress(o) => &o.metadata,
        }
    }

    pub fn name(&self) -> &str { self.metadata().name.as_deref().unwrap_or("") }
    pub fn namespace(&self) -> Option<&str> { self.metadata().namespace.as_deref() }

    pub fn labels(&self) -> Option<&BTreeMap<String, String>> { self.metadata().labels.as_ref() }

    /// `Kind/namespace/name`, stable across compositions.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.kind().as_str(), self.namespace().unwrap_or("-"), self.name())
    }

    pub fn as_deployment(&self) -> Option<&Deployment> {
        if let Descriptor::Deployment(d) = self { Some(d) } else { None }
    }

    pub fn as_service(&self) -> Option<&Service> {
        if let Descriptor::Service(s) = self { Some(s) } else { None }
    }

    pub fn as_ingress(&self) -> Option<&Ingress> {
        if let Descriptor::Ingress(i) = self { Some(i) } else { None }
    }

    pub fn as_config_map(&self) -> Option<&ConfigMap> {
        if let Descriptor::ConfigMap(c) = self { Some(c) } else { None }
    }

    pub fn as_secret(&self) -> Option<&Secret> {
        if let Descriptor::Secret(s) = self { Some(s) } else { None }
    }

    /// Full object including `apiVersion` and `kind`.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl Serialize for Descriptor {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Descriptor::ConfigMap(o) => o.serialize(s),
            Descriptor::Secret(o) => o.serialize(s),
            Descriptor::Deployment(o) => o.serialize(s),
            Descriptor::Service(o) => o.serialize(s),
            Descriptor::Ingress(o) => o.serialize(s),
        }
    }
}
