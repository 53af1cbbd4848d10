//! rtsvg compose: builds the realtime-svg resource set from a resolved config.
//!
//! Composition is a pure function: the same [`Config`] always yields the same
//! descriptors and outputs. Optional resources appear only when their flag is
//! set, and so do the outputs that describe them.

#![forbid(unsafe_code)]

use rtsvg_core::{Config, Names};
use rtsvg_deferred::DeferredError;

mod builder;
pub mod descriptor;
pub mod outputs;
pub mod wiring;

pub use builder::{CACHE_IMAGE, HTTP_PORT_NAME, KEY_LOG_LEVEL, KEY_PORT, KEY_REDIS_URL};
pub use descriptor::{Descriptor, Kind};
pub use outputs::Outputs;

/// Composition fails only on wiring defects, never on configuration data.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("deferred value wiring: {0}")]
    Deferred(#[from] DeferredError),
}

/// Descriptors plus the outputs derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition<O> {
    pub descriptors: Vec<Descriptor>,
    pub outputs: O,
}

impl<O> Composition<O> {
    pub fn find(&self, kind: Kind, name: &str) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.kind() == kind && d.name() == name)
    }

    pub fn of_kind(&self, kind: Kind) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter().filter(move |d| d.kind() == kind)
    }
}

/// Something that turns a config into descriptors and outputs.
pub trait Component {
    type Config;
    type Outputs;

    /// Type token, e.g. `rtsvg:app:RealtimeSvg`.
    fn type_name(&self) -> &str;

    fn build(&self, config: &Self::Config) -> Result<Composition<Self::Outputs>, ComposeError>;
}

/// The realtime-svg backend with its optional cache and ingress.
#[derive(Debug, Clone, Default)]
pub struct RealtimeSvg {
    names: Names,
}

impl RealtimeSvg {
    pub fn new() -> Self { Self::default() }

    /// Same component under another application identifier.
    pub fn named(app: &str) -> Self { Self { names: Names::new(app) } }

    pub fn names(&self) -> &Names { &self.names }
}

impl Component for RealtimeSvg {
    type Config = Config;
    type Outputs = Outputs;

    fn type_name(&self) -> &str { "rtsvg:app:RealtimeSvg" }

    fn build(&self, config: &Config) -> Result<Composition<Outputs>, ComposeError> {
        builder::build(&self.names, config)
    }
}

/// Build with the default application identifier.
pub fn compose(config: &Config) -> Result<Composition<Outputs>, ComposeError> {
    RealtimeSvg::new().build(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtsvg_core::PartialConfig;

    #[test]
    fn defaults_build_everything() {
        let comp = compose(&Config::default()).unwrap();
        let keys: Vec<_> = comp.descriptors.iter().map(|d| d.key()).collect();
        assert_eq!(
            keys,
            vec![
                "ConfigMap/default/realtime-svg-config",
                "Secret/default/realtime-svg-secret",
                "Deployment/default/realtime-svg",
                "Service/default/realtime-svg",
                "Deployment/default/realtime-svg-cache",
                "Service/default/realtime-svg-cache",
                "Ingress/default/realtime-svg",
            ]
        );
        assert_eq!(comp.outputs.ingress_url.as_deref(), Some("http://realtime-svg.example.com"));
        assert_eq!(comp.outputs.cache_service_name.as_deref(), Some("realtime-svg-cache"));
    }

    #[test]
    fn named_component_renames_everything() {
        let comp = RealtimeSvg::named("svg").build(&Config::default()).unwrap();
        assert!(comp.find(Kind::Deployment, "svg").is_some());
        assert!(comp.find(Kind::Service, "svg-cache").is_some());
        assert!(comp.find(Kind::ConfigMap, "svg-config").is_some());
        let cm = comp.find(Kind::ConfigMap, "svg-config").and_then(|d| d.as_config_map()).unwrap();
        let data = cm.data.as_ref().unwrap();
        assert_eq!(data.get(KEY_REDIS_URL).map(String::as_str), Some("redis://svg-cache:6379/"));
    }

    #[test]
    fn bare_composition_has_four_descriptors() {
        let c = PartialConfig { cache_enabled: Some(false), ingress_enabled: Some(false), ..Default::default() }.resolve();
        let comp = compose(&c).unwrap();
        assert_eq!(comp.descriptors.len(), 4);
        assert_eq!(comp.of_kind(Kind::Deployment).count(), 1);
        assert_eq!(comp.of_kind(Kind::Ingress).count(), 0);
    }
}
