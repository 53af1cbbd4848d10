//! rtsvg core: configuration resolution, label sets and resource naming.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod config;
pub mod labels;

pub use config::{Config, PartialConfig};
pub use labels::{LabelSet, Role};

/// Fixed application identifier; every resource name derives from it.
pub const APP_NAME: &str = "realtime-svg";

/// Value of the `app.kubernetes.io/managed-by` label.
pub const MANAGED_BY: &str = "rtsvg";

/// Names of the resources a composition may emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Names {
    pub app: String,
    pub cache: String,
    pub config: String,
    pub secret: String,
}

impl Names {
    pub fn new(app: &str) -> Self {
        Self {
            app: app.to_string(),
            cache: format!("{}-cache", app),
            config: format!("{}-config", app),
            secret: format!("{}-secret", app),
        }
    }
}

impl Default for Names {
    fn default() -> Self { Self::new(APP_NAME) }
}

pub mod prelude {
    pub use super::{Config, LabelSet, Names, PartialConfig, Role, APP_NAME, MANAGED_BY};
}
