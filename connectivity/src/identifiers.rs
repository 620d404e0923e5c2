//! Application and scene identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Identifies an application hosted in a federation.
///
/// Text form: `[cluster/]directory/application`. Without a cluster the
/// application is looked up on the federation's current cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationIdentifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    pub directory: String,
    pub application: String,
}

impl ApplicationIdentifier {
    pub fn new(directory: impl Into<String>, application: impl Into<String>) -> Self {
        Self {
            cluster: None,
            directory: directory.into(),
            application: application.into(),
        }
    }

    /// Pin the application to a specific cluster
    pub fn on_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn scene(&self, scene: impl Into<String>) -> SceneIdentifier {
        SceneIdentifier {
            application: self.clone(),
            scene: scene.into(),
        }
    }
}

impl fmt::Display for ApplicationIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(cluster) = &self.cluster {
            write!(f, "{}/", cluster)?;
        }
        write!(f, "{}/{}", self.directory, self.application)
    }
}

impl FromStr for ApplicationIdentifier {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid_application(s));
        }
        match parts.as_slice() {
            [directory, application] => Ok(Self::new(*directory, *application)),
            [cluster, directory, application] => {
                Ok(Self::new(*directory, *application).on_cluster(*cluster))
            }
            _ => Err(invalid_application(s)),
        }
    }
}

fn invalid_application(text: &str) -> ClientError {
    ClientError::configuration(format!(
        "Invalid application identifier '{}', expected [cluster/]directory/application",
        text
    ))
}

/// A scene inside an application. Text form: `{application}/{scene}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneIdentifier {
    pub application: ApplicationIdentifier,
    pub scene: String,
}

impl fmt::Display for SceneIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.application, self.scene)
    }
}
