//! Volume handles.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{EngineContext, Presence};
use crate::machine::command;

/// One entry of `docker volume inspect` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeInfo {
    pub name: String,
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub mountpoint: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub options: Option<BTreeMap<String, String>>,
}

/// Parse `docker volume inspect` output.
pub fn parse_inspection(output: &str) -> serde_json::Result<Vec<VolumeInfo>> {
    serde_json::from_str(output)
}

/// A named volume. No state is cached.
#[derive(Clone)]
pub struct DockerVolume {
    ctx: Arc<EngineContext>,
    name: String,
}

impl std::fmt::Debug for DockerVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerVolume").field("name", &self.name).finish()
    }
}

impl DockerVolume {
    pub fn new(ctx: Arc<EngineContext>, name: impl Into<String>) -> Self {
        Self {
            ctx,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn create(&self) -> Result<&Self> {
        self.ctx.call(&command::volume_create(&self.name)).await?;
        Ok(self)
    }

    pub async fn remove(&self) -> Result<()> {
        self.ctx.call(&command::volume_remove(&self.name)).await
    }

    /// Inspect the volume. Any failure, including a volume that does not
    /// exist, is logged and yields an empty list.
    pub async fn inspect(&self) -> Vec<VolumeInfo> {
        let output = match self.ctx.capture_typed(&command::volume_inspect(&self.name)).await {
            Ok(output) => output,
            Err(err) => {
                warn!(volume = %self.name, error = %err, "volume inspection failed (volume probably does not exist)");
                return Vec::new();
            }
        };

        parse_inspection(&output).unwrap_or_else(|err| {
            warn!(volume = %self.name, error = %err, "unparseable volume inspection output");
            Vec::new()
        })
    }

    /// Ask the engine whether the volume exists, keeping tool failures
    /// apart from absence.
    pub async fn exists(&self) -> Presence {
        match self.ctx.capture_typed(&command::volume_inspect(&self.name)).await {
            Ok(output) => match parse_inspection(&output) {
                Ok(volumes) if volumes.iter().any(|v| v.name == self.name) => Presence::Present,
                Ok(_) => Presence::Absent,
                Err(err) => Presence::Unknown(format!("unparseable inspection output: {err}")),
            },
            Err(err) => Presence::from_failure(&err),
        }
    }
}
