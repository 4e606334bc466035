//! Container handles.
//!
//! A [`DockerContainer`] only remembers its name and image. State queries go
//! to the engine every time and are not authoritative.

use std::sync::Arc;

use anyhow::{Result, anyhow};

use super::image::DockerImage;
use super::{EngineContext, Presence};
use crate::machine::command;

#[derive(Clone)]
pub struct DockerContainer {
    ctx: Arc<EngineContext>,
    image: Option<DockerImage>,
    name: Option<String>,
}

impl std::fmt::Debug for DockerContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerContainer")
            .field("image", &self.image)
            .field("name", &self.name)
            .finish()
    }
}

impl DockerContainer {
    pub fn new(ctx: Arc<EngineContext>, image: DockerImage, name: Option<String>) -> Self {
        Self {
            ctx,
            image: Some(image),
            name,
        }
    }

    /// Handle for an existing container known only by name.
    pub fn named(ctx: Arc<EngineContext>, name: impl Into<String>) -> Self {
        Self {
            ctx,
            image: None,
            name: Some(name.into()),
        }
    }

    /// Container name, if it was started with one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn image(&self) -> Option<&DockerImage> {
        self.image.as_ref()
    }

    fn require_name(&self) -> Result<&str> {
        self.name.as_deref().ok_or_else(|| match &self.image {
            Some(image) => anyhow!("container of {} has no name", image.reference()),
            None => anyhow!("container has no name"),
        })
    }

    pub async fn start(&self) -> Result<&Self> {
        self.ctx.call(&command::container_start(self.require_name()?)).await?;
        Ok(self)
    }

    pub async fn stop(&self) -> Result<&Self> {
        self.ctx.call(&command::container_stop(self.require_name()?)).await?;
        Ok(self)
    }

    pub async fn remove(&self) -> Result<&Self> {
        self.ctx.call(&command::container_remove(self.require_name()?)).await?;
        Ok(self)
    }

    /// Attach the caller's terminal to the container until it detaches.
    pub async fn attach(&self) -> Result<&Self> {
        self.ctx.call(&command::container_attach(self.require_name()?)).await?;
        Ok(self)
    }

    /// `docker exec` a command in the running container.
    pub async fn exec(&self, cmd: &str) -> Result<&Self> {
        self.ctx
            .call(&command::container_exec(self.require_name()?, cmd))
            .await?;
        Ok(self)
    }

    /// Ask the engine whether the container exists.
    pub async fn exists(&self) -> Result<Presence> {
        let name = self.require_name()?;
        Ok(match self.ctx.capture_typed(&command::container_inspect(name)).await {
            Ok(_) => Presence::Present,
            Err(err) => Presence::from_failure(&err),
        })
    }
}
