//! The container-engine client.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use super::container::DockerContainer;
use super::image::DockerImage;
use super::version::bump_version_file;
use super::volume::DockerVolume;
use super::{BuildFiles, EngineContext};
use crate::machine::command;
use crate::machine::env::{DOCKER_HOST, EngineEnv};

/// Builds, loads and cleans up images on one engine, and hands out
/// resource handles bound to it.
#[derive(Clone)]
pub struct Docker {
    ctx: Arc<EngineContext>,
    build_files: BuildFiles,
}

impl std::fmt::Debug for Docker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Docker")
            .field("host", &self.ctx.env().get(DOCKER_HOST))
            .field("build_files", &self.build_files)
            .finish()
    }
}

impl Docker {
    pub fn new(ctx: Arc<EngineContext>, build_files: BuildFiles) -> Self {
        Self { ctx, build_files }
    }

    pub fn env(&self) -> &EngineEnv {
        self.ctx.env()
    }

    pub(crate) fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn image(&self, name: impl Into<String>, tag: impl Into<String>) -> DockerImage {
        DockerImage::new(Arc::clone(&self.ctx), name, tag)
    }

    /// Handle for an existing container, by name.
    pub fn container(&self, name: impl Into<String>) -> DockerContainer {
        DockerContainer::named(Arc::clone(&self.ctx), name)
    }

    pub fn volume(&self, name: impl Into<String>) -> DockerVolume {
        DockerVolume::new(Arc::clone(&self.ctx), name)
    }

    /// Build `dir` as `image:tag`.
    ///
    /// Runs the pre-build hook and bumps the version file first when either
    /// exists in `dir`; neither is required.
    pub async fn build(&self, image: &str, tag: &str, dir: &Path) -> Result<DockerImage> {
        let hook = dir.join(&self.build_files.hook);
        if hook.is_file() {
            info!(hook = %hook.display(), "running pre-build hook");
            let output = self
                .ctx
                .capture(&command::pre_build_hook(dir, &self.build_files.hook))
                .await?;
            debug!(hook = %hook.display(), %output, "pre-build hook finished");
        }

        let version_file = dir.join(&self.build_files.version_file);
        if version_file.is_file() {
            let version = bump_version_file(&version_file).await?;
            info!(%version, "bumped build version");
        }

        info!(image, tag, dir = %dir.display(), "building image");
        self.ctx.call(&command::docker_build(image, tag, dir)).await?;
        Ok(self.image(image, tag))
    }

    /// `docker load` an image archive and return a handle for `image:tag`.
    pub async fn load(&self, file: &Path, image: &str, tag: &str) -> Result<DockerImage> {
        self.ctx.call(&command::docker_load(file)).await?;
        Ok(self.image(image, tag))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        info!(username, "logging in to registry");
        self.ctx.call(&command::docker_login(username, password)).await
    }

    pub async fn delete_containers(&self) -> Result<()> {
        self.ctx.call(&command::remove_all_containers()).await
    }

    pub async fn delete_images(&self) -> Result<()> {
        self.ctx.call(&command::remove_all_images()).await
    }

    /// Force-remove all containers, then all images.
    pub async fn cleanup(&self) -> Result<()> {
        info!("removing all containers and images");
        self.delete_containers().await?;
        self.delete_images().await
    }
}
