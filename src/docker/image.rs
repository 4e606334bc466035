//! Image handles.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use super::EngineContext;
use super::container::DockerContainer;
use crate::machine::command::{self, RunOptions};

/// Default tag for images and repository tags.
pub const DEFAULT_TAG: &str = "latest";

/// An image reference: name plus tag.
#[derive(Clone)]
pub struct DockerImage {
    ctx: Arc<EngineContext>,
    name: String,
    tag: String,
}

impl std::fmt::Debug for DockerImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerImage")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .finish()
    }
}

impl DockerImage {
    pub fn new(ctx: Arc<EngineContext>, name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            ctx,
            name: name.into(),
            tag: tag.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag_name(&self) -> &str {
        &self.tag
    }

    /// `name:tag`.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }

    /// Tag this image as `repo:repo_tag`.
    pub async fn tag(&self, repo: &str, repo_tag: &str) -> Result<()> {
        self.ctx
            .call(&command::docker_tag(&self.name, &self.tag, repo, repo_tag))
            .await
    }

    pub async fn push(&self, repo: &str) -> Result<()> {
        info!(repo, "pushing image");
        self.ctx.call(&command::docker_push(repo)).await
    }

    pub async fn save(&self, file: &Path) -> Result<()> {
        self.ctx.call(&command::docker_save(&self.name, file)).await
    }

    /// Handle for a container of this image. Nothing is dispatched.
    pub fn container(&self, name: Option<String>) -> DockerContainer {
        DockerContainer::new(Arc::clone(&self.ctx), self.clone(), name)
    }

    /// `docker run` this image.
    ///
    /// Values of an [`EnvVars::Values`](command::EnvVars::Values) set are
    /// merged into the dispatch environment; only their names go on the
    /// command line.
    pub async fn run(&self, opts: &RunOptions) -> Result<DockerContainer> {
        let cmd = command::docker_run(&self.name, &self.tag, opts, self.ctx.shared_folder_root());

        match opts.env.as_ref().and_then(|env| env.values()) {
            Some(values) => {
                let env = self.ctx.env().with_vars(values);
                self.ctx.call_with(&env, &cmd).await?;
            }
            None => self.ctx.call(&cmd).await?,
        }

        info!(image = %self.reference(), container = ?opts.container_name, "container started");
        Ok(self.container(opts.container_name.clone()))
    }
}
