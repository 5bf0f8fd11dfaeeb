//! `BuildContainer` handler (§4.7, §9.5.iii): pulls source material in a
//! fixed order — local archive, then Git, then registry-as-prebuilt — and
//! invokes the external build daemon via [`ClusterGateway::build_image`].
//! Failure is terminal: there is no partially-built image to retry against.

use async_trait::async_trait;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Task;
use crate::domain::ports::BuildSource;

use super::{acquire_token_or_reschedule, HandlerContext, StageHandler};

pub struct BuildContainerHandler;

/// Resolve the payload's populated variant in the fixed order documented in
/// §9.5.iii: a local archive path wins over a Git URL, which wins over a
/// bare registry pointer treated as already built.
fn resolve_source(task: &Task) -> DomainResult<BuildSource> {
    if let Some(path) = task.payload_str("archive_path") {
        return Ok(BuildSource::LocalArchive { path: path.to_string() });
    }
    if let Some(url) = task.payload_str("git_url") {
        let reference = task.payload_str("git_ref").map(str::to_string);
        return Ok(BuildSource::Git { url: url.to_string(), reference });
    }
    if let Some(image) = task.payload_str("registry_image") {
        return Ok(BuildSource::Registry { image: image.to_string() });
    }
    Err(DomainError::ValidationFailed(
        "build_container payload must supply one of archive_path, git_url, registry_image".to_string(),
    ))
}

#[async_trait]
impl StageHandler for BuildContainerHandler {
    async fn handle(&self, ctx: &HandlerContext, task: &Task) -> DomainResult<()> {
        let source = resolve_source(task)?;

        if !acquire_token_or_reschedule(ctx, task, "build_container", ctx.config.rate_limiting.max_concurrent_builds).await? {
            return Err(DomainError::RateLimited { bucket: "build_container".to_string() });
        }

        let build_result = ctx.cluster.build_image(&source).await;
        ctx.tokens.release("build_container", task.id).await?;

        build_result?;
        Ok(())
    }
}
