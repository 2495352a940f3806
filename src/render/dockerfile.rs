//! Dockerfile generation for the analysis container.
//!
//! The image pins the interpreter version, restores the locked dependency
//! library and then runs the caller-supplied install script. Line order is
//! significant: `FROM` precedes every `COPY`.

use tracing::debug;

use super::lines::{LineBuilder, LineGroup};
use super::params::RenderParameters;
use super::{Artifact, ArtifactKind, TextResource};
use crate::error::RenderError;

/// Builder for the container build descriptor.
#[derive(Debug, Clone)]
pub struct DockerfileBuilder<'a> {
    params: &'a RenderParameters,
    install_script: Option<&'a TextResource>,
}

impl<'a> DockerfileBuilder<'a> {
    pub fn new(params: &'a RenderParameters) -> Self {
        Self {
            params,
            install_script: None,
        }
    }

    /// Attach the dependency install script appended at the end of the file.
    pub fn install_script(mut self, script: &'a TextResource) -> Self {
        self.install_script = Some(script);
        self
    }

    pub fn build(&self) -> Result<Artifact, RenderError> {
        let base_image = self.params.base_image()?;
        let install = self
            .install_script
            .filter(|script| !script.is_blank())
            .ok_or_else(|| {
                RenderError::MissingDependencyScript(
                    self.install_script
                        .map(|script| format!("'{}' is empty", script.name))
                        .unwrap_or_else(|| "no install script supplied".to_string()),
                )
            })?;

        let layout = &self.params.container;
        let copy = |path: &str| format!("COPY {} {}", path, path);

        let mut analysis = LineGroup::new()
            .line(copy(&self.params.files.analysis_script))
            .when(layout.copy_analysis);
        if let Some(dataset) = &layout.dataset_file {
            analysis = analysis.line(copy(dataset));
        }

        let mut dependencies = LineGroup::new().line(copy(&layout.lock_file));
        if let Some(library) = &layout.library_dir {
            dependencies = dependencies.line(copy(library));
        }

        let lines = LineBuilder::new()
            .group(LineGroup::new().line(format!("FROM {}", base_image)))
            .group(LineGroup::new().line(format!("WORKDIR {}", layout.workdir)))
            .group(dependencies)
            .group(analysis)
            // Kept as one entry so line endings survive; the file terminator
            // supplies the final newline.
            .group(LineGroup::new().line(
                install
                    .contents
                    .strip_suffix('\n')
                    .unwrap_or(&install.contents),
            ))
            .build();

        debug!(
            base_image = %base_image,
            install_script = %install.name,
            lines = lines.len(),
            "Rendered Dockerfile"
        );

        Ok(Artifact::new(
            ArtifactKind::ContainerDescriptor,
            self.params.files.dockerfile.clone(),
            lines,
        ))
    }
}

/// Render the Dockerfile for `params`, appending `install_script` verbatim.
pub fn render_container_descriptor(
    params: &RenderParameters,
    install_script: Option<&TextResource>,
) -> Result<Artifact, RenderError> {
    let mut builder = DockerfileBuilder::new(params);
    if let Some(script) = install_script {
        builder = builder.install_script(script);
    }
    builder.build()
}
