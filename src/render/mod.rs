//! Submission artifact rendering.
//!
//! This module renders the three text files an HTCondor container job needs:
//! the Dockerfile for the analysis image, the submit descriptor and the
//! executable wrapper script. Renderers are stateless: identical parameters
//! always produce byte-identical artifacts.
//!
//! # Example
//!
//! ```ignore
//! use htc_forge::render::{render_all, ImageReference, RenderParameters, TextResource};
//!
//! let params = RenderParameters::new(ImageReference::new("registry.example.org", "lab/analysis", "v1"));
//! let install = TextResource::from_path("install_packages.R")?;
//! let artifacts = render_all(&params, Some(&install))?;
//! ```

pub mod dockerfile;
pub mod lines;
pub mod params;
pub mod script;
pub mod submit;

pub use dockerfile::{render_container_descriptor, DockerfileBuilder};
pub use lines::{LineBuilder, LineGroup};
pub use params::{
    ContainerLayout, ImageReference, JobFiles, RenderParameters, ResourceQuantity,
    ResourceRequest, Runtime, RuntimeLanguage, BASE_PYTHON, BASE_R,
};
pub use script::render_executable_script;
pub use submit::render_submit_descriptor;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

use crate::error::RenderError;

/// Which of the three artifacts a rendered file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ContainerDescriptor,
    SubmitDescriptor,
    ExecutableScript,
}

impl ArtifactKind {
    /// Whether the written file must carry the executable bit.
    pub fn is_executable(self) -> bool {
        matches!(self, ArtifactKind::ExecutableScript)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::ContainerDescriptor => write!(f, "container_descriptor"),
            ArtifactKind::SubmitDescriptor => write!(f, "submit_descriptor"),
            ArtifactKind::ExecutableScript => write!(f, "executable_script"),
        }
    }
}

/// A rendered text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub file_name: String,
    pub lines: Vec<String>,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, file_name: String, lines: Vec<String>) -> Self {
        Self {
            kind,
            file_name,
            lines,
        }
    }

    /// File contents, newline-terminated.
    pub fn contents(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }

    /// Hex-encoded SHA-256 of [`Artifact::contents`].
    pub fn sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.contents().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A named text blob injected into a renderer, such as the dependency
/// install script appended to the Dockerfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextResource {
    pub name: String,
    pub contents: String,
}

impl TextResource {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }

    /// Read a resource from disk. An unreadable file is reported as a
    /// missing dependency script.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RenderError::MissingDependencyScript(format!("{}: {}", path.display(), e))
        })?;
        Ok(Self::new(path.display().to_string(), contents))
    }

    pub fn is_blank(&self) -> bool {
        self.contents.trim().is_empty()
    }
}

/// The three artifacts rendered from one parameter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobArtifacts {
    pub dockerfile: Artifact,
    pub submit: Artifact,
    pub script: Artifact,
}

impl JobArtifacts {
    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        [&self.dockerfile, &self.submit, &self.script].into_iter()
    }
}

/// Render all three artifacts, failing before anything is returned if any
/// renderer rejects the parameters.
pub fn render_all(
    params: &RenderParameters,
    install_script: Option<&TextResource>,
) -> Result<JobArtifacts, RenderError> {
    params.validate()?;

    let artifacts = JobArtifacts {
        dockerfile: render_container_descriptor(params, install_script)?,
        submit: render_submit_descriptor(params)?,
        script: render_executable_script(params)?,
    };
    check_consistency(&artifacts.submit.contents(), &artifacts.script.contents())?;

    tracing::info!(
        image = %params.image,
        queue = params.queue,
        "Rendered submission artifacts"
    );

    Ok(artifacts)
}

/// Verify that the archive the script produces is the one the submit
/// descriptor asks the scheduler to transfer back.
pub fn check_consistency(submit: &str, script: &str) -> Result<String, RenderError> {
    let declared = submit::declared_output(submit).ok_or_else(|| {
        RenderError::InconsistentArtifacts(format!(
            "submit descriptor has no {} line",
            submit::TRANSFER_OUTPUT_KEY
        ))
    })?;
    let produced = script::archive_name(script).ok_or_else(|| {
        RenderError::InconsistentArtifacts("script never archives its output".to_string())
    })?;

    if declared != produced {
        return Err(RenderError::InconsistentArtifacts(format!(
            "submit descriptor transfers '{}' but script produces '{}'",
            declared, produced
        )));
    }
    Ok(declared)
}
