//! HTCondor submit descriptor generation.

use tracing::debug;

use super::lines::{LineBuilder, LineGroup};
use super::params::RenderParameters;
use super::{Artifact, ArtifactKind};
use crate::error::RenderError;

/// Key under which the output archive is declared.
pub const TRANSFER_OUTPUT_KEY: &str = "transfer_output_files";

/// Render the submit descriptor.
///
/// Stanzas are emitted in a fixed order: header, container, executable,
/// transfer, logging, resources, queue.
pub fn render_submit_descriptor(params: &RenderParameters) -> Result<Artifact, RenderError> {
    params.resources.validate()?;
    if params.queue < 1 {
        return Err(RenderError::InvalidQueueCount(params.queue));
    }
    params.image.validate()?;
    params.validate_files()?;

    let files = &params.files;
    let title = files
        .executable
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(&files.executable);

    let lines = LineBuilder::new()
        .group(LineGroup::new().line(format!("# {} submit description", title)))
        .group(
            LineGroup::new()
                .assign("container_image", params.image.docker_uri())
                .assign("universe", "container"),
        )
        .group(LineGroup::new().assign("executable", &files.executable))
        .group(
            LineGroup::new()
                .assign("transfer_input_files", params.input_files().join(", "))
                .assign(TRANSFER_OUTPUT_KEY, &files.output_archive),
        )
        .group(
            LineGroup::new()
                .assign("log", &files.log)
                .assign("error", &files.error)
                .assign("output", &files.output),
        )
        .group(
            LineGroup::new()
                .assign("request_cpus", params.resources.cpus)
                .assign("request_memory", params.resources.memory)
                .assign("request_disk", params.resources.disk),
        )
        .group(LineGroup::new().line(format!("queue {}", params.queue)))
        .build();

    debug!(
        image = %params.image,
        queue = params.queue,
        "Rendered submit descriptor"
    );

    Ok(Artifact::new(
        ArtifactKind::SubmitDescriptor,
        files.submit.clone(),
        lines,
    ))
}

/// Extract the `transfer_output_files` value from submit descriptor text.
pub fn declared_output(submit: &str) -> Option<String> {
    submit.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        (key.trim() == TRANSFER_OUTPUT_KEY).then(|| value.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::params::{ImageReference, ResourceQuantity, ResourceRequest};

    fn params() -> RenderParameters {
        RenderParameters::new(ImageReference::new(
            "registry.example.org",
            "lab/analysis",
            "v1",
        ))
    }

    #[test]
    fn test_submit_descriptor_layout() {
        let contents = render_submit_descriptor(&params()).unwrap().contents();
        let expected = "\
# analysis submit description

container_image = docker://registry.example.org/lab/analysis:v1
universe = container

executable = analysis.sh

transfer_input_files = data.tar.gz, analysis.R, manifest.csv
transfer_output_files = results.tar.gz

log = job.log
error = job.err
output = job.out

request_cpus = 1
request_memory = 4GB
request_disk = 2GB

queue 1
";
        assert_eq!(contents, expected);
    }

    #[test]
    fn test_submit_descriptor_is_deterministic() {
        let p = params();
        let first = render_submit_descriptor(&p).unwrap();
        let second = render_submit_descriptor(&p).unwrap();
        assert_eq!(first.contents().as_bytes(), second.contents().as_bytes());
    }

    #[test]
    fn test_minimal_resources_succeed() {
        let mut p = params();
        p.resources = ResourceRequest {
            cpus: 1,
            memory: ResourceQuantity::gigabytes(4.0),
            disk: ResourceQuantity::gigabytes(2.0),
        };
        p.queue = 1;
        let artifact = render_submit_descriptor(&p).unwrap();
        assert!(artifact.lines.contains(&"queue 1".to_string()));
    }

    #[test]
    fn test_zero_cpus_rejected() {
        let mut p = params();
        p.resources.cpus = 0;
        assert!(matches!(
            render_submit_descriptor(&p),
            Err(RenderError::InvalidResourceRequest { .. })
        ));
    }

    #[test]
    fn test_non_positive_quantities_rejected() {
        let mut p = params();
        p.resources.disk = ResourceQuantity::gigabytes(0.0);
        assert!(matches!(
            render_submit_descriptor(&p),
            Err(RenderError::InvalidResourceRequest { .. })
        ));
    }

    #[test]
    fn test_zero_queue_rejected() {
        let mut p = params();
        p.queue = 0;
        assert!(matches!(
            render_submit_descriptor(&p),
            Err(RenderError::InvalidQueueCount(0))
        ));
    }

    #[test]
    fn test_queue_count_and_extra_inputs() {
        let mut p = params();
        p.queue = 12;
        p.files.extra_inputs = vec!["helpers.R".to_string()];
        let contents = render_submit_descriptor(&p).unwrap().contents();
        assert!(contents.ends_with("queue 12\n"));
        assert!(contents
            .contains("transfer_input_files = data.tar.gz, analysis.R, manifest.csv, helpers.R"));
    }

    #[test]
    fn test_declared_output() {
        let contents = render_submit_descriptor(&params()).unwrap().contents();
        assert_eq!(declared_output(&contents).as_deref(), Some("results.tar.gz"));
        assert_eq!(declared_output("queue 1\n"), None);
    }
}
