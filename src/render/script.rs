//! Job executable script generation.
//!
//! The script runs on the execute node: it unpacks the transferred subsets,
//! reads the manifest, runs the analysis once per subset and compresses the
//! output directory into the archive named in `transfer_output_files`.

use tracing::debug;

use super::lines::{LineBuilder, LineGroup};
use super::params::RenderParameters;
use super::{Artifact, ArtifactKind};
use crate::error::RenderError;
use crate::partition::manifest::MANIFEST_HEADER;

const ARCHIVE_COMMAND: &str = "tar -czf ";

/// Quote `value` for the shell unless it is made only of safe characters.
fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | '+'));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Render the executable wrapper script.
pub fn render_executable_script(params: &RenderParameters) -> Result<Artifact, RenderError> {
    params.validate_files()?;

    let files = &params.files;
    let manifest = shell_quote(&files.manifest);
    let output_dir = shell_quote(&files.output_dir);
    let output_archive = shell_quote(&files.output_archive);

    let read_manifest = [
        "{".to_string(),
        "  read -r _header || true".to_string(),
        "  while IFS= read -r line || [ -n \"$line\" ]; do".to_string(),
        "    line=\"${line%$'\\r'}\"".to_string(),
        "    name=\"${line#\\\"}\"".to_string(),
        "    name=\"${name%\\\"}\"".to_string(),
        format!(
            "    if [ -z \"$name\" ] || [ \"$name\" = \"{}\" ]; then",
            MANIFEST_HEADER
        ),
        "      continue".to_string(),
        "    fi".to_string(),
        "    case \"$name\" in".to_string(),
        "      *\\\"*|*,*)".to_string(),
        "        echo \"malformed manifest line: $line\" >&2".to_string(),
        "        exit 1".to_string(),
        "        ;;".to_string(),
        "    esac".to_string(),
        "    files+=(\"$name\")".to_string(),
        "  done".to_string(),
        format!("}} < {}", manifest),
    ];

    let lines = LineBuilder::new()
        .group(
            LineGroup::new()
                .line("#!/bin/bash")
                .line(format!("# {}: run the analysis on every subset", files.executable))
                .line("set -euo pipefail"),
        )
        .group(LineGroup::new().line(format!("tar -xzf {}", shell_quote(&files.input_archive))))
        .group(LineGroup::new().line(format!("mkdir -p {}", output_dir)))
        .group(LineGroup::new().line("files=()"))
        .group(LineGroup::new().lines(read_manifest))
        .group(LineGroup::new().lines([
            "for file in ${files[@]+\"${files[@]}\"}; do".to_string(),
            format!(
                "  {} {} \"$file\" {}",
                params.runtime.language.interpreter(),
                shell_quote(&files.analysis_script),
                output_dir
            ),
            "done".to_string(),
        ]))
        .group(LineGroup::new().line(format!(
            "{}{} {}",
            ARCHIVE_COMMAND, output_archive, output_dir
        )))
        .build();

    debug!(
        executable = %files.executable,
        archive = %files.output_archive,
        "Rendered executable script"
    );

    Ok(Artifact::new(
        ArtifactKind::ExecutableScript,
        files.executable.clone(),
        lines,
    ))
}

/// Extract the name of the archive the script compresses its output into.
pub fn archive_name(script: &str) -> Option<String> {
    script.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix(ARCHIVE_COMMAND)?;
        shell_word(rest)
    })
}

/// Read the first shell word of `text`, undoing single quotes and
/// backslash escapes. Returns `None` for an empty or unterminated word.
fn shell_word(text: &str) -> Option<String> {
    let mut word = String::new();
    let mut started = false;
    let mut chars = text.trim_start().chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                started = true;
                loop {
                    match chars.next()? {
                        '\'' => break,
                        quoted => word.push(quoted),
                    }
                }
            }
            '\\' => {
                started = true;
                word.push(chars.next()?);
            }
            c if c.is_whitespace() => break,
            c => {
                started = true;
                word.push(c);
            }
        }
    }
    started.then_some(word)
}
