//! Render parameters shared by the Dockerfile, submit descriptor and job script.
//!
//! Every file name that appears in more than one artifact lives here, so the
//! three renderers always agree on the input archive, manifest, executable and
//! output archive names.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::RenderError;

/// Base image for R analyses.
pub const BASE_R: &str = "rocker/r-ver";

/// Base image for Python analyses.
pub const BASE_PYTHON: &str = "python";

static REGISTRY_PATTERN: OnceLock<Regex> = OnceLock::new();
static REPOSITORY_PATTERN: OnceLock<Regex> = OnceLock::new();
static TAG_PATTERN: OnceLock<Regex> = OnceLock::new();

fn registry_pattern() -> &'static Regex {
    REGISTRY_PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9.-]*[A-Za-z0-9])?(:[0-9]+)?$")
            .expect("registry pattern is valid")
    })
}

fn repository_pattern() -> &'static Regex {
    REPOSITORY_PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]+([._-][a-z0-9]+)*(/[a-z0-9]+([._-][a-z0-9]+)*)*$")
            .expect("repository pattern is valid")
    })
}

fn tag_pattern() -> &'static Regex {
    TAG_PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("tag pattern is valid")
    })
}

/// Language the analysis is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeLanguage {
    #[default]
    R,
    Python,
}

impl RuntimeLanguage {
    /// Default base image for this language.
    pub fn base_image(self) -> &'static str {
        match self {
            RuntimeLanguage::R => BASE_R,
            RuntimeLanguage::Python => BASE_PYTHON,
        }
    }

    /// Command used to run the analysis entry point inside the job.
    pub fn interpreter(self) -> &'static str {
        match self {
            RuntimeLanguage::R => "Rscript",
            RuntimeLanguage::Python => "python3",
        }
    }
}

impl fmt::Display for RuntimeLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeLanguage::R => write!(f, "r"),
            RuntimeLanguage::Python => write!(f, "python"),
        }
    }
}

/// Analysis runtime: language plus interpreter version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runtime {
    #[serde(default)]
    pub language: RuntimeLanguage,
    pub version: String,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            language: RuntimeLanguage::R,
            version: "4.3.1".to_string(),
        }
    }
}

impl Runtime {
    /// Image tag in `major.minor` form derived from the runtime version.
    ///
    /// Accepts `major.minor` and `major.minor.patch` (with optional
    /// pre-release suffix).
    pub fn image_tag(&self) -> Result<String, RenderError> {
        let version = self.version.trim();
        if version.is_empty() {
            return Err(RenderError::MissingParameter("runtime.version".to_string()));
        }

        let padded = if version.matches('.').count() == 1 {
            format!("{}.0", version)
        } else {
            version.to_string()
        };

        let parsed = semver::Version::parse(&padded)
            .map_err(|_| RenderError::InvalidRuntimeVersion(version.to_string()))?;
        Ok(format!("{}.{}", parsed.major, parsed.minor))
    }
}

/// Registry coordinates of the analysis container image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    /// Registry host, optionally with port (e.g. `registry.example.org:5000`).
    pub registry: String,
    /// Repository path within the registry (e.g. `lab/analysis`).
    pub repository: String,
    #[serde(default = "default_tag")]
    pub tag: String,
}

fn default_tag() -> String {
    "latest".to_string()
}

impl ImageReference {
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Check each coordinate against the image reference grammar.
    pub fn validate(&self) -> Result<(), RenderError> {
        let invalid = |reason: &str| RenderError::InvalidImageReference {
            reference: self.to_string(),
            reason: reason.to_string(),
        };

        if self.registry.is_empty() {
            return Err(RenderError::MissingParameter("image.registry".to_string()));
        }
        if self.repository.is_empty() {
            return Err(RenderError::MissingParameter("image.repository".to_string()));
        }
        if self.tag.is_empty() {
            return Err(RenderError::MissingParameter("image.tag".to_string()));
        }
        if !registry_pattern().is_match(&self.registry) {
            return Err(invalid("registry must be a host name with optional port"));
        }
        if !repository_pattern().is_match(&self.repository) {
            return Err(invalid(
                "repository must be lowercase path components separated by '/'",
            ));
        }
        if !tag_pattern().is_match(&self.tag) {
            return Err(invalid("tag may only contain letters, digits, '_', '.' and '-'"));
        }
        Ok(())
    }

    /// Image URI in the form the scheduler expects for `container_image`.
    pub fn docker_uri(&self) -> String {
        format!("docker://{}", self)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

/// A memory or disk quantity in gigabytes.
///
/// Deserializes from a number (`4`) or a string with optional unit (`"4GB"`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceQuantity(f64);

impl ResourceQuantity {
    pub fn gigabytes(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    fn validate(self, resource: &str) -> Result<(), RenderError> {
        if !self.0.is_finite() || self.0 <= 0.0 {
            return Err(RenderError::InvalidResourceRequest {
                resource: resource.to_string(),
                reason: format!("quantity must be a positive number, got {}", self.0),
            });
        }
        Ok(())
    }
}

impl FromStr for ResourceQuantity {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let number = ["GB", "gb", "Gb", "G", "g"]
            .iter()
            .find_map(|suffix| trimmed.strip_suffix(suffix))
            .unwrap_or(trimmed)
            .trim();

        number
            .parse::<f64>()
            .map(Self)
            .map_err(|_| RenderError::InvalidResourceRequest {
                resource: "quantity".to_string(),
                reason: format!("'{}' is not a number of gigabytes", s),
            })
    }
}

impl fmt::Display for ResourceQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}GB", self.0)
    }
}

impl Serialize for ResourceQuantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ResourceQuantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(Self(value)),
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Per-job resource request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub cpus: u32,
    pub memory: ResourceQuantity,
    pub disk: ResourceQuantity,
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self {
            cpus: 1,
            memory: ResourceQuantity(4.0),
            disk: ResourceQuantity(2.0),
        }
    }
}

impl ResourceRequest {
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.cpus == 0 {
            return Err(RenderError::InvalidResourceRequest {
                resource: "cpus".to_string(),
                reason: "at least one CPU must be requested".to_string(),
            });
        }
        self.memory.validate("memory")?;
        self.disk.validate("disk")?;
        Ok(())
    }
}

/// File names referenced by the generated artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobFiles {
    pub executable: String,
    pub submit: String,
    pub dockerfile: String,
    pub analysis_script: String,
    pub input_archive: String,
    pub manifest: String,
    pub output_dir: String,
    pub output_archive: String,
    pub extra_inputs: Vec<String>,
    pub log: String,
    pub error: String,
    pub output: String,
}

impl Default for JobFiles {
    fn default() -> Self {
        Self {
            executable: "analysis.sh".to_string(),
            submit: "analysis.sub".to_string(),
            dockerfile: "Dockerfile".to_string(),
            analysis_script: "analysis.R".to_string(),
            input_archive: "data.tar.gz".to_string(),
            manifest: "manifest.csv".to_string(),
            output_dir: "results".to_string(),
            output_archive: "results.tar.gz".to_string(),
            extra_inputs: Vec::new(),
            log: "job.log".to_string(),
            error: "job.err".to_string(),
            output: "job.out".to_string(),
        }
    }
}

/// Layout of the container image built from the Dockerfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerLayout {
    pub workdir: String,
    /// Dependency lock file copied into the working directory.
    pub lock_file: String,
    /// Resolved dependency library copied into the working directory.
    pub library_dir: Option<String>,
    /// Bake the analysis script (and `dataset_file`, if set) into the image.
    pub copy_analysis: bool,
    pub dataset_file: Option<String>,
    /// Overrides the language's default base image.
    pub base_image: Option<String>,
}

impl Default for ContainerLayout {
    fn default() -> Self {
        Self::for_language(RuntimeLanguage::R)
    }
}

impl ContainerLayout {
    pub fn for_language(language: RuntimeLanguage) -> Self {
        let (lock_file, library_dir) = match language {
            RuntimeLanguage::R => ("renv.lock", Some("renv/library".to_string())),
            RuntimeLanguage::Python => ("requirements.txt", None),
        };
        Self {
            workdir: "/home".to_string(),
            lock_file: lock_file.to_string(),
            library_dir,
            copy_analysis: false,
            dataset_file: None,
            base_image: None,
        }
    }
}

/// Immutable parameter set consumed by all three renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderParameters {
    #[serde(default)]
    pub runtime: Runtime,
    pub image: ImageReference,
    #[serde(default)]
    pub resources: ResourceRequest,
    #[serde(default = "default_queue")]
    pub queue: u32,
    #[serde(default)]
    pub files: JobFiles,
    #[serde(default)]
    pub container: ContainerLayout,
}

fn default_queue() -> u32 {
    1
}

impl RenderParameters {
    pub fn new(image: ImageReference) -> Self {
        Self {
            runtime: Runtime::default(),
            image,
            resources: ResourceRequest::default(),
            queue: default_queue(),
            files: JobFiles::default(),
            container: ContainerLayout::default(),
        }
    }

    /// Validate every field used by any of the renderers.
    pub fn validate(&self) -> Result<(), RenderError> {
        self.runtime.image_tag()?;
        self.image.validate()?;
        self.resources.validate()?;
        if self.queue < 1 {
            return Err(RenderError::InvalidQueueCount(self.queue));
        }
        self.validate_files()
    }

    pub(crate) fn validate_files(&self) -> Result<(), RenderError> {
        let required = [
            ("files.executable", &self.files.executable),
            ("files.analysis_script", &self.files.analysis_script),
            ("files.input_archive", &self.files.input_archive),
            ("files.manifest", &self.files.manifest),
            ("files.output_dir", &self.files.output_dir),
            ("files.output_archive", &self.files.output_archive),
            ("files.log", &self.files.log),
            ("files.error", &self.files.error),
            ("files.output", &self.files.output),
            ("container.workdir", &self.container.workdir),
            ("container.lock_file", &self.container.lock_file),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(RenderError::MissingParameter(name.to_string()));
            }
        }
        Ok(())
    }

    /// Files the scheduler transfers to the execute node, in submit order.
    pub fn input_files(&self) -> Vec<String> {
        let mut files = vec![
            self.files.input_archive.clone(),
            self.files.analysis_script.clone(),
            self.files.manifest.clone(),
        ];
        for extra in &self.files.extra_inputs {
            if !files.contains(extra) {
                files.push(extra.clone());
            }
        }
        files
    }

    /// Base image reference for the `FROM` line.
    pub fn base_image(&self) -> Result<String, RenderError> {
        let tag = self.runtime.image_tag()?;
        let base = self
            .container
            .base_image
            .as_deref()
            .unwrap_or_else(|| self.runtime.language.base_image());
        Ok(format!("{}:{}", base, tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RenderParameters {
        RenderParameters::new(ImageReference::new(
            "registry.example.org",
            "lab/analysis",
            "v1",
        ))
    }

    #[test]
    fn test_runtime_image_tag() {
        let runtime = Runtime {
            language: RuntimeLanguage::R,
            version: "4.3.1".to_string(),
        };
        assert_eq!(runtime.image_tag().unwrap(), "4.3");

        let short = Runtime {
            language: RuntimeLanguage::Python,
            version: "3.12".to_string(),
        };
        assert_eq!(short.image_tag().unwrap(), "3.12");
    }

    #[test]
    fn test_runtime_image_tag_rejects_garbage() {
        let empty = Runtime {
            language: RuntimeLanguage::R,
            version: "  ".to_string(),
        };
        assert!(matches!(
            empty.image_tag(),
            Err(RenderError::MissingParameter(_))
        ));

        let bad = Runtime {
            language: RuntimeLanguage::R,
            version: "four".to_string(),
        };
        assert!(matches!(
            bad.image_tag(),
            Err(RenderError::InvalidRuntimeVersion(_))
        ));
    }

    #[test]
    fn test_image_reference_uri() {
        let image = ImageReference::new("registry.example.org:5000", "lab/analysis", "v1");
        assert!(image.validate().is_ok());
        assert_eq!(
            image.docker_uri(),
            "docker://registry.example.org:5000/lab/analysis:v1"
        );
    }

    #[test]
    fn test_image_reference_validation() {
        let upper = ImageReference::new("registry.example.org", "Lab/Analysis", "v1");
        assert!(matches!(
            upper.validate(),
            Err(RenderError::InvalidImageReference { .. })
        ));

        let bad_tag = ImageReference::new("registry.example.org", "lab/analysis", "v 1");
        assert!(bad_tag.validate().is_err());

        let missing = ImageReference::new("", "lab/analysis", "v1");
        assert!(matches!(
            missing.validate(),
            Err(RenderError::MissingParameter(_))
        ));
    }

    #[test]
    fn test_resource_quantity_parse() {
        assert_eq!("4GB".parse::<ResourceQuantity>().unwrap().value(), 4.0);
        assert_eq!("0.5 GB".parse::<ResourceQuantity>().unwrap().value(), 0.5);
        assert_eq!("16".parse::<ResourceQuantity>().unwrap().value(), 16.0);
        assert!(matches!(
            "lots".parse::<ResourceQuantity>(),
            Err(RenderError::InvalidResourceRequest { .. })
        ));
    }

    #[test]
    fn test_resource_quantity_display() {
        assert_eq!(ResourceQuantity::gigabytes(4.0).to_string(), "4GB");
        assert_eq!(ResourceQuantity::gigabytes(1.5).to_string(), "1.5GB");
    }

    #[test]
    fn test_resource_quantity_deserialize() {
        #[derive(Deserialize)]
        struct Holder {
            memory: ResourceQuantity,
            disk: ResourceQuantity,
        }
        let holder: Holder = serde_yaml::from_str("memory: 8GB\ndisk: 3\n").unwrap();
        assert_eq!(holder.memory.value(), 8.0);
        assert_eq!(holder.disk.value(), 3.0);

        let bad: Result<Holder, _> = serde_yaml::from_str("memory: plenty\ndisk: 3\n");
        assert!(bad.is_err());
    }

    #[test]
    fn test_resource_request_validation() {
        let mut resources = ResourceRequest::default();
        assert!(resources.validate().is_ok());

        resources.cpus = 0;
        assert!(matches!(
            resources.validate(),
            Err(RenderError::InvalidResourceRequest { ref resource, .. }) if resource == "cpus"
        ));

        let negative = ResourceRequest {
            memory: ResourceQuantity::gigabytes(-1.0),
            ..Default::default()
        };
        assert!(negative.validate().is_err());

        let nan = ResourceRequest {
            disk: ResourceQuantity::gigabytes(f64::NAN),
            ..Default::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_parameters_validate_required_files() {
        let mut p = params();
        assert!(p.validate().is_ok());

        p.files.manifest = String::new();
        assert!(matches!(
            p.validate(),
            Err(RenderError::MissingParameter(ref name)) if name == "files.manifest"
        ));
    }

    #[test]
    fn test_input_files_order_and_dedup() {
        let mut p = params();
        p.files.extra_inputs = vec!["helpers.R".to_string(), "manifest.csv".to_string()];
        assert_eq!(
            p.input_files(),
            vec!["data.tar.gz", "analysis.R", "manifest.csv", "helpers.R"]
        );
    }

    #[test]
    fn test_base_image_selection() {
        let mut p = params();
        assert_eq!(p.base_image().unwrap(), "rocker/r-ver:4.3");

        p.runtime = Runtime {
            language: RuntimeLanguage::Python,
            version: "3.12.4".to_string(),
        };
        assert_eq!(p.base_image().unwrap(), "python:3.12");

        p.container.base_image = Some("ghcr.io/lab/base".to_string());
        assert_eq!(p.base_image().unwrap(), "ghcr.io/lab/base:3.12");
    }

    #[test]
    fn test_layout_for_python_has_no_library() {
        let layout = ContainerLayout::for_language(RuntimeLanguage::Python);
        assert_eq!(layout.lock_file, "requirements.txt");
        assert!(layout.library_dir.is_none());
    }
}
