//! End-to-end tests: dataset on disk to a complete job directory.

use std::fs;
use std::path::Path;

use clap::Parser;
use htc_forge::bundle::bundle_directory;
use htc_forge::cli::{run_with_cli, Cli};
use htc_forge::output::{write_artifacts, REPORT_FILE};
use htc_forge::partition::{Manifest, PartitionConfig, Partitioner, DEFAULT_MANIFEST};
use htc_forge::render::{check_consistency, render_all, ImageReference, RenderParameters, TextResource};

const SPECIES_CSV: &str = "\
id,species,weight
1,cat,4.2
2,cat,3.8
3,dog,21.0
4,cat,4.0
5,dog,18.5
6,cat,5.1
7,dog,25.3
8,cat,3.6
9,dog,19.9
10,cat,4.4
";

fn data_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect()
}

#[test]
fn test_species_dataset_to_job_directory() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("raw.csv");
    fs::write(&input, SPECIES_CSV).unwrap();

    let subsets_dir = dir.path().join("subsets");
    let summary = Partitioner::new(PartitionConfig::new(&input, "species", &subsets_dir))
        .run()
        .unwrap();
    assert_eq!(summary.subsets.len(), 2);

    // Union of subsets equals the input, without duplicates.
    let mut rows: Vec<String> = ["cat.csv", "dog.csv"]
        .iter()
        .flat_map(|name| data_lines(&subsets_dir.join(name)))
        .collect();
    rows.sort();
    let mut expected: Vec<String> = SPECIES_CSV.lines().skip(1).map(str::to_string).collect();
    expected.sort();
    assert_eq!(rows, expected);
    assert_eq!(data_lines(&subsets_dir.join("cat.csv")).len(), 6);
    assert_eq!(data_lines(&subsets_dir.join("dog.csv")).len(), 4);

    let manifest = Manifest::read(subsets_dir.join(DEFAULT_MANIFEST)).unwrap();
    assert_eq!(manifest.entries(), ["cat.csv", "dog.csv"]);

    let job_dir = dir.path().join("job");
    let params = RenderParameters::new(ImageReference::new(
        "registry.example.org",
        "lab/species",
        "v1",
    ));
    bundle_directory(
        &subsets_dir,
        &manifest,
        &job_dir.join(&params.files.input_archive),
    )
    .unwrap();

    let install = TextResource::new("install_packages.R", "RUN Rscript -e 'renv::restore()'");
    let artifacts = render_all(&params, Some(&install)).unwrap();
    write_artifacts(&job_dir, &artifacts).unwrap();

    let submit = fs::read_to_string(job_dir.join("analysis.sub")).unwrap();
    let script = fs::read_to_string(job_dir.join("analysis.sh")).unwrap();
    assert!(submit.contains("container_image = docker://registry.example.org/lab/species:v1"));
    assert!(submit.contains("queue 1"));
    assert_eq!(check_consistency(&submit, &script).unwrap(), "results.tar.gz");
    assert!(job_dir.join("data.tar.gz").exists());
    assert!(job_dir.join("Dockerfile").exists());
}

#[test]
fn test_generate_command_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("raw.csv"), SPECIES_CSV).unwrap();
    fs::write(root.join("install_packages.R"), "RUN Rscript install_packages.R\n").unwrap();

    let config = format!(
        r#"
output_dir: {root}/job
partition:
  input: {root}/raw.csv
  group_by: species
  output_dir: {root}/subsets
  order: sorted
render:
  image: {{ registry: registry.example.org, repository: lab/species, tag: v3 }}
  resources: {{ cpus: 1, memory: 4GB, disk: 2GB }}
  install_script: {root}/install_packages.R
"#,
        root = root.display()
    );
    let config_path = root.join("htc-forge.yaml");
    fs::write(&config_path, config).unwrap();

    let cli = Cli::try_parse_from([
        "htc-forge",
        "--config",
        config_path.to_str().unwrap(),
        "generate",
        "--queue",
        "2",
    ])
    .unwrap();
    run_with_cli(cli).unwrap();

    let job = root.join("job");
    for name in [
        "Dockerfile",
        "analysis.sub",
        "analysis.sh",
        "manifest.csv",
        "data.tar.gz",
        REPORT_FILE,
    ] {
        assert!(job.join(name).exists(), "missing {name}");
    }

    let submit = fs::read_to_string(job.join("analysis.sub")).unwrap();
    assert!(submit.ends_with("queue 2\n"));

    let manifest = Manifest::read(job.join("manifest.csv")).unwrap();
    assert_eq!(manifest.entries(), ["cat.csv", "dog.csv"]);

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(job.join(REPORT_FILE)).unwrap()).unwrap();
    assert_eq!(report["partition"]["total_rows"], 10);
    assert_eq!(report["image"], "registry.example.org/lab/species:v3");
}

#[test]
fn test_generate_with_missing_install_script_writes_no_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("raw.csv"), SPECIES_CSV).unwrap();

    let config = format!(
        r#"
output_dir: {root}/job
partition:
  input: {root}/raw.csv
  group_by: species
  output_dir: {root}/subsets
render:
  image: {{ registry: registry.example.org, repository: lab/species }}
  install_script: {root}/does-not-exist.R
"#,
        root = root.display()
    );
    let config_path = root.join("htc-forge.yaml");
    fs::write(&config_path, config).unwrap();

    let cli = Cli::try_parse_from([
        "htc-forge",
        "--config",
        config_path.to_str().unwrap(),
        "generate",
    ])
    .unwrap();
    assert!(run_with_cli(cli).is_err());
    assert!(!root.join("job").exists());
    assert!(!root.join("subsets").exists());
}

#[test]
fn test_generate_with_blank_install_script_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("raw.csv"), SPECIES_CSV).unwrap();
    fs::write(root.join("install_packages.R"), "  \n").unwrap();

    let config = format!(
        r#"
output_dir: {root}/job
partition:
  input: {root}/raw.csv
  group_by: species
  output_dir: {root}/subsets
render:
  image: {{ registry: registry.example.org, repository: lab/species }}
  install_script: {root}/install_packages.R
"#,
        root = root.display()
    );
    let config_path = root.join("htc-forge.yaml");
    fs::write(&config_path, config).unwrap();

    let cli = Cli::try_parse_from([
        "htc-forge",
        "--config",
        config_path.to_str().unwrap(),
        "generate",
    ])
    .unwrap();
    assert!(run_with_cli(cli).is_err());
    assert!(!root.join("job").exists());
    assert!(!root.join("subsets").exists());
}

#[test]
fn test_generate_with_quoted_output_archive() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("raw.csv"), SPECIES_CSV).unwrap();
    fs::write(root.join("install_packages.R"), "RUN Rscript install_packages.R\n").unwrap();

    let config = format!(
        r#"
output_dir: {root}/job
partition:
  input: {root}/raw.csv
  group_by: species
  output_dir: {root}/subsets
render:
  image: {{ registry: registry.example.org, repository: lab/species }}
  files:
    output_archive: "it's.tar.gz"
  install_script: {root}/install_packages.R
"#,
        root = root.display()
    );
    let config_path = root.join("htc-forge.yaml");
    fs::write(&config_path, config).unwrap();

    let cli = Cli::try_parse_from([
        "htc-forge",
        "--config",
        config_path.to_str().unwrap(),
        "generate",
    ])
    .unwrap();
    run_with_cli(cli).unwrap();

    let job = root.join("job");
    let submit = fs::read_to_string(job.join("analysis.sub")).unwrap();
    let script = fs::read_to_string(job.join("analysis.sh")).unwrap();
    assert_eq!(check_consistency(&submit, &script).unwrap(), "it's.tar.gz");
}
