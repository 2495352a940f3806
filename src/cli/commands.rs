//! CLI command definitions for htc-forge.
//!
//! Each subcommand reads `htc-forge.yaml` (or the file given with `--config`)
//! and lets command-line flags override individual settings.

use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::bundle::{bundle_from_manifest, BundleSummary};
use crate::config::{ForgeConfig, RenderSettings, DEFAULT_CONFIG_FILE};
use crate::output::{write_artifacts, write_atomic, GenerationReport};
use crate::partition::{
    Manifest, PartitionConfig, PartitionSummary, Partitioner, SubsetOrder, DEFAULT_MANIFEST,
};
use crate::render::{check_consistency, render_all, ResourceQuantity};

/// Generate HTCondor container job artifacts from a dataset.
#[derive(Parser)]
#[command(name = "htc-forge")]
#[command(about = "Split a dataset and generate Dockerfile, submit descriptor and job script for HTCondor")]
#[command(version)]
#[command(
    long_about = "htc-forge splits a dataset into per-group subsets, packs them into an input archive and renders the Dockerfile, HTCondor submit descriptor and executable wrapper for a container job.\n\nBuilding and pushing the image and running condor_submit are left to the user.\n\nExample usage:\n  htc-forge generate --config htc-forge.yaml"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Project configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, global = true, env = "HTC_FORGE_CONFIG")]
    pub config: PathBuf,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Split a dataset into one CSV file per grouping value plus a manifest.
    Partition(PartitionArgs),

    /// Pack the subset files listed in a manifest into the input archive.
    Bundle(BundleArgs),

    /// Render the Dockerfile, submit descriptor and executable script.
    Render(RenderArgs),

    /// Partition, bundle and render in one run, then write a generation report.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Print the file names the job script will iterate over.
    Manifest(ManifestArgs),

    /// Check that a submit descriptor and script agree on the output archive.
    Check(CheckArgs),
}

/// Arguments for `htc-forge partition`.
#[derive(Parser, Debug)]
pub struct PartitionArgs {
    /// Input dataset (.csv, .tsv or .parquet).
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Column to group records by.
    #[arg(short, long)]
    pub group_by: Option<String>,

    /// Directory receiving the subset files and manifest.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Subset order: "discovery" (first appearance) or "sorted".
    #[arg(long)]
    pub order: Option<String>,

    /// Field delimiter of the input and subset files.
    #[arg(long)]
    pub delimiter: Option<char>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `htc-forge bundle`.
#[derive(Parser, Debug)]
pub struct BundleArgs {
    /// Directory holding the subset files.
    #[arg(long)]
    pub subsets_dir: Option<PathBuf>,

    /// Manifest listing the subset files.
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Archive to write.
    #[arg(long)]
    pub archive: Option<PathBuf>,
}

/// Render overrides shared by `render` and `generate`.
#[derive(Parser, Debug, Default)]
pub struct RenderOverrides {
    /// Directory receiving the rendered artifacts.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Number of jobs to queue.
    #[arg(long)]
    pub queue: Option<u32>,

    /// CPUs requested per job.
    #[arg(long)]
    pub cpus: Option<u32>,

    /// Memory requested per job (e.g. "4GB").
    #[arg(long)]
    pub memory: Option<String>,

    /// Disk requested per job (e.g. "2GB").
    #[arg(long)]
    pub disk: Option<String>,

    /// Dependency install script appended to the Dockerfile.
    #[arg(long)]
    pub install_script: Option<PathBuf>,
}

/// Arguments for `htc-forge render`.
#[derive(Parser, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: RenderOverrides,
}

/// Arguments for `htc-forge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub overrides: RenderOverrides,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `htc-forge manifest`.
#[derive(Parser, Debug)]
pub struct ManifestArgs {
    /// Manifest file to read.
    pub path: PathBuf,
}

/// Arguments for `htc-forge check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Submit descriptor.
    #[arg(long)]
    pub submit: PathBuf,

    /// Executable script.
    #[arg(long)]
    pub script: PathBuf,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse the CLI arguments and run the selected command.
pub fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli())
}

/// Run the CLI with already parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Partition(args) => run_partition_command(&cli.config, args),
        Commands::Bundle(args) => run_bundle_command(&cli.config, args),
        Commands::Render(args) => run_render_command(&cli.config, args),
        Commands::Generate(args) => run_generate_command(&cli.config, args),
        Commands::Manifest(args) => run_manifest_command(args),
        Commands::Check(args) => run_check_command(args),
    }
}

fn parse_order(value: &str) -> anyhow::Result<SubsetOrder> {
    match value.to_lowercase().as_str() {
        "discovery" => Ok(SubsetOrder::Discovery),
        "sorted" => Ok(SubsetOrder::Sorted),
        other => Err(anyhow::anyhow!(
            "Invalid order '{}': expected 'discovery' or 'sorted'",
            other
        )),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

// ============================================================================
// Partition
// ============================================================================

fn partition_config(
    config: &ForgeConfig,
    args: &PartitionArgs,
) -> anyhow::Result<PartitionConfig> {
    let mut partition = match (&config.partition, &args.input, &args.group_by, &args.output_dir) {
        (Some(existing), _, _, _) => existing.clone(),
        (None, Some(input), Some(group_by), Some(output_dir)) => {
            PartitionConfig::new(input, group_by.clone(), output_dir)
        }
        (None, _, _, _) => {
            return Err(anyhow::anyhow!(
                "No 'partition' section in config: pass --input, --group-by and --output-dir"
            ))
        }
    };

    if let Some(input) = &args.input {
        partition.input = input.clone();
    }
    if let Some(group_by) = &args.group_by {
        partition.group_by = group_by.clone();
    }
    if let Some(output_dir) = &args.output_dir {
        partition.output_dir = output_dir.clone();
    }
    if let Some(order) = &args.order {
        partition.order = parse_order(order)?;
    }
    if let Some(delimiter) = args.delimiter {
        partition.delimiter = delimiter;
    }
    Ok(partition)
}

fn print_partition_summary(summary: &PartitionSummary) {
    println!(
        "Partitioned {} rows by '{}' into {} subsets:",
        summary.total_rows,
        summary.grouping_key,
        summary.subsets.len()
    );
    for subset in &summary.subsets {
        println!("  {:<30} {:>8} rows", subset.file_name, subset.rows);
    }
    println!("Manifest: {}", summary.manifest_path.display());
}

fn run_partition_command(config_path: &Path, args: PartitionArgs) -> anyhow::Result<()> {
    let config = ForgeConfig::load_or_default(config_path)?;
    let partition = partition_config(&config, &args)?;
    let summary = Partitioner::new(partition).run()?;

    if args.json {
        print_json(&summary)
    } else {
        print_partition_summary(&summary);
        Ok(())
    }
}

// ============================================================================
// Bundle
// ============================================================================

fn run_bundle_command(config_path: &Path, args: BundleArgs) -> anyhow::Result<()> {
    let config = ForgeConfig::load_or_default(config_path)?;
    let configured = config.partition.as_ref();

    let subsets_dir = args
        .subsets_dir
        .or_else(|| configured.map(|p| p.output_dir.clone()))
        .ok_or_else(|| anyhow::anyhow!("--subsets-dir is required without a 'partition' section"))?;
    let manifest = args
        .manifest
        .or_else(|| configured.map(PartitionConfig::manifest_path))
        .unwrap_or_else(|| subsets_dir.join(DEFAULT_MANIFEST));
    let archive = args
        .archive
        .or_else(|| config.input_archive_path())
        .ok_or_else(|| anyhow::anyhow!("--archive is required without a 'render' section"))?;

    let summary = bundle_from_manifest(&subsets_dir, &manifest, &archive)?;
    println!(
        "Packed {} subset files into {} ({} bytes)",
        summary.files,
        summary.archive.display(),
        summary.bytes
    );
    Ok(())
}

// ============================================================================
// Render
// ============================================================================

fn apply_overrides(
    config: &ForgeConfig,
    overrides: &RenderOverrides,
) -> anyhow::Result<(RenderSettings, PathBuf)> {
    let mut settings = config.render()?.clone();
    let params = &mut settings.params;

    if let Some(queue) = overrides.queue {
        params.queue = queue;
    }
    if let Some(cpus) = overrides.cpus {
        params.resources.cpus = cpus;
    }
    if let Some(memory) = &overrides.memory {
        params.resources.memory = memory.parse::<ResourceQuantity>()?;
    }
    if let Some(disk) = &overrides.disk {
        params.resources.disk = disk.parse::<ResourceQuantity>()?;
    }
    if let Some(script) = &overrides.install_script {
        settings.install_script = Some(script.clone());
    }

    let output_dir = overrides
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output_dir.clone());
    Ok((settings, output_dir))
}

fn render_and_write(
    settings: &RenderSettings,
    output_dir: &Path,
) -> anyhow::Result<Vec<crate::output::ArtifactRecord>> {
    let install_script = settings.load_install_script().transpose()?;
    let artifacts = render_all(&settings.params, install_script.as_ref())?;
    Ok(write_artifacts(output_dir, &artifacts)?)
}

fn run_render_command(config_path: &Path, args: RenderArgs) -> anyhow::Result<()> {
    let config = ForgeConfig::load(config_path)?;
    let (settings, output_dir) = apply_overrides(&config, &args.overrides)?;
    let records = render_and_write(&settings, &output_dir)?;

    for record in &records {
        println!("{:<22} {}", record.kind.to_string(), record.path.display());
    }
    Ok(())
}

// ============================================================================
// Generate
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateOutput {
    status: String,
    report: PathBuf,
    partition: PartitionSummary,
    bundle: Option<BundleSummary>,
    artifacts: Vec<PathBuf>,
}

fn run_generate_command(config_path: &Path, args: GenerateArgs) -> anyhow::Result<()> {
    let config = ForgeConfig::load(config_path)?;
    let (settings, output_dir) = apply_overrides(&config, &args.overrides)?;
    let partition = config.partition()?.clone();

    // Render everything in memory before touching the file system.
    let install_script = settings.load_install_script().transpose()?;
    let artifacts = render_all(&settings.params, install_script.as_ref())?;

    let summary = Partitioner::new(partition.clone()).run()?;

    let manifest_path = partition.manifest_path();
    let manifest_bytes = std::fs::read(&manifest_path)?;
    write_atomic(
        &output_dir.join(&settings.params.files.manifest),
        &manifest_bytes,
        false,
    )?;

    let bundle = if config.bundle.enabled {
        let archive = output_dir.join(&settings.params.files.input_archive);
        Some(bundle_from_manifest(
            &partition.output_dir,
            &manifest_path,
            &archive,
        )?)
    } else {
        None
    };

    let records = write_artifacts(&output_dir, &artifacts)?;
    let artifact_paths = records.iter().map(|r| r.path.clone()).collect();

    let mut report = GenerationReport::new(settings.params.image.to_string(), records)
        .with_partition(summary.clone());
    if let Some(bundle) = &bundle {
        report = report.with_input_archive(bundle.archive.clone());
    }
    let report_path = report.write(&output_dir)?;

    info!(
        output = %output_dir.display(),
        subsets = summary.subsets.len(),
        "Generation complete"
    );

    if args.json {
        return print_json(&GenerateOutput {
            status: "ok".to_string(),
            report: report_path,
            partition: summary,
            bundle,
            artifacts: artifact_paths,
        });
    }

    print_partition_summary(&summary);
    if let Some(bundle) = &bundle {
        println!("Input archive: {}", bundle.archive.display());
    }
    println!("Artifacts written to {}", output_dir.display());
    println!("Report: {}", report_path.display());
    println!();
    println!("Next steps (manual):");
    println!(
        "  docker build -t {} . && docker push {}",
        settings.params.image, settings.params.image
    );
    println!(
        "  copy {} to the submit node, then run: condor_submit {}",
        output_dir.display(),
        settings.params.files.submit
    );
    Ok(())
}

// ============================================================================
// Manifest / Check
// ============================================================================

fn run_manifest_command(args: ManifestArgs) -> anyhow::Result<()> {
    let manifest = Manifest::read(&args.path)?;
    for entry in manifest.entries() {
        println!("{entry}");
    }
    Ok(())
}

fn run_check_command(args: CheckArgs) -> anyhow::Result<()> {
    let submit = std::fs::read_to_string(&args.submit)?;
    let script = std::fs::read_to_string(&args.script)?;
    let archive = check_consistency(&submit, &script)?;
    println!("OK: both artifacts use output archive '{archive}'");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_partition() {
        let cli = Cli::try_parse_from([
            "htc-forge",
            "partition",
            "--input",
            "raw.csv",
            "--group-by",
            "species",
            "--output-dir",
            "subsets",
            "--order",
            "sorted",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        match cli.command {
            Commands::Partition(args) => {
                assert_eq!(args.group_by.as_deref(), Some("species"));
                assert_eq!(args.order.as_deref(), Some("sorted"));
            }
            _ => panic!("expected partition command"),
        }
    }

    #[test]
    fn test_partition_config_from_args_without_section() {
        let args = PartitionArgs {
            input: Some(PathBuf::from("raw.csv")),
            group_by: Some("species".to_string()),
            output_dir: Some(PathBuf::from("out")),
            order: Some("SORTED".to_string()),
            delimiter: Some(';'),
            json: false,
        };
        let partition = partition_config(&ForgeConfig::default(), &args).unwrap();
        assert_eq!(partition.order, SubsetOrder::Sorted);
        assert_eq!(partition.delimiter, ';');
    }

    #[test]
    fn test_partition_config_requires_arguments() {
        let args = PartitionArgs {
            input: None,
            group_by: Some("species".to_string()),
            output_dir: None,
            order: None,
            delimiter: None,
            json: false,
        };
        assert!(partition_config(&ForgeConfig::default(), &args).is_err());
    }

    #[test]
    fn test_render_overrides() {
        let config = ForgeConfig::from_yaml(
            "render:\n  image: { registry: registry.example.org, repository: lab/analysis }\n",
        )
        .unwrap();
        let overrides = RenderOverrides {
            queue: Some(4),
            cpus: Some(2),
            memory: Some("16GB".to_string()),
            ..Default::default()
        };
        let (settings, output_dir) = apply_overrides(&config, &overrides).unwrap();
        assert_eq!(settings.params.queue, 4);
        assert_eq!(settings.params.resources.cpus, 2);
        assert_eq!(settings.params.resources.memory.value(), 16.0);
        assert_eq!(output_dir, PathBuf::from("job"));

        let bad = RenderOverrides {
            disk: Some("huge".to_string()),
            ..Default::default()
        };
        assert!(apply_overrides(&config, &bad).is_err());
    }
}
