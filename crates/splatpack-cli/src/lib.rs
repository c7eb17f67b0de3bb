use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use splatpack_convert::{
    AssetKind, ConvertConfig, convert_base_model, convert_skeleton, convert_splats,
};
use splatpack_serde::{BaseModelSource, Bundle, SkeletonSource, SplatSource, TensorMap};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    arg_required_else_help = true,
    about = "Splatpack - convert trained splat artifacts into renderer bundles"
)]
pub struct Cli {
    /// Trained splat artifact (safetensors).
    #[arg(long, value_name = "PATH", help_heading = "Inputs")]
    pub splats: Option<PathBuf>,
    /// Skeleton with the joint hierarchy and names.
    #[arg(long, value_name = "PATH", help_heading = "Inputs")]
    pub skeleton: Option<PathBuf>,
    /// Template body model with rest pose joints and vertices.
    #[arg(long, value_name = "PATH", help_heading = "Inputs")]
    pub base_model: Option<PathBuf>,
    /// Root directory, each asset is written to its own subdirectory.
    #[arg(long, short, value_name = "DIR", default_value = "./converted")]
    pub output: PathBuf,
    #[clap(flatten)]
    pub convert: ConvertConfig,
}

impl Cli {
    pub fn validate(self) -> anyhow::Result<Self> {
        if self.splats.is_none() && self.skeleton.is_none() && self.base_model.is_none() {
            anyhow::bail!("Nothing to convert, pass --splats, --skeleton or --base-model");
        }
        if !self.convert.opacity_threshold.is_finite() {
            anyhow::bail!(
                "Opacity threshold must be a finite number, got {}",
                self.convert.opacity_threshold
            );
        }
        Ok(self)
    }
}

#[derive(Debug)]
pub enum AssetOutcome {
    Written(PathBuf),
    Skipped(String),
    Failed(anyhow::Error),
}

#[derive(Debug)]
pub struct AssetReport {
    pub kind: AssetKind,
    pub outcome: AssetOutcome,
}

impl AssetReport {
    /// One summary line. Errors and skip reasons are logged when they
    /// happen, so they are not repeated here.
    pub fn summary(&self) -> String {
        match &self.outcome {
            AssetOutcome::Written(dir) => format!("{}: written to {}", self.kind, dir.display()),
            AssetOutcome::Skipped(_) => format!("{}: skipped", self.kind),
            AssetOutcome::Failed(_) => format!("{}: failed", self.kind),
        }
    }
}

/// What happened to each requested asset.
#[derive(Debug, Default)]
pub struct RunReport {
    pub assets: Vec<AssetReport>,
}

impl RunReport {
    fn push(&mut self, kind: AssetKind, outcome: AssetOutcome) {
        self.assets.push(AssetReport { kind, outcome });
    }

    pub fn get(&self, kind: AssetKind) -> Option<&AssetOutcome> {
        self.assets
            .iter()
            .find(|a| a.kind == kind)
            .map(|a| &a.outcome)
    }

    pub fn has_failures(&self) -> bool {
        self.assets
            .iter()
            .any(|a| matches!(a.outcome, AssetOutcome::Failed(_)))
    }

    pub fn log_summary(&self) {
        for asset in &self.assets {
            log::info!("{}", asset.summary());
        }
    }
}

fn read_artifact(path: &Path) -> anyhow::Result<TensorMap> {
    splatpack_serde::load_safetensors(path)
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn write_bundle(bundle: &Bundle, root: &Path, kind: AssetKind) -> anyhow::Result<PathBuf> {
    let dir = root.join(kind.dir_name());
    bundle
        .write_to_dir(&dir)
        .with_context(|| format!("Failed to write {}", dir.display()))?;
    Ok(dir)
}

fn skeleton_asset(path: &Path, root: &Path) -> anyhow::Result<(SkeletonSource, PathBuf)> {
    let _span = tracing::trace_span!("SkeletonAsset").entered();
    let skeleton = SkeletonSource::load(&read_artifact(path)?)
        .with_context(|| format!("Invalid skeleton in {}", path.display()))?;
    let dir = write_bundle(&convert_skeleton(&skeleton)?, root, AssetKind::Skeleton)?;
    Ok((skeleton, dir))
}

fn splat_asset(
    path: &Path,
    root: &Path,
    config: &ConvertConfig,
    skeleton: Option<&SkeletonSource>,
) -> anyhow::Result<PathBuf> {
    let _span = tracing::trace_span!("SplatAsset").entered();
    let source = SplatSource::load(&read_artifact(path)?)
        .with_context(|| format!("Invalid splat artifact {}", path.display()))?;
    log::info!(
        "Loaded {} splats over {} bones",
        source.num_splats(),
        source.num_bones()
    );

    let converted = convert_splats(&source, config, skeleton)?;
    if config.summary {
        converted.log_summary();
    }
    write_bundle(&converted.into_bundle()?, root, AssetKind::Splats)
}

fn base_model_asset(path: &Path, root: &Path, config: &ConvertConfig) -> anyhow::Result<PathBuf> {
    let _span = tracing::trace_span!("BaseModelAsset").entered();
    let model = BaseModelSource::load(&read_artifact(path)?)
        .with_context(|| format!("Invalid base model {}", path.display()))?;
    write_bundle(&convert_base_model(&model, config)?, root, AssetKind::BaseModel)
}

/// Companion inputs that don't exist are skipped instead of failing the run.
fn missing_companion(kind: AssetKind, path: &Path) -> Option<AssetOutcome> {
    if path.exists() {
        return None;
    }
    log::warn!("{} not found, skipping {kind}", path.display());
    Some(AssetOutcome::Skipped(format!("{} not found", path.display())))
}

fn outcome(kind: AssetKind, result: anyhow::Result<PathBuf>) -> AssetOutcome {
    match result {
        Ok(dir) => AssetOutcome::Written(dir),
        Err(e) => {
            log::error!("Converting {kind} failed: {e:#}");
            AssetOutcome::Failed(e)
        }
    }
}

/// Convert every asset named on the command line. Assets are independent:
/// one failing doesn't stop the others.
pub fn run(cli: &Cli) -> RunReport {
    let mut report = RunReport::default();

    // The skeleton goes first so the splats can borrow its hierarchy.
    let mut skeleton = None;
    if let Some(path) = &cli.skeleton {
        let kind = AssetKind::Skeleton;
        let result = match missing_companion(kind, path) {
            Some(skipped) => skipped,
            None => outcome(
                kind,
                skeleton_asset(path, &cli.output).map(|(source, dir)| {
                    skeleton = Some(source);
                    dir
                }),
            ),
        };
        report.push(kind, result);
    }

    if let Some(path) = &cli.splats {
        let kind = AssetKind::Splats;
        let result = splat_asset(path, &cli.output, &cli.convert, skeleton.as_ref());
        report.push(kind, outcome(kind, result));
    }

    if let Some(path) = &cli.base_model {
        let kind = AssetKind::BaseModel;
        let result = match missing_companion(kind, path) {
            Some(skipped) => skipped,
            None => outcome(kind, base_model_asset(path, &cli.output, &cli.convert)),
        };
        report.push(kind, result);
    }

    report
}
