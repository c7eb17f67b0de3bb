use clap::Args;
use serde::{Deserialize, Serialize};

use crate::filter::DEFAULT_OPACITY_THRESHOLD;

#[derive(Clone, Debug, Args, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConvertConfig {
    /// Splats with an opacity below this value are dropped.
    #[arg(long, help_heading = "Convert options", default_value = "0.1")]
    pub opacity_threshold: f32,
    /// Keep the source coordinate convention instead of flipping Y and Z.
    #[arg(long, help_heading = "Convert options", default_value = "false")]
    pub keep_source_coords: bool,
    /// Log shape and value ranges of every emitted stream.
    #[arg(long, help_heading = "Convert options", default_value = "false")]
    pub summary: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            opacity_threshold: DEFAULT_OPACITY_THRESHOLD,
            keep_source_coords: false,
            summary: false,
        }
    }
}
