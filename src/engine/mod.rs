pub mod calibration;
pub mod features;
pub mod optimizer;
pub mod pipeline;
pub mod win_probability;

pub use pipeline::{analyze_sources, annotate_sources, pooled_samples, PipelineOptions};
pub use win_probability::{HeuristicModel, WinProbabilityModel};
