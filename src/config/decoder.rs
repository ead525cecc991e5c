use super::traits::ConfigSection;
use crate::error::SynrouteError;
use crate::types::DistanceMetric;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Upper bound on completed beams returned per decode.
    pub beam_width: usize,
    /// Candidates branched on at the first building-block decision.
    pub top_k: usize,
    /// Transformation-subgraph depth covered by the feasibility index.
    pub max_depth: usize,
    pub metric: DistanceMetric,
    /// Mask templates with no feasible completion in the index.
    pub filter_transformations: bool,
    /// Restrict building blocks to the entries cached for their input slot.
    pub filter_terminals: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            beam_width: 1,
            top_k: 1,
            max_depth: 2,
            metric: DistanceMetric::Manhattan,
            filter_transformations: true,
            filter_terminals: true,
        }
    }
}

impl ConfigSection for DecoderConfig {
    fn section_name() -> &'static str {
        "decoder"
    }

    fn validate(&self) -> Result<(), SynrouteError> {
        if self.beam_width == 0 {
            return Err(SynrouteError::Configuration(
                "Beam width must be at least 1".to_string()
            ));
        }
        if self.top_k == 0 {
            return Err(SynrouteError::Configuration(
                "top_k must be at least 1".to_string()
            ));
        }
        Ok(())
    }
}
