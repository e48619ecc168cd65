//! The handful of THOR config values we care about when comparing runs.

use serde::Deserialize;

use super::AnalysisError;

#[derive(Debug, Deserialize)]
struct ThorConfigFile {
    #[serde(rename = "RANGE_SHIFT_CONFIG")]
    range_shift: RangeShiftConfig,
    #[serde(rename = "CLUSTER_LINK_CONFIG")]
    cluster_link: ClusterLinkConfig,
}

#[derive(Debug, Deserialize)]
struct RangeShiftConfig {
    cell_area: f64,
    backend: String,
}

#[derive(Debug, Deserialize)]
struct ClusterLinkConfig {
    min_obs: u64,
    alg: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Area of a cell, in square degrees.
    pub cell_area: f64,
    pub backend: String,
    /// Minimum number of observations per cluster.
    pub cluster_min_obs: u64,
    pub cluster_algorithm: String,
}

impl RunConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, AnalysisError> {
        let file: ThorConfigFile =
            serde_yaml::from_str(yaml).map_err(|err| AnalysisError::BadConfig {
                reason: err.to_string(),
            })?;

        Ok(RunConfig {
            cell_area: file.range_shift.cell_area,
            backend: file.range_shift.backend,
            cluster_min_obs: file.cluster_link.min_obs,
            cluster_algorithm: file.cluster_link.alg,
        })
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    pub const SAMPLE_CONFIG: &str = "\
MIN_OBS: 5
RANGE_SHIFT_CONFIG:
  cell_area: 10
  backend: PYOORB
  backend_kwargs: {}
  num_jobs: 60
CLUSTER_LINK_CONFIG:
  vx_range: [-0.1, 0.1]
  vy_range: [-0.1, 0.1]
  eps: 0.005
  min_obs: 5
  alg: hotspot_2d
  num_jobs: 60
IOD_CONFIG:
  min_obs: 6
";

    #[test]
    fn sample() {
        let config = RunConfig::from_yaml(SAMPLE_CONFIG).unwrap();
        assert_eq!(
            config,
            RunConfig {
                cell_area: 10.0,
                backend: "PYOORB".into(),
                cluster_min_obs: 5,
                cluster_algorithm: "hotspot_2d".into(),
            }
        );
    }

    #[test]
    fn fractional_cell_area() {
        let yaml = SAMPLE_CONFIG.replace("cell_area: 10", "cell_area: 0.5");
        assert_eq!(RunConfig::from_yaml(&yaml).unwrap().cell_area, 0.5);
    }

    #[test]
    fn missing_section() {
        let yaml = "RANGE_SHIFT_CONFIG:\n  cell_area: 10\n  backend: PYOORB\n";
        assert!(matches!(
            RunConfig::from_yaml(yaml),
            Err(AnalysisError::BadConfig { .. })
        ));
    }
}
