//! The object storage layout shared by the `bench` and `analyze` routines. All keys are relative
//! to the bucket root.
//!
//! ```text
//! {dataset}/config.yaml
//! {dataset}/observations.csv
//! {dataset}/orbits.csv
//! {dataset}/results/{instance}/benchmark-parameters.json
//! {dataset}/results/{instance}/thor-output/start_time.txt
//! {dataset}/results/{instance}/thor-output/end_time.txt
//! {dataset}/results/{instance}/thor-output/thor/config.yml
//! {dataset}/results/{instance}/thor-output/thor/orbit_00000000/thor.log
//! ```

use super::PARAMS_FILE;

/// The dataset input files, in the order they are downloaded.
pub const DATASET_INPUTS: &[&str] = &["config.yaml", "observations.csv", "orbits.csv"];

/// Name of the output directory inside a run directory. Matches the last component of
/// `THOR_OUTPUT_PATH` since the whole directory is uploaded.
pub const OUTPUT_DIR: &str = "thor-output";

/// Name of the THOR output directory inside `OUTPUT_DIR`.
pub const THOR_DIR: &str = "thor";

/// THOR writes one log per test orbit; we only run one.
pub const THOR_LOG: &str = "orbit_00000000/thor.log";

pub const START_TIME_FILE: &str = "start_time.txt";
pub const END_TIME_FILE: &str = "end_time.txt";

/// THOR copies its effective config here.
pub const THOR_CONFIG_FILE: &str = "config.yml";

/// Turn a key into a `gs://` URL.
pub fn gs_url(bucket: &str, key: &str) -> String {
    format!("gs://{}/{}", bucket, key)
}

/// The key of a dataset input file.
pub fn dataset_input(dataset: &str, file: &str) -> String {
    dir!(dataset, file)
}

/// The prefix under which all runs of `dataset` live (with trailing slash).
pub fn results_prefix(dataset: &str) -> String {
    format!("{}/", dir!(dataset, "results"))
}

/// The run directory of one benchmark execution (no trailing slash).
pub fn run_dir(dataset: &str, instance: &str) -> String {
    dir!(dataset, "results", instance)
}

pub fn params(dataset: &str, instance: &str) -> String {
    dir!(run_dir(dataset, instance), PARAMS_FILE)
}

pub fn start_time(dataset: &str, instance: &str) -> String {
    dir!(run_dir(dataset, instance), OUTPUT_DIR, START_TIME_FILE)
}

pub fn end_time(dataset: &str, instance: &str) -> String {
    dir!(run_dir(dataset, instance), OUTPUT_DIR, END_TIME_FILE)
}

pub fn thor_config(dataset: &str, instance: &str) -> String {
    dir!(
        run_dir(dataset, instance),
        OUTPUT_DIR,
        THOR_DIR,
        THOR_CONFIG_FILE
    )
}

pub fn thor_log(dataset: &str, instance: &str) -> String {
    dir!(run_dir(dataset, instance), OUTPUT_DIR, THOR_DIR, THOR_LOG)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn run_artifacts() {
        let ds = "full-month-small-cell";
        let inst = "benchmark-thor-n2-standard-8-1a2b3c-wxyz";

        assert_eq!(
            results_prefix(ds),
            "full-month-small-cell/results/"
        );
        assert_eq!(
            params(ds, inst),
            "full-month-small-cell/results/benchmark-thor-n2-standard-8-1a2b3c-wxyz/benchmark-parameters.json"
        );
        assert_eq!(
            start_time(ds, inst),
            "full-month-small-cell/results/benchmark-thor-n2-standard-8-1a2b3c-wxyz/thor-output/start_time.txt"
        );
        assert_eq!(
            thor_log(ds, inst),
            "full-month-small-cell/results/benchmark-thor-n2-standard-8-1a2b3c-wxyz/thor-output/thor/orbit_00000000/thor.log"
        );
        assert_eq!(
            thor_config(ds, inst),
            "full-month-small-cell/results/benchmark-thor-n2-standard-8-1a2b3c-wxyz/thor-output/thor/config.yml"
        );
    }

    #[test]
    fn urls() {
        assert_eq!(
            gs_url("thor-benchmark-data", &dataset_input("ds", "orbits.csv")),
            "gs://thor-benchmark-data/ds/orbits.csv"
        );
    }
}
