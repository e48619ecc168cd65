//! Join everything we know about a run into one flat row.

use log::{error, info, warn};

use serde::Serialize;

use crate::common::{params::BenchmarkParameters, paths};
use crate::storage::ObjectStore;

use super::{config::RunConfig, thor_log::LogMetrics, window::ExecutionWindow};

/// One row of output. Field order is column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub instance_name: String,
    pub instance_type: String,
    pub thor_version: String,
    pub native_comp: bool,
    pub use_mkl: bool,
    pub dataset: String,

    pub cell_area: f64,
    pub backend: String,
    pub cluster_min_obs: u64,
    pub cluster_algorithm: String,

    pub n_obs: u64,
    pub n_clusters: u64,
    pub n_initial_orbits: u64,
    pub n_orbits: u64,
    pub n_merged_orbits: u64,
    pub n_od_iterations: u64,

    pub execution_time: f64,
    pub range_and_shift_time: f64,
    pub clustering_time: f64,
    pub iod_time: f64,
    pub total_od_time: f64,
    pub total_attribution_time: f64,
    pub merging_time: f64,
}

/// Instance names end with a random suffix that is unique enough to identify a run.
fn short_name(instance: &str) -> &str {
    instance.rsplit('-').next().unwrap_or(instance)
}

impl OutputRow {
    pub fn new(
        instance: &str,
        dataset: &str,
        params: BenchmarkParameters,
        config: RunConfig,
        metrics: LogMetrics,
        window: ExecutionWindow,
    ) -> Self {
        OutputRow {
            instance_name: short_name(instance).into(),
            instance_type: params.instance_type,
            thor_version: params.thor_version,
            native_comp: params.native_comp,
            use_mkl: params.use_mkl,
            dataset: dataset.into(),

            cell_area: config.cell_area,
            backend: config.backend,
            cluster_min_obs: config.cluster_min_obs,
            cluster_algorithm: config.cluster_algorithm,

            n_obs: metrics.n_obs,
            n_clusters: metrics.n_clusters,
            n_initial_orbits: metrics.n_initial_orbits,
            n_orbits: metrics.n_orbits,
            n_merged_orbits: metrics.n_merged_orbits,
            n_od_iterations: metrics.n_od_iterations,

            execution_time: window.seconds(),
            range_and_shift_time: metrics.range_and_shift_time,
            clustering_time: metrics.clustering_time,
            iod_time: metrics.iod_time,
            total_od_time: metrics.total_od_time,
            total_attribution_time: metrics.total_attribution_time,
            merging_time: metrics.merging_time,
        }
    }

    /// Download and parse all artifacts of the given run.
    pub fn from_store<S: ObjectStore>(
        store: &S,
        dataset: &str,
        instance: &str,
    ) -> Result<Self, failure::Error> {
        let params = BenchmarkParameters::from_json(
            &store.read_to_string(&paths::params(dataset, instance))?,
        )?;

        let window = ExecutionWindow::parse(
            &store.read_to_string(&paths::start_time(dataset, instance))?,
            &store.read_to_string(&paths::end_time(dataset, instance))?,
        )?;

        let metrics =
            LogMetrics::from_log(&store.read_to_string(&paths::thor_log(dataset, instance))?)?;

        let config =
            RunConfig::from_yaml(&store.read_to_string(&paths::thor_config(dataset, instance))?)?;

        Ok(Self::new(instance, dataset, params, config, metrics, window))
    }
}

/// Which runs to analyze and what to do about runs that can't be analyzed.
#[derive(Debug, Clone, Default)]
pub struct Selection<'a> {
    /// Only look at this dataset, rather than every top-level prefix of the bucket.
    pub dataset: Option<&'a str>,

    /// Abort on the first broken run rather than skipping it.
    pub fail_fast: bool,
}

/// Analyze every selected run in the store, in listing order.
pub fn all_rows<S: ObjectStore>(
    store: &S,
    selection: &Selection<'_>,
) -> Result<Vec<OutputRow>, failure::Error> {
    let datasets = match selection.dataset {
        Some(dataset) => vec![dataset.to_owned()],
        None => store.subdirs("")?,
    };

    let mut rows = Vec::new();

    for dataset in datasets.iter() {
        let instances = match store.subdirs(&paths::results_prefix(dataset)) {
            Ok(instances) => instances,
            Err(err) if !selection.fail_fast => {
                warn!("Skipping dataset {}: {}", dataset, err);
                continue;
            }
            Err(err) => return Err(err),
        };
        info!("Dataset {}: {} runs", dataset, instances.len());

        for instance in instances.iter() {
            match OutputRow::from_store(store, dataset, instance) {
                Ok(row) => rows.push(row),
                Err(err) if !selection.fail_fast => {
                    error!("Skipping {}: {}", paths::run_dir(dataset, instance), err);
                }
                Err(err) => {
                    return Err(failure::format_err!(
                        "Unable to analyze {}: {}",
                        paths::run_dir(dataset, instance),
                        err
                    ));
                }
            }
        }
    }

    Ok(rows)
}
