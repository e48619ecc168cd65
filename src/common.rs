//! A library of routines and constants shared by the benchmark and analysis routines.

#[macro_use]
mod macros;

pub mod params;
pub mod paths;

use spurs::{cmd, Execute, SshShell};

/// The GCP project in which benchmark instances are created.
pub const GCP_PROJECT: &str = "moeyens-thor-dev";

/// The zone in which benchmark instances are created.
pub const GCP_ZONE: &str = "us-west1-b";

/// The bucket holding datasets and results.
pub const BENCHMARK_BUCKET: &str = "thor-benchmark-data";

/// The service account attached to benchmark instances. It needs read/write access to
/// `BENCHMARK_BUCKET`.
pub const SERVICE_ACCOUNT: &str = "thor-benchmarker@moeyens-thor-dev.iam.gserviceaccount.com";

/// The scopes granted to `SERVICE_ACCOUNT` on the instance.
pub const SERVICE_ACCOUNT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Boot image for benchmark instances.
pub const BOOT_IMAGE: &str = "projects/ubuntu-os-cloud/global/images/ubuntu-2204-jammy-v20230616";

/// Boot disk size in GB.
pub const BOOT_DISK_GB: usize = 100;

/// Boot disk type (relative to the zone).
pub const BOOT_DISK_TYPE: &str = "pd-standard";

/// Regional apt mirror. Must match `GCP_ZONE`.
pub const APT_MIRROR: &str = "http://us-west1.gce.archive.ubuntu.com/ubuntu";

/// The THOR git repo.
pub const THOR_REPO: &str = "https://github.com/moeyensj/thor.git";

/// The OpenOrb git repo.
pub const OORB_REPO: &str = "https://github.com/oorb/oorb.git";

// Paths on the remote

/// Where THOR is cloned.
pub const THOR_PATH: &str = "/opt/thor";

/// Where OpenOrb is cloned and built.
pub const OORB_PATH: &str = "/opt/oorb";

/// Where the dataset inputs are downloaded.
pub const THOR_DATA_PATH: &str = "/opt/thor-data";

/// Where THOR writes its output, along with the timestamps and sysstat samples.
pub const THOR_OUTPUT_PATH: &str = "/opt/thor-output";

/// The name of the remote parameters file, which is uploaded to the run directory.
pub const PARAMS_FILE: &str = "benchmark-parameters.json";

/// Dump some basic info about the machine for debugging.
pub fn dump_sys_info(shell: &SshShell) -> Result<(), failure::Error> {
    with_shell! { shell =>
        cmd!("uname -a"),
        cmd!("nproc"),
        cmd!("free -h"),
        cmd!("df -h /opt"),
    }

    Ok(())
}
