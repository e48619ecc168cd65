//! Manage the lifecycle of benchmark instances via the `gcloud` CLI.

use std::process::Command;

use log::{debug, info};

use crate::common::{
    BOOT_DISK_GB, BOOT_DISK_TYPE, BOOT_IMAGE, SERVICE_ACCOUNT, SERVICE_ACCOUNT_SCOPES,
};

/// Where instances live.
#[derive(Debug, Clone)]
pub struct Location {
    pub project: String,
    pub zone: String,
}

/// Everything needed to create an instance other than its name and location.
#[derive(Debug, Clone)]
pub struct InstanceSpec<'a> {
    /// The machine type (e.g. `n2-standard-8`).
    pub machine_type: &'a str,

    /// The user that will log in over SSH.
    pub ssh_user: &'a str,

    /// The contents of the public key to authorize for `ssh_user`.
    pub ssh_pubkey: &'a str,
}

/// A (possibly not yet created) GCE instance.
#[derive(Debug, Clone)]
pub struct Instance {
    pub location: Location,
    pub name: String,
}

impl Instance {
    pub fn new(location: Location, name: String) -> Self {
        Instance { location, name }
    }

    fn location_args(&self) -> Vec<String> {
        vec![
            format!("--project={}", self.location.project),
            format!("--zone={}", self.location.zone),
        ]
    }

    /// The arguments to `gcloud` that create this instance.
    pub fn create_args(&self, spec: &InstanceSpec<'_>) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "compute".into(),
            "instances".into(),
            "create".into(),
            self.name.clone(),
        ];
        args.extend(self.location_args());
        args.extend(vec![
            format!("--machine-type={}", spec.machine_type),
            format!("--service-account={}", SERVICE_ACCOUNT),
            format!("--scopes={}", SERVICE_ACCOUNT_SCOPES.join(",")),
            format!("--image={}", BOOT_IMAGE),
            format!("--boot-disk-size={}GB", BOOT_DISK_GB),
            format!("--boot-disk-type={}", BOOT_DISK_TYPE),
            // An ephemeral external IP so we can reach the instance.
            "--network-interface=network-tier=PREMIUM,subnet=default".into(),
            format!("--metadata=ssh-keys={}:{}", spec.ssh_user, spec.ssh_pubkey.trim()),
        ]);
        args
    }

    pub fn describe_ip_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "compute".into(),
            "instances".into(),
            "describe".into(),
            self.name.clone(),
        ];
        args.extend(self.location_args());
        args.push("--format=get(networkInterfaces[0].accessConfigs[0].natIP)".into());
        args
    }

    pub fn delete_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "compute".into(),
            "instances".into(),
            "delete".into(),
            self.name.clone(),
        ];
        args.extend(self.location_args());
        args.push("--quiet".into());
        args
    }

    /// Create the instance. Returns once GCE reports the instance as created, which is usually
    /// before it accepts SSH connections.
    pub fn create(&self, spec: &InstanceSpec<'_>) -> Result<(), failure::Error> {
        info!(
            "Creating instance {} ({}) in {}/{}",
            self.name, spec.machine_type, self.location.project, self.location.zone
        );
        gcloud(&self.create_args(spec))?;
        Ok(())
    }

    /// Get the external IP of the instance.
    pub fn external_ip(&self) -> Result<String, failure::Error> {
        let ip = gcloud(&self.describe_ip_args())?;
        let ip = ip.trim();

        if ip.is_empty() {
            return Err(failure::format_err!(
                "Instance {} has no external IP",
                self.name
            ));
        }

        Ok(ip.into())
    }

    pub fn delete(&self) -> Result<(), failure::Error> {
        info!("Deleting instance {}", self.name);
        gcloud(&self.delete_args())?;
        Ok(())
    }
}

/// Run `gcloud` with the given arguments, returning its stdout.
fn gcloud(args: &[String]) -> Result<String, failure::Error> {
    debug!("gcloud {}", args.join(" "));

    let output = Command::new("gcloud").args(args).output()?;

    if !output.status.success() {
        return Err(failure::format_err!(
            "`gcloud {}` failed ({}): {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    Ok(String::from_utf8(output.stdout)?)
}
