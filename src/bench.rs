//! Benchmark one THOR revision on a fresh GCE instance.
//!
//! We create an instance of the requested machine type, install THOR and its dependencies, run
//! THOR on the given dataset between two `date` stamps, and upload everything (THOR output,
//! timestamps, `sysstat` samples and the benchmark parameters) to the run directory in the bucket.
//! The instance is deleted afterwards, even if something failed, unless `--no-cleanup` is passed.
//!
//! Requires `gcloud` locally and an SSH key pair (`~/.ssh/id_rsa{,.pub}` by default).

use std::net::IpAddr;
use std::time::Duration;

use clap::{Arg, ArgMatches, SubCommand};

use log::{error, info, warn};

use rand::Rng;

use spurs::{cmd, Execute, SshShell};

use crate::common::{
    dump_sys_info,
    params::{BenchmarkParameters, NumericStack},
    paths::{self, gs_url, DATASET_INPUTS, END_TIME_FILE, START_TIME_FILE, THOR_DIR},
    APT_MIRROR, BENCHMARK_BUCKET, GCP_PROJECT, GCP_ZONE, OORB_PATH, OORB_REPO, PARAMS_FILE,
    THOR_DATA_PATH, THOR_OUTPUT_PATH, THOR_PATH, THOR_REPO,
};
use crate::gcloud::{Instance, InstanceSpec, Location};

/// Number of attempts to reach a new instance over SSH.
const CONNECT_ATTEMPTS: usize = 10;

/// Time between attempts to reach a new instance.
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Length of the random suffix of instance names.
const NAME_SUFFIX_LEN: usize = 4;

/// Number of characters of the revision that go into instance names.
const NAME_REVISION_LEN: usize = 6;

/// Packages needed for everything.
const APT_PACKAGES: &[&str] = &[
    "git",
    "python3-pip",
    "python3",
    "gfortran",
    "liblapack-dev",
    "sysstat",
];

/// Extra packages needed to build numpy/scipy from source.
const APT_BUILD_PACKAGES: &[&str] = &["build-essential", "pkg-config", "libopenblas-dev"];

/// The numpy that OpenOrb's python bindings are built against.
const NUMPY_VERSION: &str = "1.24";

/// Intel's package index, which hosts MKL-backed numpy and scipy.
const INTEL_PYPI_INDEX: &str = "https://pypi.anaconda.org/intel/simple";

/// Where OpenOrb expects its ephemeris and other data.
const OORB_DATA: &str = "/opt/oorb/data";

/// Where the parameters file is written on the remote before being uploaded.
const REMOTE_PARAMS_PATH: &str = "/opt/benchmark-parameters.json";

pub fn cli_options() -> clap::App<'static, 'static> {
    fn is_revision(s: String) -> Result<(), String> {
        if s.is_empty() || s.contains(char::is_whitespace) {
            Err(format!("Invalid git revision {:?}", s))
        } else {
            Ok(())
        }
    }

    // These end up in shell commands on the instance.
    fn is_storage_name(s: String) -> Result<(), String> {
        let ok = !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
        if ok {
            Ok(())
        } else {
            Err(format!(
                "Invalid name {:?}; only letters, digits, `-`, `_` and `.` are allowed",
                s
            ))
        }
    }

    SubCommand::with_name("bench")
        .about(
            "Create a GCE instance, install and run the given THOR revision on the given dataset, \
             and upload the results to the bucket. Requires `gcloud`.",
        )
        .arg(
            Arg::with_name("INSTANCE")
                .short("i")
                .long("instance")
                .takes_value(true)
                .required(true)
                .help("The machine type to launch (e.g. n2-standard-8)"),
        )
        .arg(
            Arg::with_name("THOR_VERSION")
                .short("t")
                .long("thor-version")
                .takes_value(true)
                .required(true)
                .validator(is_revision)
                .help("The version of THOR to install (as a git SHA)"),
        )
        .arg(
            Arg::with_name("DATASET")
                .short("d")
                .long("dataset")
                .takes_value(true)
                .required(true)
                .validator(is_storage_name)
                .help("The dataset inputs to provide (a top-level prefix of the bucket)"),
        )
        .arg(
            Arg::with_name("USERNAME")
                .short("u")
                .long("username")
                .takes_value(true)
                .required(true)
                .help("The username to use for the SSH key"),
        )
        .arg(
            Arg::with_name("NATIVE_COMP")
                .long("native-comp")
                .conflicts_with("MKL")
                .help("(Optional) Build numpy and scipy from source with -march=native"),
        )
        .arg(
            Arg::with_name("MKL")
                .long("mkl")
                .help("(Optional) Use MKL-backed numpy and scipy"),
        )
        .arg(
            Arg::with_name("NO_CLEANUP")
                .long("no-cleanup")
                .help("(Optional) Do not delete the instance after running"),
        )
        .arg(
            Arg::with_name("DRY_RUN")
                .long("dry-run")
                .help("(Optional) Print what would be done without creating anything"),
        )
        .arg(
            Arg::with_name("PROJECT")
                .long("project")
                .takes_value(true)
                .help("(Optional) The GCP project (defaults to `moeyens-thor-dev`)"),
        )
        .arg(
            Arg::with_name("ZONE")
                .long("zone")
                .takes_value(true)
                .help("(Optional) The GCP zone (defaults to `us-west1-b`)"),
        )
        .arg(
            Arg::with_name("BUCKET")
                .long("bucket")
                .takes_value(true)
                .validator(is_storage_name)
                .help("(Optional) The bucket with datasets and results (defaults to `thor-benchmark-data`)"),
        )
        .arg(
            Arg::with_name("SSH_KEY")
                .long("ssh-key")
                .takes_value(true)
                .help("(Optional) The public key to authorize on the instance (defaults to ~/.ssh/id_rsa.pub)"),
        )
}

/// One shell command to run on the instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub cmd: String,
    pub cwd: Option<&'static str>,
}

impl Step {
    fn new<S: Into<String>>(cmd: S) -> Self {
        Step {
            cmd: cmd.into(),
            cwd: None,
        }
    }

    fn cwd(self, cwd: &'static str) -> Self {
        Step {
            cwd: Some(cwd),
            ..self
        }
    }

    fn run(&self, shell: &SshShell) -> Result<(), failure::Error> {
        let cmd = cmd!("{}", self.cmd).use_bash();
        let cmd = match self.cwd {
            Some(cwd) => cmd.cwd(cwd),
            None => cmd,
        };
        shell.run(cmd)?;
        Ok(())
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.cwd {
            Some(cwd) => write!(f, "cd {} && {}", cwd, self.cmd),
            None => write!(f, "{}", self.cmd),
        }
    }
}

/// A named group of steps.
#[derive(Debug, Clone)]
pub struct Phase {
    pub name: &'static str,
    pub steps: Vec<Step>,
}

/// Name a new instance. GCE names may only contain lowercase letters, digits and dashes.
pub fn instance_name(machine_type: &str, revision: &str, suffix: &str) -> String {
    let revision: String = revision.chars().take(NAME_REVISION_LEN).collect();
    format!("benchmark-thor-{}-{}-{}", machine_type, revision, suffix)
        .to_lowercase()
        .replace(|c: char| !c.is_ascii_alphanumeric() && c != '-', "-")
}

fn random_suffix<R: Rng>(rng: &mut R) -> String {
    (0..NAME_SUFFIX_LEN)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect()
}

/// Everything we run on the instance, in order. `run_dir` is the key of the run directory in
/// `bucket`.
pub fn provisioning_phases(
    params: &BenchmarkParameters,
    bucket: &str,
    run_dir: &str,
) -> Result<Vec<Phase>, failure::Error> {
    let stack = params.numeric_stack();

    // System packages
    let mut packages = APT_PACKAGES.to_vec();
    if stack == NumericStack::Native {
        packages.extend_from_slice(APT_BUILD_PACKAGES);
    }
    let system = vec![
        Step::new(format!("sudo add-apt-repository -y {}", APT_MIRROR)),
        Step::new("sudo apt-get update -y"),
        Step::new(format!("sudo apt-get install -y {}", packages.join(" "))),
    ];

    let checkout = vec![
        Step::new("sudo chmod 777 /opt"),
        Step::new(format!("git clone {} {}", THOR_REPO, THOR_PATH)),
        Step::new(format!("git clone {} {}", OORB_REPO, OORB_PATH)),
    ];

    // numpy has to come first since OpenOrb is built with its f2py.
    let numeric = match stack {
        NumericStack::Wheels => vec![Step::new(format!("pip install numpy=={}", NUMPY_VERSION))],
        NumericStack::Native => vec![Step::new(format!(
            "CFLAGS='-O3 -march=native' CXXFLAGS='-O3 -march=native' FFLAGS='-O3 -march=native' \
             pip install -v --no-binary numpy,scipy numpy=={} scipy",
            NUMPY_VERSION
        ))],
        NumericStack::Mkl => vec![
            Step::new("pip install mkl"),
            Step::new(format!("pip install -i {} numpy scipy", INTEL_PYPI_INDEX)),
        ],
    };

    let mut openorb = vec![
        Step::new("sudo ln -sf ~/.local/bin/f2py /usr/bin/f2py"),
        Step::new(
            "./configure gfortran opt --with-pyoorb --with-f2py=/usr/bin/f2py --with-python=python3",
        )
        .cwd(OORB_PATH),
        Step::new(format!("sudo pip install -v {}", OORB_PATH)),
    ];
    // The build-time numpy would shadow whatever THOR installs. Keep it if it is the point of
    // the benchmark.
    if stack == NumericStack::Wheels {
        openorb.push(Step::new("pip uninstall numpy -y"));
    }
    openorb.push(Step::new("make ephem").cwd(OORB_PATH));

    let thor = vec![
        Step::new(format!("git checkout {}", params.thor_version)).cwd(THOR_PATH),
        Step::new("sudo pip install -v .").cwd(THOR_PATH),
        Step::new(format!(
            "export OORB_DATA={} && python3 {}/runTHOR.py --help",
            OORB_DATA, THOR_PATH
        )),
    ];

    // Collect system resource data every minute.
    let sysstat = vec![
        Step::new(r#"echo 'ENABLED="true"' | sudo tee /etc/default/sysstat"#),
        Step::new("echo '* * * * * root /usr/lib/sysstat/sa1 1 1' | sudo tee /etc/cron.d/sysstat"),
        Step::new("sudo systemctl restart sysstat"),
    ];

    let mut data = vec![Step::new(format!(
        "mkdir -p {} {}",
        THOR_DATA_PATH, THOR_OUTPUT_PATH
    ))];
    for input in DATASET_INPUTS.iter() {
        data.push(Step::new(format!(
            "gsutil cp {} {}",
            gs_url(bucket, &paths::dataset_input(&params.dataset, input)),
            dir!(THOR_DATA_PATH, *input)
        )));
    }

    let run = vec![
        Step::new(format!("date > {}", dir!(THOR_OUTPUT_PATH, START_TIME_FILE))),
        Step::new(format!(
            "export OORB_DATA={} && python3 {}/runTHOR.py --config {} {} {} {}/",
            OORB_DATA,
            THOR_PATH,
            dir!(THOR_DATA_PATH, DATASET_INPUTS[0]),
            dir!(THOR_DATA_PATH, DATASET_INPUTS[1]),
            dir!(THOR_DATA_PATH, DATASET_INPUTS[2]),
            dir!(THOR_OUTPUT_PATH, THOR_DIR),
        )),
        Step::new(format!("date > {}", dir!(THOR_OUTPUT_PATH, END_TIME_FILE))),
    ];

    let run_url = gs_url(bucket, run_dir);
    let upload = vec![
        Step::new(format!("sudo cp /var/log/sysstat/sa* {}/", THOR_OUTPUT_PATH)),
        Step::new(format!(
            "echo {} > {}",
            spurs_util::escape_for_bash(&params.to_json()?),
            REMOTE_PARAMS_PATH
        )),
        Step::new(format!(
            "gsutil cp {} {}",
            REMOTE_PARAMS_PATH,
            dir!(run_url.as_str(), PARAMS_FILE)
        )),
        Step::new(format!("gsutil cp -r {} {}/", THOR_OUTPUT_PATH, run_url)),
    ];

    Ok(vec![
        Phase { name: "install system packages", steps: system },
        Phase { name: "clone THOR and OpenOrb", steps: checkout },
        Phase { name: "install numeric stack", steps: numeric },
        Phase { name: "build OpenOrb", steps: openorb },
        Phase { name: "install THOR", steps: thor },
        Phase { name: "enable sysstat", steps: sysstat },
        Phase { name: "download dataset", steps: data },
        Phase { name: "run THOR", steps: run },
        Phase { name: "upload results", steps: upload },
    ])
}

/// Call `f` until it succeeds, at most `attempts` times, sleeping `delay` in between. If every
/// attempt fails, the error names the last failure.
fn retry<T, F>(attempts: usize, delay: Duration, mut f: F) -> Result<T, failure::Error>
where
    F: FnMut() -> Result<T, failure::Error>,
{
    let mut last_err: Option<failure::Error> = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            info!("Retrying ({}/{})...", attempt + 1, attempts);
            std::thread::sleep(delay);
        }

        match f() {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!("Attempt {} failed: {}", attempt + 1, err);
                last_err = Some(err);
            }
        }
    }

    Err(failure::format_err!(
        "Gave up after {} attempts: {}",
        attempts,
        last_err
            .map(|err| err.to_string())
            .unwrap_or_else(|| "no attempts made".into())
    ))
}

/// Keep trying to connect until we succeed or run out of attempts. A freshly created instance
/// takes a while to boot and start `sshd`.
fn connect_with_retry(username: &str, ip: IpAddr) -> Result<SshShell, failure::Error> {
    let shell = retry(CONNECT_ATTEMPTS, CONNECT_RETRY_DELAY, || {
        let shell = SshShell::with_default_key(username, (ip, 22))?;
        shell.run(cmd!("echo connected"))?;
        Ok(shell)
    })
    .map_err(|err| failure::format_err!("Unable to connect to {}@{}: {}", username, ip, err))?;

    info!("Connected to {}@{}", username, ip);

    Ok(shell)
}

/// Connect to the (already created) instance and run all phases.
fn run_on_instance(
    instance: &Instance,
    username: &str,
    phases: &[Phase],
) -> Result<(), failure::Error> {
    let ip: IpAddr = instance.external_ip()?.parse()?;
    info!("Instance {} is at {}", instance.name, ip);

    let ushell = connect_with_retry(username, ip)?;
    dump_sys_info(&ushell)?;

    for phase in phases.iter() {
        info!("== {} ==", phase.name);
        for step in phase.steps.iter() {
            step.run(&ushell)?;
        }
    }

    Ok(())
}

/// Run the benchmark and then, if `cleanup` is set, delete the instance whether or not the benchmark
/// succeeded. A benchmark failure is reported over a cleanup failure.
fn run_then_cleanup<R, D>(
    instance: &str,
    cleanup: bool,
    benchmark: R,
    delete: D,
) -> Result<(), failure::Error>
where
    R: FnOnce() -> Result<(), failure::Error>,
    D: FnOnce() -> Result<(), failure::Error>,
{
    let result = benchmark();

    if let Err(err) = &result {
        error!("Benchmark failed: {}", err);
    }

    if !cleanup {
        warn!(
            "Not deleting instance {}. Remember to delete it yourself.",
            instance
        );
        return result;
    }

    match delete() {
        Ok(()) => result,
        Err(err) => {
            error!("Unable to delete instance {}: {}", instance, err);
            result.and(Err(err))
        }
    }
}

fn default_ssh_key() -> Result<String, failure::Error> {
    let home = std::env::var("HOME")?;
    Ok(format!("{}/.ssh/id_rsa.pub", home))
}

pub fn run(sub_m: &ArgMatches<'_>) -> Result<(), failure::Error> {
    let machine_type = sub_m.value_of("INSTANCE").unwrap();
    let thor_version = sub_m.value_of("THOR_VERSION").unwrap();
    let dataset = sub_m.value_of("DATASET").unwrap();
    let username = sub_m.value_of("USERNAME").unwrap();
    let native_comp = sub_m.is_present("NATIVE_COMP");
    let use_mkl = sub_m.is_present("MKL");
    let cleanup = !sub_m.is_present("NO_CLEANUP");
    let dry_run = sub_m.is_present("DRY_RUN");
    let location = Location {
        project: sub_m.value_of("PROJECT").unwrap_or(GCP_PROJECT).into(),
        zone: sub_m.value_of("ZONE").unwrap_or(GCP_ZONE).into(),
    };
    let bucket = sub_m.value_of("BUCKET").unwrap_or(BENCHMARK_BUCKET);

    let params = BenchmarkParameters {
        instance_type: machine_type.into(),
        thor_version: thor_version.into(),
        dataset: dataset.into(),
        native_comp,
        use_mkl,
    };

    let name = instance_name(
        machine_type,
        thor_version,
        &random_suffix(&mut rand::thread_rng()),
    );
    let instance = Instance::new(location, name);
    let run_dir = paths::run_dir(dataset, &instance.name);
    let phases = provisioning_phases(&params, bucket, &run_dir)?;

    if dry_run {
        let spec = InstanceSpec {
            machine_type,
            ssh_user: username,
            ssh_pubkey: "<contents of public key>",
        };
        println!("gcloud {}", instance.create_args(&spec).join(" "));
        for phase in phases.iter() {
            println!("# {}", phase.name);
            for step in phase.steps.iter() {
                println!("{}", step);
            }
        }
        if cleanup {
            println!("gcloud {}", instance.delete_args().join(" "));
        }
        return Ok(());
    }

    let ssh_key = match sub_m.value_of("SSH_KEY") {
        Some(path) => path.to_owned(),
        None => default_ssh_key()?,
    };
    let ssh_pubkey = std::fs::read_to_string(&ssh_key)?;
    let spec = InstanceSpec {
        machine_type,
        ssh_user: username,
        ssh_pubkey: &ssh_pubkey,
    };

    instance.create(&spec)?;

    run_then_cleanup(
        &instance.name,
        cleanup,
        || run_on_instance(&instance, username, &phases),
        || instance.delete(),
    )?;

    let run_url = gs_url(bucket, &run_dir);
    println!("All done!");
    println!("Results are in {}", run_url);
    println!(
        "Download command:\n\tgsutil cp -r {} .",
        gs_url(bucket, &paths::results_prefix(dataset))
    );

    Ok(())
}
