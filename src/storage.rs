//! Read access to the benchmark bucket.

use std::process::Command;

use log::debug;

use crate::common::paths::gs_url;

/// Read-only view of an object store laid out as in `common::paths`.
pub trait ObjectStore {
    /// The immediate "subdirectories" under `prefix`, without `prefix` and without the trailing
    /// slash. `prefix` is either empty (the root) or ends with `/`. A prefix with no objects under
    /// it has no subdirectories.
    fn subdirs(&self, prefix: &str) -> Result<Vec<String>, failure::Error>;

    /// The contents of the object at `key`.
    fn read_to_string(&self, key: &str) -> Result<String, failure::Error>;
}

/// An `ObjectStore` backed by a GCS bucket, accessed with `gsutil`.
#[derive(Debug, Clone)]
pub struct Gsutil {
    bucket: String,
}

impl Gsutil {
    pub fn new(bucket: &str) -> Self {
        Gsutil {
            bucket: bucket.into(),
        }
    }

    fn gsutil(&self, args: &[&str]) -> Result<String, failure::Error> {
        match gsutil_output(args)? {
            Ok(stdout) => Ok(stdout),
            Err(stderr) => Err(gsutil_failed(args, &stderr)),
        }
    }
}

/// Run `gsutil`. The inner result is stdout on success and stderr on failure.
fn gsutil_output(args: &[&str]) -> Result<Result<String, String>, failure::Error> {
    debug!("gsutil {}", args.join(" "));

    let output = Command::new("gsutil").args(args).output()?;

    if output.status.success() {
        Ok(Ok(String::from_utf8(output.stdout)?))
    } else {
        Ok(Err(String::from_utf8_lossy(&output.stderr).trim().to_owned()))
    }
}

fn gsutil_failed(args: &[&str], stderr: &str) -> failure::Error {
    failure::format_err!("`gsutil {}` failed: {}", args.join(" "), stderr)
}

/// `gsutil ls` fails with this when nothing exists under the prefix.
const NO_MATCHES: &str = "matched no objects";

/// Interpret a failed `gsutil ls`. An empty prefix just has no subdirectories.
fn failed_ls_subdirs(args: &[&str], stderr: &str) -> Result<Vec<String>, failure::Error> {
    if stderr.contains(NO_MATCHES) {
        Ok(Vec::new())
    } else {
        Err(gsutil_failed(args, stderr))
    }
}

impl ObjectStore for Gsutil {
    fn subdirs(&self, prefix: &str) -> Result<Vec<String>, failure::Error> {
        let url = gs_url(&self.bucket, prefix);
        let args = ["ls", url.as_str()];
        match gsutil_output(&args)? {
            Ok(listing) => Ok(parse_ls_subdirs(&listing, &url)),
            Err(stderr) => failed_ls_subdirs(&args, &stderr),
        }
    }

    fn read_to_string(&self, key: &str) -> Result<String, failure::Error> {
        self.gsutil(&["cat", gs_url(&self.bucket, key).as_str()])
    }
}

/// Pick the subdirectories out of `gsutil ls` output. `gsutil` prints sub-prefixes with a trailing
/// `/` and objects without one.
fn parse_ls_subdirs(listing: &str, url: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| line.ends_with('/'))
        .filter_map(|line| line.strip_prefix(url))
        .map(|dir| dir.trim_end_matches('/'))
        .filter(|dir| !dir.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
pub mod test {
    use std::collections::BTreeMap;

    use super::*;

    /// An in-memory `ObjectStore`.
    #[derive(Debug, Default)]
    pub struct MemoryStore {
        objects: BTreeMap<String, String>,
    }

    impl MemoryStore {
        pub fn insert(&mut self, key: &str, contents: &str) {
            self.objects.insert(key.into(), contents.into());
        }
    }

    impl ObjectStore for MemoryStore {
        fn subdirs(&self, prefix: &str) -> Result<Vec<String>, failure::Error> {
            let mut dirs: Vec<String> = self
                .objects
                .keys()
                .filter_map(|key| key.strip_prefix(prefix))
                .filter_map(|rest| rest.split_once('/'))
                .map(|(dir, _)| dir.to_owned())
                .collect();
            dirs.dedup();
            Ok(dirs)
        }

        fn read_to_string(&self, key: &str) -> Result<String, failure::Error> {
            self.objects
                .get(key)
                .cloned()
                .ok_or_else(|| failure::format_err!("No such object: {}", key))
        }
    }

    #[test]
    fn ls_subdirs() {
        let listing = "gs://bucket/ds/results/run-a/\n\
                       gs://bucket/ds/results/run-b/\n\
                       gs://bucket/ds/results/notes.txt\n";
        assert_eq!(
            parse_ls_subdirs(listing, "gs://bucket/ds/results/"),
            vec!["run-a", "run-b"]
        );
    }

    #[test]
    fn ls_subdirs_root() {
        let listing = "gs://bucket/ds-one/\ngs://bucket/ds-two/\n";
        assert_eq!(
            parse_ls_subdirs(listing, "gs://bucket/"),
            vec!["ds-one", "ds-two"]
        );
    }

    #[test]
    fn ls_empty_prefix() {
        let args = ["ls", "gs://bucket/new-ds/results/"];

        let empty = failed_ls_subdirs(
            &args,
            "CommandException: One or more URLs matched no objects.",
        )
        .unwrap();
        assert!(empty.is_empty());

        let denied = failed_ls_subdirs(
            &args,
            "AccessDeniedException: 403 markm does not have storage.objects.list access",
        );
        let msg = denied.unwrap_err().to_string();
        assert!(msg.contains("gs://bucket/new-ds/results/"));
        assert!(msg.contains("AccessDeniedException"));
    }

    #[test]
    fn memory_store_subdirs() {
        let mut store = MemoryStore::default();
        store.insert("a/results/x/p.json", "");
        store.insert("a/results/x/thor-output/start_time.txt", "");
        store.insert("a/results/y/p.json", "");
        store.insert("a/config.yaml", "");
        store.insert("b/config.yaml", "");

        assert_eq!(store.subdirs("").unwrap(), vec!["a", "b"]);
        assert_eq!(store.subdirs("a/results/").unwrap(), vec!["x", "y"]);
        assert!(store.read_to_string("a/missing").is_err());
    }
}
