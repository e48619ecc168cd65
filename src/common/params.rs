//! The parameters of one benchmark run. These are written to the run directory by `bench` and
//! read back by `analyze`, so the serialized names are part of the storage layout.

use serde::{Deserialize, Serialize};

/// How the numeric python stack (numpy/scipy) is installed on the instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NumericStack {
    /// Prebuilt wheels from PyPI.
    Wheels,
    /// Built from source with host-specific optimizations.
    Native,
    /// Intel MKL-backed builds.
    Mkl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkParameters {
    /// The machine type of the instance (e.g. `n2-standard-8`).
    #[serde(rename = "instance")]
    pub instance_type: String,

    /// The git revision of THOR that was benchmarked.
    pub thor_version: String,

    /// The dataset prefix in the bucket.
    pub dataset: String,

    pub native_comp: bool,
    pub use_mkl: bool,
}

impl BenchmarkParameters {
    pub fn numeric_stack(&self) -> NumericStack {
        match (self.native_comp, self.use_mkl) {
            (true, _) => NumericStack::Native,
            (false, true) => NumericStack::Mkl,
            (false, false) => NumericStack::Wheels,
        }
    }

    pub fn to_json(&self) -> Result<String, failure::Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse parameters from a JSON blob. Older runs stored a python dict repr rather than JSON,
    /// so single quotes are accepted in place of double quotes.
    pub fn from_json(blob: &str) -> Result<Self, failure::Error> {
        match serde_json::from_str(blob) {
            Ok(params) => Ok(params),
            Err(_) => {
                let blob = blob.replace('\'', "\"");
                serde_json::from_str(&blob).map_err(|err| {
                    failure::format_err!("Unable to parse benchmark parameters {:?}: {}", blob, err)
                })
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> BenchmarkParameters {
        BenchmarkParameters {
            instance_type: "n2-standard-8".into(),
            thor_version: "1a2b3c4d5e".into(),
            dataset: "full-month-small-cell".into(),
            native_comp: false,
            use_mkl: true,
        }
    }

    #[test]
    fn json_uses_storage_names() {
        let json = params().to_json().unwrap();
        assert!(json.contains(r#""instance":"n2-standard-8""#));
        assert!(!json.contains("instance_type"));
        assert_eq!(BenchmarkParameters::from_json(&json).unwrap(), params());
    }

    #[test]
    fn python_repr_is_accepted() {
        let blob = "{'instance': 'n2-standard-8', 'thor_version': '1a2b3c4d5e', \
                    'dataset': 'full-month-small-cell', 'native_comp': false, 'use_mkl': true}";
        assert_eq!(BenchmarkParameters::from_json(blob).unwrap(), params());
    }

    #[test]
    fn missing_field_is_an_error() {
        let blob = r#"{"instance": "n2-standard-8", "dataset": "x"}"#;
        assert!(BenchmarkParameters::from_json(blob).is_err());
    }

    #[test]
    fn numeric_stack() {
        let mut p = params();
        assert_eq!(p.numeric_stack(), NumericStack::Mkl);
        p.use_mkl = false;
        assert_eq!(p.numeric_stack(), NumericStack::Wheels);
        p.native_comp = true;
        assert_eq!(p.numeric_stack(), NumericStack::Native);
    }
}
