//! Scrape the results of all benchmark runs in the bucket into one table, printed to stdout.
//!
//! Each run directory yields one row (see `row::OutputRow`) joined from the run parameters, the
//! THOR config, the THOR log and the timestamps around the THOR invocation.

mod config;
mod row;
mod thor_log;
mod window;

use std::io::Write;

use clap::{clap_app, ArgMatches};

use failure::Fail;

use crate::common::BENCHMARK_BUCKET;
use crate::storage::Gsutil;

use self::row::{all_rows, OutputRow, Selection};

/// Why a run's artifacts could not be turned into a row.
#[derive(Debug, Fail)]
pub enum AnalysisError {
    #[fail(display = "Unrecognized timestamp {:?}", timestamp)]
    BadTimestamp { timestamp: String },

    #[fail(display = "Run ended ({}) before it started ({})", end, start)]
    NegativeWindow { start: String, end: String },

    #[fail(display = "Log never reported {}", metric)]
    MissingMetric { metric: &'static str },

    #[fail(display = "Unparsable log line {:?}", line)]
    BadLogLine { line: String },

    #[fail(display = "Unable to parse THOR config: {}", reason)]
    BadConfig { reason: String },
}

/// Column names of the output, in order. Must match the fields of `OutputRow`.
pub const COLUMNS: &[&str] = &[
    "instance_name",
    "instance_type",
    "thor_version",
    "native_comp",
    "use_mkl",
    "dataset",
    "cell_area",
    "backend",
    "cluster_min_obs",
    "cluster_algorithm",
    "n_obs",
    "n_clusters",
    "n_initial_orbits",
    "n_orbits",
    "n_merged_orbits",
    "n_od_iterations",
    "execution_time",
    "range_and_shift_time",
    "clustering_time",
    "iod_time",
    "total_od_time",
    "total_attribution_time",
    "merging_time",
];

pub fn cli_options() -> clap::App<'static, 'static> {
    fn is_delimiter(s: String) -> Result<(), String> {
        parse_delimiter(&s).map(|_| ())
    }

    clap_app! { analyze =>
        (about: "Collect the results of all benchmark runs in the bucket and print them as a \
                 delimited table, one line per run. Requires `gsutil`.")
        (@arg BUCKET: --bucket +takes_value
         "(Optional) The bucket to read results from (defaults to `thor-benchmark-data`)")
        (@arg DATASET: --dataset +takes_value
         "(Optional) Only analyze runs of this dataset")
        (@arg DELIMITER: --delimiter +takes_value {is_delimiter}
         "(Optional) `comma` (default) or `tab`")
        (@arg STRICT: --strict
         "(Optional) Abort on the first run that cannot be analyzed, rather than skipping it.")
    }
}

fn parse_delimiter(s: &str) -> Result<u8, String> {
    match s {
        "comma" | "," => Ok(b','),
        "tab" | "\t" => Ok(b'\t'),
        other => Err(format!("Unknown delimiter {:?}; expected `comma` or `tab`", other)),
    }
}

/// Write the header and then one line per row.
pub fn write_rows<W: Write>(
    out: W,
    delimiter: u8,
    rows: &[OutputRow],
) -> Result<(), failure::Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_writer(out);

    writer.write_record(COLUMNS)?;
    for row in rows.iter() {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}

pub fn run(sub_m: &ArgMatches<'_>) -> Result<(), failure::Error> {
    let bucket = sub_m.value_of("BUCKET").unwrap_or(BENCHMARK_BUCKET);
    let delimiter = sub_m
        .value_of("DELIMITER")
        .map(|value| parse_delimiter(value).unwrap())
        .unwrap_or(b',');
    let selection = Selection {
        dataset: sub_m.value_of("DATASET"),
        fail_fast: sub_m.is_present("STRICT"),
    };

    let store = Gsutil::new(bucket);
    let rows = all_rows(&store, &selection)?;

    let stdout = std::io::stdout();
    write_rows(stdout.lock(), delimiter, &rows)?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::row::test::add_run;
    use super::*;
    use crate::storage::test::MemoryStore;

    fn table(delimiter: u8) -> String {
        let mut store = MemoryStore::default();
        add_run(&mut store, "full-month-small-cell", "benchmark-thor-n2-standard-8-1a2b3c-qwer");
        let rows = all_rows(&store, &Selection::default()).unwrap();

        let mut out = Vec::new();
        write_rows(&mut out, delimiter, &rows).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn header_matches_row_fields() {
        let mut store = MemoryStore::default();
        add_run(&mut store, "ds", "benchmark-thor-x-aaaaaa-aaaa");
        let rows = all_rows(&store, &Selection::default()).unwrap();

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(&rows[0]).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();

        assert_eq!(out.lines().next().unwrap(), COLUMNS.join(","));
    }

    #[test]
    fn comma_table() {
        let table = table(b',');
        let lines: Vec<_> = table.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], COLUMNS.join(","));
        assert_eq!(
            lines[1],
            "qwer,n2-standard-8,1a2b3c4d5e,true,false,full-month-small-cell,10.0,PYOORB,5,\
             hotspot_2d,11153,1405,471,9,7,5,142.0,28.289,63.647,3.889,30.312,1.649,7.311"
        );
    }

    #[test]
    fn tab_table() {
        let table = table(b'\t');
        let header = table.lines().next().unwrap();
        assert_eq!(header.split('\t').count(), COLUMNS.len());
    }

    #[test]
    fn empty_table_has_header() {
        let mut out = Vec::new();
        write_rows(&mut out, b',', &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), format!("{}\n", COLUMNS.join(",")));
    }

    #[test]
    fn delimiters() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("comma"), Ok(b','));
        assert!(parse_delimiter("pipe").is_err());
    }
}
