//! Scrape counters and phase durations out of a THOR log.
//!
//! The lines of interest look like this:
//!
//! ```text
//! 2023-06-28 14:11:42.684 [INFO] [140025143456192] Found 11153 observations. (main.py, rangeAndShift, 385)
//! 2023-06-28 14:11:42.684 [INFO] [140025143456192] Range and shift completed in 28.289 seconds. (main.py, rangeAndShift, 386)
//! 2023-06-28 14:12:47.288 [INFO] [140025143456192] Found 1405 clusters. (main.py, clusterAndLink, 719)
//! 2023-06-28 14:12:47.288 [INFO] [140025143456192] Clustering and restructuring completed in 63.647 seconds. (main.py, clusterAndLink, 720)
//! 2023-06-28 14:12:51.176 [INFO] [140025143456192] Found 471 initial orbits. (iod.py, initialOrbitDetermination, 795)
//! 2023-06-28 14:12:51.201 [INFO] [140025143456192] Initial orbit determination completed in 3.889 seconds. (iod.py, initialOrbitDetermination, 812)
//! 2023-06-28 14:13:20.989 [INFO] [140025143456192] Differential correction completed in 29.712 seconds. (od.py, differentialCorrection, 801)
//! 2023-06-28 14:13:21.908 [INFO] [140025143456192] Attribution completed in 0.855 seconds. (attribution.py, attributeObservations, 302)
//! 2023-06-28 14:13:28.351 [INFO] [140025143456192] Number of attribution / differential correction iterations: 5 (attribution.py, mergeAndExtendOrbits, 529)
//! 2023-06-28 14:13:28.351 [INFO] [140025143456192] Extended and/or merged 9 orbits into 9 orbits. (attribution.py, mergeAndExtendOrbits, 534)
//! 2023-06-28 14:13:28.351 [INFO] [140025143456192] Orbit extension and merging completed in 7.311 seconds. (attribution.py, mergeAndExtendOrbits, 539)
//! ```
//!
//! Differential correction and attribution run once per merge iteration, so their durations are
//! summed.

use regex::Regex;

use super::AnalysisError;

/// What a matching line tells us. The order of `PATTERNS` matters: only the first matching
/// pattern of a line is applied.
#[derive(Debug, Clone, Copy)]
enum Event {
    Observations,
    Clusters,
    InitialOrbits,
    MergedOrbits,
    OdIterations,
    RangeAndShift,
    Clustering,
    Iod,
    Od,
    Attribution,
    Merging,
}

const PATTERNS: &[(Event, &str)] = &[
    (Event::Observations, r"Found ([0-9]+) observations\."),
    (Event::Clusters, r"Found ([0-9]+) clusters\."),
    (Event::InitialOrbits, r"Found ([0-9]+) initial orbits\."),
    (
        Event::MergedOrbits,
        r"Extended and/or merged ([0-9]+) orbits into ([0-9]+) orbits\.",
    ),
    (
        Event::OdIterations,
        r"Number of attribution / differential correction iterations: ([0-9]+)",
    ),
    (
        Event::RangeAndShift,
        r"Range and shift completed in ([0-9]+\.[0-9]+) seconds\.",
    ),
    (
        Event::Clustering,
        r"Clustering and restructuring completed in ([0-9]+\.[0-9]+) seconds\.",
    ),
    (
        Event::Iod,
        r"Initial orbit determination completed in ([0-9]+\.[0-9]+) seconds\.",
    ),
    (
        Event::Od,
        r"Differential correction completed in ([0-9]+\.[0-9]+) seconds\.",
    ),
    (
        Event::Attribution,
        r"Attribution completed in ([0-9]+\.[0-9]+) seconds\.",
    ),
    (
        Event::Merging,
        r"Orbit extension and merging completed in ([0-9]+\.[0-9]+) seconds\.",
    ),
];

#[derive(Debug, Clone, PartialEq)]
pub struct LogMetrics {
    pub n_obs: u64,
    pub n_clusters: u64,
    pub n_initial_orbits: u64,
    pub n_orbits: u64,
    pub n_merged_orbits: u64,
    pub n_od_iterations: u64,

    // Seconds
    pub range_and_shift_time: f64,
    pub clustering_time: f64,
    pub iod_time: f64,
    pub total_od_time: f64,
    pub total_attribution_time: f64,
    pub merging_time: f64,
}

/// Metrics seen so far. Everything but the totals must be seen at least once.
#[derive(Debug, Default)]
struct Partial {
    n_obs: Option<u64>,
    n_clusters: Option<u64>,
    n_initial_orbits: Option<u64>,
    n_orbits: Option<u64>,
    n_merged_orbits: Option<u64>,
    n_od_iterations: Option<u64>,
    range_and_shift_time: Option<f64>,
    clustering_time: Option<f64>,
    iod_time: Option<f64>,
    total_od_time: f64,
    total_attribution_time: f64,
    merging_time: Option<f64>,
}

fn required<T>(value: Option<T>, metric: &'static str) -> Result<T, AnalysisError> {
    value.ok_or(AnalysisError::MissingMetric { metric })
}

impl Partial {
    fn finish(self) -> Result<LogMetrics, AnalysisError> {
        Ok(LogMetrics {
            n_obs: required(self.n_obs, "n_obs")?,
            n_clusters: required(self.n_clusters, "n_clusters")?,
            n_initial_orbits: required(self.n_initial_orbits, "n_initial_orbits")?,
            n_orbits: required(self.n_orbits, "n_orbits")?,
            n_merged_orbits: required(self.n_merged_orbits, "n_merged_orbits")?,
            n_od_iterations: required(self.n_od_iterations, "n_od_iterations")?,
            range_and_shift_time: required(self.range_and_shift_time, "range_and_shift_time")?,
            clustering_time: required(self.clustering_time, "clustering_time")?,
            iod_time: required(self.iod_time, "iod_time")?,
            total_od_time: self.total_od_time,
            total_attribution_time: self.total_attribution_time,
            merging_time: required(self.merging_time, "merging_time")?,
        })
    }
}

/// Compiled `PATTERNS`.
pub struct LogScraper {
    patterns: Vec<(Event, Regex)>,
}

impl LogScraper {
    pub fn new() -> Self {
        let patterns = PATTERNS
            .iter()
            .map(|(event, re)| (*event, Regex::new(re).expect("invalid log pattern")))
            .collect();

        LogScraper { patterns }
    }

    pub fn scrape<'l, I>(&self, lines: I) -> Result<LogMetrics, AnalysisError>
    where
        I: IntoIterator<Item = &'l str>,
    {
        let mut partial = Partial::default();

        for line in lines {
            let hit = self
                .patterns
                .iter()
                .find_map(|(event, re)| re.captures(line).map(|caps| (*event, caps)));

            let (event, caps) = match hit {
                Some(hit) => hit,
                None => continue,
            };

            let int = |i: usize| -> Result<u64, AnalysisError> {
                caps[i].parse().map_err(|_| AnalysisError::BadLogLine {
                    line: line.trim().into(),
                })
            };
            let secs = || -> Result<f64, AnalysisError> {
                caps[1].parse().map_err(|_| AnalysisError::BadLogLine {
                    line: line.trim().into(),
                })
            };

            match event {
                Event::Observations => partial.n_obs = Some(int(1)?),
                Event::Clusters => partial.n_clusters = Some(int(1)?),
                Event::InitialOrbits => partial.n_initial_orbits = Some(int(1)?),
                Event::MergedOrbits => {
                    partial.n_orbits = Some(int(1)?);
                    partial.n_merged_orbits = Some(int(2)?);
                }
                // A run that converges immediately reports 0 iterations, but it still did one.
                Event::OdIterations => partial.n_od_iterations = Some(int(1)?.max(1)),
                Event::RangeAndShift => partial.range_and_shift_time = Some(secs()?),
                Event::Clustering => partial.clustering_time = Some(secs()?),
                Event::Iod => partial.iod_time = Some(secs()?),
                Event::Od => partial.total_od_time += secs()?,
                Event::Attribution => partial.total_attribution_time += secs()?,
                Event::Merging => partial.merging_time = Some(secs()?),
            }
        }

        partial.finish()
    }
}

impl LogMetrics {
    pub fn from_lines<'l, I>(lines: I) -> Result<Self, AnalysisError>
    where
        I: IntoIterator<Item = &'l str>,
    {
        LogScraper::new().scrape(lines)
    }

    pub fn from_log(log: &str) -> Result<Self, AnalysisError> {
        Self::from_lines(log.lines())
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    pub const SAMPLE_LOG: &str = "\
2023-06-28 14:11:14.394 [INFO] [140025143456192] Running range and shift... (main.py, rangeAndShift, 300)
2023-06-28 14:11:42.684 [INFO] [140025143456192] Found 11153 observations. (main.py, rangeAndShift, 385)
2023-06-28 14:11:42.684 [INFO] [140025143456192] Range and shift completed in 28.289 seconds. (main.py, rangeAndShift, 386)
2023-06-28 14:12:47.288 [INFO] [140025143456192] Found 1405 clusters. (main.py, clusterAndLink, 719)
2023-06-28 14:12:47.288 [INFO] [140025143456192] Clustering and restructuring completed in 63.647 seconds. (main.py, clusterAndLink, 720)
2023-06-28 14:12:51.176 [INFO] [140025143456192] Found 471 initial orbits. (iod.py, initialOrbitDetermination, 795)
2023-06-28 14:12:51.201 [INFO] [140025143456192] Initial orbit determination completed in 3.889 seconds. (iod.py, initialOrbitDetermination, 812)
2023-06-28 14:13:20.989 [INFO] [140025143456192] Differential correction completed in 29.712 seconds. (od.py, differentialCorrection, 801)
2023-06-28 14:13:21.908 [INFO] [140025143456192] Attribution completed in 0.855 seconds. (attribution.py, attributeObservations, 302)
2023-06-28 14:13:22.617 [INFO] [140025143456192] Differential correction completed in 0.600 seconds. (od.py, differentialCorrection, 801)
2023-06-28 14:13:23.467 [INFO] [140025143456192] Attribution completed in 0.794 seconds. (attribution.py, attributeObservations, 302)
2023-06-28 14:13:28.351 [INFO] [140025143456192] Number of attribution / differential correction iterations: 5 (attribution.py, mergeAndExtendOrbits, 529)
2023-06-28 14:13:28.351 [INFO] [140025143456192] Extended and/or merged 9 orbits into 7 orbits. (attribution.py, mergeAndExtendOrbits, 534)
2023-06-28 14:13:28.351 [INFO] [140025143456192] Orbit extension and merging completed in 7.311 seconds. (attribution.py, mergeAndExtendOrbits, 539)
";

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn sample() {
        let metrics = LogMetrics::from_log(SAMPLE_LOG).unwrap();

        assert_eq!(metrics.n_obs, 11153);
        assert_eq!(metrics.n_clusters, 1405);
        assert_eq!(metrics.n_initial_orbits, 471);
        assert_eq!(metrics.n_orbits, 9);
        assert_eq!(metrics.n_merged_orbits, 7);
        assert_eq!(metrics.n_od_iterations, 5);

        assert!(close(metrics.range_and_shift_time, 28.289));
        assert!(close(metrics.clustering_time, 63.647));
        assert!(close(metrics.iod_time, 3.889));
        assert!(close(metrics.total_od_time, 29.712 + 0.600));
        assert!(close(metrics.total_attribution_time, 0.855 + 0.794));
        assert!(close(metrics.merging_time, 7.311));
    }

    #[test]
    fn zero_iterations_counts_as_one() {
        let log = SAMPLE_LOG.replace("iterations: 5", "iterations: 0");
        assert_eq!(LogMetrics::from_log(&log).unwrap().n_od_iterations, 1);
    }

    #[test]
    fn later_lines_overwrite() {
        let log = format!(
            "{}Found 12 clusters. (main.py, clusterAndLink, 719)\n",
            SAMPLE_LOG
        );
        assert_eq!(LogMetrics::from_log(&log).unwrap().n_clusters, 12);
    }

    #[test]
    fn totals_default_to_zero() {
        let log: String = SAMPLE_LOG
            .lines()
            .filter(|l| !l.contains("Differential correction") && !l.contains("Attribution"))
            .map(|l| format!("{}\n", l))
            .collect();
        let metrics = LogMetrics::from_log(&log).unwrap();
        assert_eq!(metrics.total_od_time, 0.0);
        assert_eq!(metrics.total_attribution_time, 0.0);
    }

    #[test]
    fn non_ascii_digits_are_not_counts() {
        let log = format!(
            "{}Found \u{0661}\u{0662} clusters. (main.py, clusterAndLink, 719)\n",
            SAMPLE_LOG
        );
        assert_eq!(LogMetrics::from_log(&log).unwrap().n_clusters, 1405);
    }

    #[test]
    fn missing_metric() {
        let log: String = SAMPLE_LOG
            .lines()
            .filter(|l| !l.contains("initial orbits"))
            .map(|l| format!("{}\n", l))
            .collect();
        match LogMetrics::from_log(&log) {
            Err(AnalysisError::MissingMetric { metric }) => assert_eq!(metric, "n_initial_orbits"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn empty_log() {
        assert!(LogMetrics::from_log("").is_err());
    }
}
