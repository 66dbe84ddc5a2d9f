// src/data.rs - IMU signal traces loaded from the per-camera viewer CSV
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;

use crate::error::{Result, ViewerError};
use crate::sync::TimeWindow;
use crate::video::FrameRate;

/// A cell that did not parse as a number. The sample is stored as NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    /// Zero-based data row, header excluded.
    pub row: usize,
    pub channel: String,
    pub raw: String,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    pub samples: Vec<f64>,
    pub visible: bool,
}

pub struct SignalTrace {
    channels: Vec<Channel>,
    by_name: HashMap<String, usize>,
    sample_count: usize,
    frame_rate: FrameRate,
    warnings: Vec<ParseWarning>,
}

impl SignalTrace {
    pub fn load(path: &Path, frame_rate: FrameRate) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let trace = Self::from_reader(file, frame_rate).map_err(|e| match e {
            ViewerError::EmptySignal { .. } => ViewerError::EmptySignal {
                path: path.to_path_buf(),
            },
            other => other,
        })?;

        tracing::info!(
            "Loaded IMU data from {}: {} channels x {} samples",
            path.display(),
            trace.channels.len(),
            trace.sample_count
        );
        if !trace.warnings.is_empty() {
            tracing::warn!(
                "{} non-numeric cells in {} were treated as missing",
                trace.warnings.len(),
                path.display()
            );
        }
        Ok(trace)
    }

    /// The first column is the index/time column and is discarded; every
    /// other column becomes a channel in file order.
    pub fn from_reader<R: Read>(reader: R, frame_rate: FrameRate) -> Result<Self> {
        let mut csv = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let names = unique_names(csv.headers()?.iter().skip(1));
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
        let mut warnings = Vec::new();

        for (row, record) in csv.records().enumerate() {
            let record = record?;
            for (column, samples) in columns.iter_mut().enumerate() {
                let cell = record.get(column + 1).unwrap_or("");
                samples.push(parse_cell(cell).unwrap_or_else(|| {
                    warnings.push(ParseWarning {
                        row,
                        channel: names[column].clone(),
                        raw: cell.to_owned(),
                    });
                    f64::NAN
                }));
            }
        }

        let sample_count = columns.first().map_or(0, Vec::len);
        if names.is_empty() || sample_count == 0 {
            return Err(ViewerError::EmptySignal {
                path: Default::default(),
            });
        }

        let channels: Vec<Channel> = names
            .into_iter()
            .zip(columns)
            .enumerate()
            .map(|(i, (name, samples))| Channel {
                name,
                samples,
                visible: i == 0,
            })
            .collect();
        let by_name = channels
            .iter()
            .enumerate()
            .map(|(i, channel)| (channel.name.clone(), i))
            .collect();

        Ok(Self {
            channels,
            by_name,
            sample_count,
            frame_rate,
            warnings,
        })
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.name.as_str())
    }

    pub fn samples(&self, name: &str) -> Option<&[f64]> {
        self.channel(name).map(|c| c.samples.as_slice())
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    /// None past the end of the trace, e.g. when the video runs longer.
    pub fn timestamp(&self, index: usize) -> Option<f64> {
        (index < self.sample_count).then(|| self.frame_rate.timestamp(index))
    }

    /// Timestamp of the last sample.
    pub fn total_duration_seconds(&self) -> f64 {
        self.frame_rate.timestamp(self.sample_count.saturating_sub(1))
    }

    pub fn is_visible(&self, name: &str) -> bool {
        self.channel(name).map_or(false, |c| c.visible)
    }

    pub fn set_visible(&mut self, name: &str, visible: bool) -> Result<()> {
        let index = *self
            .by_name
            .get(name)
            .ok_or_else(|| ViewerError::UnknownChannel(name.to_owned()))?;
        self.channels[index].visible = visible;
        Ok(())
    }

    pub fn toggle(&mut self, name: &str) -> Result<bool> {
        let visible = !self.is_visible(name);
        self.set_visible(name, visible)?;
        Ok(visible)
    }

    pub fn visible_channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|c| c.visible)
    }

    /// Min and max of the finite visible samples inside `window`.
    pub fn value_range(&self, window: TimeWindow) -> Option<(f64, f64)> {
        let indices = self.index_span(window)?;
        self.visible_channels()
            .flat_map(|c| c.samples[indices.clone()].iter().copied())
            .filter(|v| v.is_finite())
            .fold(None, |range, v| match range {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Contiguous finite `[t, v]` runs of a channel inside `window`, one
    /// sample of margin on each side so lines reach the plot edges.
    pub fn line_runs(&self, name: &str, window: TimeWindow) -> Vec<Vec<[f64; 2]>> {
        let (Some(samples), Some(span)) = (self.samples(name), self.index_span(window)) else {
            return Vec::new();
        };
        let start = span.start.saturating_sub(1);
        let end = (span.end + 1).min(self.sample_count);

        let mut runs = Vec::new();
        let mut current = Vec::new();
        for i in start..end {
            let value = samples[i];
            if value.is_finite() {
                current.push([self.frame_rate.timestamp(i), value]);
            } else if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            runs.push(current);
        }
        runs
    }

    fn channel(&self, name: &str) -> Option<&Channel> {
        self.by_name.get(name).map(|&i| &self.channels[i])
    }

    fn index_span(&self, window: TimeWindow) -> Option<std::ops::Range<usize>> {
        let fps = self.frame_rate.fps();
        let first = (window.start * fps).ceil().max(0.0) as usize;
        let last = (window.end * fps).floor();
        if last < 0.0 || first >= self.sample_count {
            return None;
        }
        let end = (last as usize + 1).min(self.sample_count);
        (first < end).then_some(first..end)
    }
}

/// Repeated headers get `.1`, `.2`, ... suffixes so every column keeps its
/// own name: `A,A,A.1` becomes `A,A.2,A.1`.
fn unique_names<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let headers: Vec<&str> = headers.collect();
    let mut taken: HashSet<String> = headers.iter().map(|h| h.to_string()).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut counters: HashMap<&str, usize> = HashMap::new();

    headers
        .iter()
        .map(|&header| {
            if seen.insert(header) {
                return header.to_owned();
            }
            let counter = counters.entry(header).or_insert(0);
            loop {
                *counter += 1;
                let candidate = format!("{header}.{counter}");
                if taken.insert(candidate.clone()) {
                    return candidate;
                }
            }
        })
        .collect()
}

/// Numeric coercion: empty cells are quietly missing, anything else that
/// fails to parse is reported.
fn parse_cell(cell: &str) -> Option<f64> {
    if cell.is_empty() {
        return Some(f64::NAN);
    }
    cell.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TempTree;

    fn rate(fps: f64) -> FrameRate {
        FrameRate::new(fps).unwrap()
    }

    fn trace(csv: &str, fps: f64) -> SignalTrace {
        SignalTrace::from_reader(csv.as_bytes(), rate(fps)).unwrap()
    }

    #[test]
    fn non_numeric_cell_becomes_missing_sample() {
        let mut csv = String::from("frame,AccelX,AccelY\n");
        for i in 0..10 {
            let x = if i == 4 { "ERR".to_string() } else { format!("{}.5", i) };
            csv.push_str(&format!("{i},{x},{i}\n"));
        }
        let trace = trace(&csv, 60.0);

        assert_eq!(trace.sample_count(), 10);
        assert_eq!(trace.channel_names().collect::<Vec<_>>(), vec!["AccelX", "AccelY"]);
        let x = trace.samples("AccelX").unwrap();
        assert_eq!(x.len(), 10);
        assert!(x[4].is_nan());
        assert_eq!(x[5], 5.5);
        assert_eq!(
            trace.warnings(),
            &[ParseWarning {
                row: 4,
                channel: "AccelX".into(),
                raw: "ERR".into()
            }]
        );
    }

    #[test]
    fn empty_and_short_rows_are_missing_without_warnings() {
        let trace = trace("t,a,b\n0,1,\n1,2\n2,3,4\n", 30.0);
        let b = trace.samples("b").unwrap();
        assert!(b[0].is_nan() && b[1].is_nan());
        assert_eq!(b[2], 4.0);
        assert!(trace.warnings().is_empty());
    }

    #[test]
    fn only_first_channel_is_visible_by_default() {
        let trace = trace("t,a,b,c\n0,1,2,3\n", 60.0);
        let visible: Vec<&str> = trace.visible_channels().map(|c| c.name.as_str()).collect();
        assert_eq!(visible, vec!["a"]);
    }

    #[test]
    fn toggling_visibility_leaves_samples_untouched() {
        let mut trace = trace("t,a,b\n0,1,2\n1,3,ERR\n", 60.0);
        let before: Vec<u64> = trace.samples("b").unwrap().iter().map(|v| v.to_bits()).collect();

        assert!(trace.toggle("b").unwrap());
        trace.set_visible("a", false).unwrap();
        assert!(!trace.toggle("b").unwrap());

        let after: Vec<u64> = trace.samples("b").unwrap().iter().map(|v| v.to_bits()).collect();
        assert_eq!(before, after);
        assert!(matches!(trace.toggle("zz"), Err(ViewerError::UnknownChannel(_))));
    }

    #[test]
    fn timestamps_follow_frame_rate_and_stop_at_the_last_sample() {
        let mut csv = String::from("t,a\n");
        for i in 0..121 {
            csv.push_str(&format!("{i},{i}\n"));
        }
        let trace = trace(&csv, 60.0);
        assert_eq!(trace.timestamp(30), Some(0.5));
        assert_eq!(trace.timestamp(120), Some(2.0));
        assert_eq!(trace.timestamp(121), None);
        assert_eq!(trace.total_duration_seconds(), 2.0);
    }

    #[test]
    fn header_only_or_index_only_files_are_empty() {
        assert!(matches!(
            SignalTrace::from_reader("t,a\n".as_bytes(), rate(60.0)),
            Err(ViewerError::EmptySignal { .. })
        ));
        assert!(matches!(
            SignalTrace::from_reader("t\n0\n1\n".as_bytes(), rate(60.0)),
            Err(ViewerError::EmptySignal { .. })
        ));
    }

    #[test]
    fn value_range_covers_visible_finite_samples_in_window() {
        let mut trace = trace("t,a,b\n0,1,100\n1,NaN,-50\n2,5,7\n3,-2,8\n", 1.0);
        let window = TimeWindow::new(0.5, 2.5);
        assert_eq!(trace.value_range(window), Some((5.0, 5.0)));
        trace.set_visible("b", true).unwrap();
        assert_eq!(trace.value_range(window), Some((-50.0, 7.0)));
        assert_eq!(trace.value_range(TimeWindow::new(10.0, 12.0)), None);
    }

    #[test]
    fn line_runs_break_at_missing_samples() {
        let trace = trace("t,a\n0,1\n1,2\n2,x\n3,4\n4,5\n5,6\n", 1.0);
        let runs = trace.line_runs("a", TimeWindow::new(0.0, 4.0));
        assert_eq!(runs, vec![vec![[0.0, 1.0], [1.0, 2.0]], vec![[3.0, 4.0], [4.0, 5.0], [5.0, 6.0]]]);
        assert!(trace.line_runs("missing", TimeWindow::new(0.0, 4.0)).is_empty());
    }

    #[test]
    fn repeated_headers_stay_separately_addressable() {
        let mut trace = trace("t,A,A\n0,1,2\n", 60.0);
        assert_eq!(trace.channel_names().collect::<Vec<_>>(), vec!["A", "A.1"]);
        assert_eq!(trace.samples("A.1"), Some(&[2.0][..]));

        assert!(!trace.toggle("A").unwrap());
        let visible: Vec<bool> = trace.channels().iter().map(|c| c.visible).collect();
        assert_eq!(visible, vec![false, false]);
        assert!(trace.toggle("A.1").unwrap());
        assert!(!trace.is_visible("A"));
    }

    #[test]
    fn renamed_headers_skip_names_already_in_the_file() {
        let trace = trace("t,A,A,A.1\n0,1,2,3\n", 60.0);
        assert_eq!(trace.channel_names().collect::<Vec<_>>(), vec!["A", "A.2", "A.1"]);
        assert_eq!(trace.samples("A.2"), Some(&[2.0][..]));
        assert_eq!(trace.samples("A.1"), Some(&[3.0][..]));
    }

    #[test]
    fn load_reports_path_of_empty_file() {
        let tree = TempTree::new();
        let path = tree.file("Cam1.csv", "t,a\n");
        match SignalTrace::load(&path, rate(60.0)) {
            Err(ViewerError::EmptySignal { path: reported }) => assert_eq!(reported, path),
            other => panic!("unexpected {:?}", other.map(|t| t.sample_count())),
        }
    }
}
