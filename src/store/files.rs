//! CSV record store
//!
//! Directory layout under the store root:
//!
//! ```text
//! participants/Participant_<id>.csv
//! average_paths/AveragePath_<stimulus>.csv
//! experiment_statistics.csv
//! participant_averages.csv
//! Metadata_Participants.csv
//! ```

use super::RecordStore;
use crate::error::GazeError;
use crate::sanitize::{RowSanitizer, PARTICIPANT_COLUMNS};
use crate::stats::ParticipantClass;
use crate::types::{
    EyeCategory, ExperimentStatisticsRow, GazeDeviation, GazePoint, ParticipantId,
    ParticipantSummary, ReferencePath, ReferencePoint, Sample,
};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PARTICIPANTS_DIR: &str = "participants";
const AVERAGE_PATHS_DIR: &str = "average_paths";
const EXPERIMENT_STATISTICS_FILE: &str = "experiment_statistics.csv";
const PARTICIPANT_AVERAGES_FILE: &str = "participant_averages.csv";
const METADATA_FILE: &str = "Metadata_Participants.csv";

const PARTICIPANT_HEADER: [&str; 16] = [
    "Participant",
    "Experiment",
    "Stimulus",
    "Category Left",
    "Category Right",
    "Point of Regard Right X [px]",
    "Point of Regard Right Y [px]",
    "Point of Regard Left X [px]",
    "Point of Regard Left Y [px]",
    "RecordingTime [ms]",
    "RecordingTime Stimulus [ms]",
    "Duration",
    "SnappedTime",
    "Gaze Deviation Right",
    "Gaze Deviation Left",
    "Overall Gaze Deviation",
];

const REFERENCE_PATH_HEADER: [&str; 5] = [
    "SnappedTime",
    "Avg Right X",
    "Avg Right Y",
    "Avg Left X",
    "Avg Left Y",
];

const EXPERIMENT_STATISTICS_HEADER: [&str; 8] = [
    "Participant",
    "Experiment",
    "Stimulus",
    "Saccade_Frequency",
    "Avg_Saccade_Duration",
    "Avg_Gaze_Deviation",
    "Avg_Fixation_Deviation",
    "Avg_Saccade_Deviation",
];

const PARTICIPANT_SUMMARY_HEADER: [&str; 7] = [
    "Participant",
    "Saccade_Frequency",
    "Avg_Saccade_Duration",
    "Avg_Gaze_Deviation",
    "Avg_Fixation_Deviation",
    "Avg_Saccade_Deviation",
    "Segments",
];

/// Participant row as read; derived columns may be absent
#[derive(Debug, Deserialize)]
struct ParticipantRow {
    #[serde(rename = "Participant")]
    participant: Option<String>,
    #[serde(rename = "Experiment")]
    experiment: String,
    #[serde(rename = "Stimulus")]
    stimulus: String,
    #[serde(rename = "Category Left")]
    category_left: String,
    #[serde(rename = "Category Right")]
    category_right: String,
    #[serde(rename = "Point of Regard Right X [px]")]
    right_x: Option<String>,
    #[serde(rename = "Point of Regard Right Y [px]")]
    right_y: Option<String>,
    #[serde(rename = "Point of Regard Left X [px]")]
    left_x: Option<String>,
    #[serde(rename = "Point of Regard Left Y [px]")]
    left_y: Option<String>,
    #[serde(rename = "RecordingTime [ms]")]
    recording_time: Option<String>,
    #[serde(rename = "RecordingTime Stimulus [ms]", default)]
    stimulus_time: Option<f64>,
    #[serde(rename = "Duration", default)]
    duration: Option<f64>,
    #[serde(rename = "SnappedTime", default)]
    snapped_time: Option<f64>,
    #[serde(rename = "Gaze Deviation Right", default)]
    deviation_right: Option<f64>,
    #[serde(rename = "Gaze Deviation Left", default)]
    deviation_left: Option<f64>,
    #[serde(rename = "Overall Gaze Deviation", default)]
    deviation_overall: Option<f64>,
}

impl ParticipantRow {
    /// `None` when the row has no usable participant ID
    fn into_sample(self) -> Option<Sample> {
        let participant = RowSanitizer::participant(self.participant.as_deref())?;
        let deviation = [
            self.deviation_right,
            self.deviation_left,
            self.deviation_overall,
        ]
        .iter()
        .any(|d| matches!(d, Some(v) if *v > 0.0))
        .then(|| GazeDeviation {
            right: self.deviation_right.unwrap_or(0.0),
            left: self.deviation_left.unwrap_or(0.0),
            overall: self.deviation_overall.unwrap_or(0.0),
        });

        Some(Sample {
            participant,
            experiment: self.experiment,
            stimulus: self.stimulus,
            category_left: EyeCategory::parse(&self.category_left),
            category_right: EyeCategory::parse(&self.category_right),
            right: GazePoint {
                x: RowSanitizer::coordinate(self.right_x.as_deref()),
                y: RowSanitizer::coordinate(self.right_y.as_deref()),
            },
            left: GazePoint {
                x: RowSanitizer::coordinate(self.left_x.as_deref()),
                y: RowSanitizer::coordinate(self.left_y.as_deref()),
            },
            recording_time_ms: RowSanitizer::timestamp(self.recording_time.as_deref()),
            normalized_time_ms: None,
            stimulus_time_ms: self.stimulus_time.filter(|t| t.is_finite()),
            duration_ms: self.duration.filter(|d| d.is_finite()),
            snapped_time: self
                .snapped_time
                .filter(|t| t.is_finite())
                .map(|t| t.round() as i64),
            deviation,
        })
    }
}

/// Participant row as written, in header order
#[derive(Debug, Serialize)]
struct ParticipantRowOut<'a> {
    participant: ParticipantId,
    experiment: &'a str,
    stimulus: &'a str,
    category_left: &'a str,
    category_right: &'a str,
    right_x: String,
    right_y: String,
    left_x: String,
    left_y: String,
    recording_time: f64,
    stimulus_time: Option<f64>,
    duration: Option<f64>,
    snapped_time: Option<i64>,
    deviation_right: f64,
    deviation_left: f64,
    deviation_overall: f64,
}

impl<'a> From<&'a Sample> for ParticipantRowOut<'a> {
    fn from(sample: &'a Sample) -> Self {
        // Unset deviations are written as 0, the value downstream readers expect
        let deviation = sample.deviation.unwrap_or_default();
        Self {
            participant: sample.participant,
            experiment: &sample.experiment,
            stimulus: &sample.stimulus,
            category_left: sample.category_left.as_str(),
            category_right: sample.category_right.as_str(),
            right_x: coordinate_cell(sample.right.x),
            right_y: coordinate_cell(sample.right.y),
            left_x: coordinate_cell(sample.left.x),
            left_y: coordinate_cell(sample.left.y),
            recording_time: sample.timeline_ms(),
            stimulus_time: sample.stimulus_time_ms,
            duration: sample.duration_ms,
            snapped_time: sample.snapped_time,
            deviation_right: deviation.right,
            deviation_left: deviation.left,
            deviation_overall: deviation.overall,
        }
    }
}

/// Missing coordinates are written as `NaN` so they are not read back as 0
fn coordinate_cell(value: Option<f64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "NaN".to_string(),
    }
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(reader)
}

fn write_table<W, T, I>(writer: W, header: &[&str], rows: I) -> Result<(), GazeError>
where
    W: Write,
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read one participant record set, checking the required columns first
pub fn read_participant_records<R: Read>(
    reader: R,
    record_set: &str,
) -> Result<Vec<Sample>, GazeError> {
    let mut reader = csv_reader(reader);
    let headers = reader.headers()?.clone();
    RowSanitizer::check_columns(headers.iter(), &PARTICIPANT_COLUMNS, record_set)?;

    let mut samples = Vec::new();
    for (idx, row) in reader.deserialize::<ParticipantRow>().enumerate() {
        match row?.into_sample() {
            Some(sample) => samples.push(sample),
            None => warn!(record_set, row = idx + 1, "row without participant ID skipped"),
        }
    }
    Ok(samples)
}

/// Write one participant record set with all derived columns
pub fn write_participant_records<W: Write>(writer: W, samples: &[Sample]) -> Result<(), GazeError> {
    write_table(
        writer,
        &PARTICIPANT_HEADER,
        samples.iter().map(ParticipantRowOut::from),
    )
}

pub fn read_reference_path<R: Read>(reader: R, stimulus: &str) -> Result<ReferencePath, GazeError> {
    let mut reader = csv_reader(reader);
    let mut path = ReferencePath::new(stimulus);
    for point in reader.deserialize::<ReferencePoint>() {
        let point = point?;
        path.points.insert(point.snapped_time, point);
    }
    Ok(path)
}

pub fn write_reference_path<W: Write>(writer: W, path: &ReferencePath) -> Result<(), GazeError> {
    write_table(writer, &REFERENCE_PATH_HEADER, path.points.values())
}

/// Record store over a directory of CSV files
#[derive(Debug, Clone)]
pub struct CsvRecordStore {
    root: PathBuf,
}

impl CsvRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn participants_dir(&self) -> PathBuf {
        self.root.join(PARTICIPANTS_DIR)
    }

    pub fn participant_file(&self, participant: ParticipantId) -> PathBuf {
        self.participants_dir()
            .join(format!("Participant_{participant}.csv"))
    }

    pub fn reference_path_file(&self, stimulus: &str) -> PathBuf {
        let name: String = stimulus
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.root
            .join(AVERAGE_PATHS_DIR)
            .join(format!("AveragePath_{name}.csv"))
    }

    pub fn experiment_statistics_file(&self) -> PathBuf {
        self.root.join(EXPERIMENT_STATISTICS_FILE)
    }

    pub fn participant_averages_file(&self) -> PathBuf {
        self.root.join(PARTICIPANT_AVERAGES_FILE)
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    fn create(path: &Path) -> Result<File, GazeError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(File::create(path)?)
    }
}

/// `Participant_<id>.csv` → `<id>`
fn participant_id_from_file_name(name: &str) -> Option<ParticipantId> {
    name.strip_prefix("Participant_")?
        .strip_suffix(".csv")?
        .parse()
        .ok()
}

impl RecordStore for CsvRecordStore {
    fn participant_ids(&self) -> Result<Vec<ParticipantId>, GazeError> {
        let dir = self.participants_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            match participant_id_from_file_name(&name) {
                Some(id) => ids.push(id),
                None => debug!(file = %name, "ignoring non-participant file"),
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn load_participant(&self, participant: ParticipantId) -> Result<Vec<Sample>, GazeError> {
        let path = self.participant_file(participant);
        if !path.exists() {
            return Err(GazeError::NotFound(path.display().to_string()));
        }
        read_participant_records(File::open(&path)?, &format!("Participant_{participant}"))
    }

    fn save_participant(
        &mut self,
        participant: ParticipantId,
        samples: &[Sample],
    ) -> Result<(), GazeError> {
        let file = Self::create(&self.participant_file(participant))?;
        write_participant_records(file, samples)
    }

    fn load_reference_path(&self, stimulus: &str) -> Result<Option<ReferencePath>, GazeError> {
        let path = self.reference_path_file(stimulus);
        if !path.exists() {
            return Ok(None);
        }
        read_reference_path(File::open(&path)?, stimulus).map(Some)
    }

    fn save_reference_path(&mut self, path: &ReferencePath) -> Result<(), GazeError> {
        let file = Self::create(&self.reference_path_file(&path.stimulus))?;
        write_reference_path(file, path)
    }

    fn save_experiment_statistics(
        &mut self,
        rows: &[ExperimentStatisticsRow],
    ) -> Result<(), GazeError> {
        let file = Self::create(&self.experiment_statistics_file())?;
        write_table(file, &EXPERIMENT_STATISTICS_HEADER, rows)
    }

    fn save_participant_summaries(
        &mut self,
        summaries: &[ParticipantSummary],
    ) -> Result<(), GazeError> {
        let file = Self::create(&self.participant_averages_file())?;
        write_table(file, &PARTICIPANT_SUMMARY_HEADER, summaries)
    }

    fn load_participant_classes(&self) -> Result<Vec<ParticipantClass>, GazeError> {
        let path = self.metadata_file();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv_reader(File::open(&path)?);
        let mut classes = Vec::new();
        for class in reader.deserialize::<ParticipantClass>() {
            classes.push(class?);
        }
        Ok(classes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PARTICIPANT_101: &str = "\
Participant,Experiment,Stimulus,Category Left,Category Right,Point of Regard Right X [px],Point of Regard Right Y [px],Point of Regard Left X [px],Point of Regard Left Y [px],RecordingTime [ms]
101,1,StimA,Fixation,Fixation,100,200,110,210,5000
101,1,StimA,Saccade,Fixation,,400,-,410,5030
";

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("gazepath-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_read_raw_participant_rows() {
        let samples = read_participant_records(PARTICIPANT_101.as_bytes(), "Participant_101").unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].participant, 101);
        assert_eq!(samples[0].experiment, "1");
        assert_eq!(samples[0].right, GazePoint::new(100.0, 200.0));
        assert_eq!(samples[1].category_left, EyeCategory::Saccade);
        // Empty cell filled with 0, unreadable cell missing
        assert_eq!(samples[1].right.x, Some(0.0));
        assert_eq!(samples[1].left.x, None);
        assert_eq!(samples[1].snapped_time, None);
        assert_eq!(samples[1].deviation, None);
    }

    #[test]
    fn test_empty_time_and_participant_cells() {
        let data = "\
Participant,Experiment,Stimulus,Category Left,Category Right,Point of Regard Right X [px],Point of Regard Right Y [px],Point of Regard Left X [px],Point of Regard Left Y [px],RecordingTime [ms],SnappedTime,Duration
101,1,StimA,Fixation,Fixation,100,200,110,210,,NaN,NaN
,1,StimA,Fixation,Fixation,100,200,110,210,5020,,
101,1,StimA,Fixation,Fixation,100,200,110,210,5040,40,20
";
        let samples = read_participant_records(data.as_bytes(), "Participant_101").unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].recording_time_ms, 0.0);
        assert_eq!(samples[0].snapped_time, None);
        assert_eq!(samples[0].duration_ms, None);
        assert_eq!(samples[1].recording_time_ms, 5040.0);
        assert_eq!(samples[1].snapped_time, Some(40));
    }

    #[test]
    fn test_missing_columns_rejected() {
        let data = "Participant,Experiment,Stimulus,Category Left,Category Right\n202,2,StimB,Saccade,Fixation\n";
        let err = read_participant_records(data.as_bytes(), "Participant_202").unwrap_err();
        assert!(matches!(err, GazeError::MissingSchema { .. }));
        assert!(err.is_local());
    }

    #[test]
    fn test_empty_record_set_rejected() {
        let err = read_participant_records("".as_bytes(), "Participant_999").unwrap_err();
        assert!(matches!(err, GazeError::MissingSchema { .. }));
    }

    #[test]
    fn test_participant_rows_survive_write_and_read() {
        let mut samples = read_participant_records(PARTICIPANT_101.as_bytes(), "Participant_101").unwrap();
        samples[0].normalized_time_ms = Some(0.0);
        samples[0].stimulus_time_ms = Some(0.0);
        samples[0].duration_ms = Some(30.0);
        samples[0].snapped_time = Some(0);
        samples[0].deviation = Some(GazeDeviation {
            right: 3.0,
            left: 4.0,
            overall: 3.5,
        });

        let mut buffer = Vec::new();
        write_participant_records(&mut buffer, &samples).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), PARTICIPANT_HEADER.join(","));
        assert!(lines
            .next()
            .unwrap()
            .starts_with("101,1,StimA,Fixation,Fixation,100,200,110,210,"));
        assert!(lines.next().unwrap().contains(",NaN,"));

        let loaded = read_participant_records(buffer.as_slice(), "Participant_101").unwrap();
        assert_eq!(loaded[0].snapped_time, Some(0));
        assert_eq!(loaded[0].deviation, samples[0].deviation);
        assert_eq!(loaded[0].recording_time_ms, 0.0);
        assert_eq!(loaded[1].left.x, None);
        assert_eq!(loaded[1].deviation, None);
    }

    #[test]
    fn test_reference_path_file() {
        let mut path = ReferencePath::new("StimA");
        path.points.insert(
            20,
            ReferencePoint {
                snapped_time: 20,
                avg_right_x: Some(150.0),
                avg_right_y: Some(250.5),
                avg_left_x: None,
                avg_left_y: Some(1.0),
            },
        );

        let mut buffer = Vec::new();
        write_reference_path(&mut buffer, &path).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "SnappedTime,Avg Right X,Avg Right Y,Avg Left X,Avg Left Y"
        );
        assert!(lines.next().unwrap().starts_with("20,150"));

        let loaded = read_reference_path(buffer.as_slice(), "StimA").unwrap();
        assert_eq!(loaded, path);
    }

    #[test]
    fn test_store_directory_layout() {
        let root = temp_root();
        let mut store = CsvRecordStore::new(&root);
        assert!(store.participant_ids().unwrap().is_empty());

        let samples = read_participant_records(PARTICIPANT_101.as_bytes(), "Participant_101").unwrap();
        store.save_participant(101, &samples).unwrap();
        fs::write(store.participants_dir().join("Participant_unidentified.csv"), "").unwrap();

        assert_eq!(store.participant_ids().unwrap(), vec![101]);
        assert_eq!(store.load_participant(101).unwrap().len(), 2);
        assert!(store.load_reference_path("StimA").unwrap().is_none());
        assert!(store.load_participant_classes().unwrap().is_empty());

        fs::write(
            store.metadata_file(),
            "ParticipantID,Class,Avg_Gaze_Deviation\n101,ASD,10\n999,TD,0\n",
        )
        .unwrap();
        let classes = store.load_participant_classes().unwrap();
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].class, "ASD");

        fs::remove_dir_all(&root).unwrap();
    }
}
