// src/catalog.rs - Dataset navigation: patient -> session -> camera -> segment
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ResolveStep, Result, ViewerError};

pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mkv", "avi", "mov"];
const STATIC_MARKER: &str = "static";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Patient,
    Session,
    Camera,
    Segment,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::Patient, Level::Session, Level::Camera, Level::Segment];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Level::Patient => "Patient",
            Level::Session => "Session",
            Level::Camera => "Camera",
            Level::Segment => "Segment",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label().to_lowercase())
    }
}

/// Recording configuration the cameras are grouped under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Ct,
    Vr,
    FmaAndVr,
}

impl CaptureMode {
    pub const ALL: [CaptureMode; 3] = [CaptureMode::Ct, CaptureMode::Vr, CaptureMode::FmaAndVr];

    pub fn folder_name(self) -> &'static str {
        match self {
            CaptureMode::Ct => "CT",
            CaptureMode::Vr => "VR",
            CaptureMode::FmaAndVr => "FMA_and_VR",
        }
    }
}

/// Cascading selector state. Setting a level clears every deeper level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionPath {
    levels: [Option<String>; 4],
}

impl SelectionPath {
    pub fn get(&self, level: Level) -> Option<&str> {
        self.levels[level.index()].as_deref()
    }

    /// Returns true when the stored value actually changed.
    pub fn set(&mut self, level: Level, value: Option<String>) -> bool {
        if self.levels[level.index()] == value {
            return false;
        }
        self.levels[level.index()] = value;
        for deeper in &mut self.levels[level.index() + 1..] {
            *deeper = None;
        }
        true
    }

    /// A level is only meaningful once everything above it is chosen.
    pub fn is_reachable(&self, level: Level) -> bool {
        self.levels[..level.index()].iter().all(Option::is_some)
    }

    pub fn is_complete(&self) -> bool {
        self.levels.iter().all(Option::is_some)
    }

    pub fn complete(&self) -> Result<Selection> {
        let pick = |level: Level| {
            self.get(level)
                .map(str::to_owned)
                .ok_or(ViewerError::SelectionIncomplete { missing: level })
        };
        Ok(Selection {
            patient: pick(Level::Patient)?,
            session: pick(Level::Session)?,
            camera: pick(Level::Camera)?,
            segment: pick(Level::Segment)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub patient: String,
    pub session: String,
    pub camera: String,
    pub segment: String,
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {} / {} / {}", self.patient, self.session, self.camera, self.segment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAssets {
    pub video: PathBuf,
    pub signal: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    processed_root: PathBuf,
    ready_root: PathBuf,
}

impl Catalog {
    pub fn new(processed_root: impl Into<PathBuf>, ready_root: impl Into<PathBuf>) -> Self {
        Self {
            processed_root: processed_root.into(),
            ready_root: ready_root.into(),
        }
    }

    /// Valid choices for `level` given the levels above it.
    pub fn choices(&self, path: &SelectionPath, level: Level) -> Vec<String> {
        match level {
            Level::Patient => self.patients(),
            Level::Session => path
                .get(Level::Patient)
                .map(|patient| self.sessions(patient))
                .unwrap_or_default(),
            Level::Camera => match (path.get(Level::Patient), path.get(Level::Session)) {
                (Some(patient), Some(session)) => self.cameras(patient, session),
                _ => Vec::new(),
            },
            Level::Segment => match (
                path.get(Level::Patient),
                path.get(Level::Session),
                path.get(Level::Camera),
            ) {
                (Some(patient), Some(session), Some(camera)) => {
                    self.segments(patient, session, camera)
                }
                _ => Vec::new(),
            },
        }
    }

    pub fn patients(&self) -> Vec<String> {
        list_subdirs(&self.processed_root)
    }

    pub fn sessions(&self, patient: &str) -> Vec<String> {
        list_subdirs(&self.processed_root.join(patient))
    }

    pub fn cameras(&self, patient: &str, session: &str) -> Vec<String> {
        let video_root = self.video_root(patient, session);
        let mut cameras: Vec<String> = CaptureMode::ALL
            .iter()
            .flat_map(|mode| list_subdirs(&video_root.join(mode.folder_name())))
            .collect();
        cameras.sort();
        cameras.dedup();
        cameras
    }

    pub fn segments(&self, patient: &str, session: &str, camera: &str) -> Vec<String> {
        let Some(camera_dir) = self.camera_dir(patient, session, camera) else {
            return Vec::new();
        };
        list_subdirs(&camera_dir.join("Segments"))
            .into_iter()
            .filter(|name| !name.to_lowercase().contains(STATIC_MARKER))
            .collect()
    }

    /// The last capture mode holding the camera wins.
    pub fn camera_dir(&self, patient: &str, session: &str, camera: &str) -> Option<PathBuf> {
        let video_root = self.video_root(patient, session);
        CaptureMode::ALL
            .iter()
            .rev()
            .map(|mode| video_root.join(mode.folder_name()).join(camera))
            .find(|dir| dir.is_dir())
    }

    pub fn resolve(&self, selection: &Selection) -> Result<ResolvedAssets> {
        let video = self.resolve_video(selection)?;
        let signal = self.resolve_signal(selection)?;
        tracing::info!(
            "Resolved {}: video {}, IMU {}",
            selection,
            video.display(),
            signal.display()
        );
        Ok(ResolvedAssets { video, signal })
    }

    fn resolve_video(&self, selection: &Selection) -> Result<PathBuf> {
        let camera_dir = self
            .camera_dir(&selection.patient, &selection.session, &selection.camera)
            .ok_or_else(|| ViewerError::PathNotFound {
                step: ResolveStep::Camera,
                path: self
                    .video_root(&selection.patient, &selection.session)
                    .join("*")
                    .join(&selection.camera),
            })?;

        let segment_dir = camera_dir.join("Segments").join(&selection.segment);
        if !segment_dir.is_dir() {
            return Err(ViewerError::PathNotFound {
                step: ResolveStep::SegmentDirectory,
                path: segment_dir,
            });
        }

        let mut candidates: Vec<PathBuf> = std::fs::read_dir(&segment_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_video_extension(path))
            .collect();
        candidates.sort();

        candidates
            .into_iter()
            .next()
            .ok_or_else(|| ViewerError::NoMatchingFile {
                step: ResolveStep::VideoFile,
                dir: segment_dir,
                pattern: format!("*.{{{}}}", VIDEO_EXTENSIONS.join(",")),
            })
    }

    fn resolve_signal(&self, selection: &Selection) -> Result<PathBuf> {
        let patient_dir = self.ready_root.join(&selection.patient);
        if !patient_dir.is_dir() {
            return Err(ViewerError::PathNotFound {
                step: ResolveStep::SignalPatientDirectory,
                path: patient_dir,
            });
        }

        let session_folders = list_subdirs(&patient_dir);
        let session_folder = match_session_folder(&session_folders, &selection.session)
            .ok_or_else(|| ViewerError::NoMatchingFile {
                step: ResolveStep::SessionPrefix,
                dir: patient_dir.clone(),
                pattern: format!("{}*", selection.session),
            })?;

        let signal = patient_dir
            .join(session_folder)
            .join(&selection.segment)
            .join("ViewerAssets")
            .join(format!("{}.csv", selection.camera));

        if !signal.is_file() {
            return Err(ViewerError::PathNotFound {
                step: ResolveStep::SignalFile,
                path: signal,
            });
        }
        Ok(signal)
    }

    fn video_root(&self, patient: &str, session: &str) -> PathBuf {
        self.processed_root.join(patient).join(session).join("Video")
    }
}

/// Session folders carry a date suffix, so the selection matches by prefix.
/// A folder continuing with a separator beats one continuing with more of
/// the name ("Session1_..." over "Session10_...").
pub fn match_session_folder<'a>(folders: &'a [String], session: &str) -> Option<&'a str> {
    let mut prefixed = folders.iter().filter(|folder| folder.starts_with(session));
    let first = prefixed.clone().next()?;
    let delimited = prefixed.find(|folder| {
        folder[session.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric())
    });
    Some(delimited.unwrap_or(first).as_str())
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Sorted directory names; a missing directory just means no choices yet.
fn list_subdirs(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_owned))
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TempTree;

    const SEGMENT_DIR: &str = "processed/P01/Session1/Video/VR/Cam1/Segments/Seg01";

    fn selection() -> Selection {
        Selection {
            patient: "P01".into(),
            session: "Session1".into(),
            camera: "Cam1".into(),
            segment: "Seg01".into(),
        }
    }

    fn catalog(tree: &TempTree) -> Catalog {
        Catalog::new(tree.path().join("processed"), tree.path().join("ready"))
    }

    fn full_tree() -> TempTree {
        let tree = TempTree::new();
        tree.file(&format!("{SEGMENT_DIR}/clip.MP4"), "");
        tree.file(&format!("{SEGMENT_DIR}/notes.txt"), "");
        tree.file(
            "ready/P01/Session1_20250203/Seg01/ViewerAssets/Cam1.csv",
            "t,AccelX\n0,1\n",
        );
        tree
    }

    #[test]
    fn setting_a_level_clears_deeper_levels() {
        let mut path = SelectionPath::default();
        path.set(Level::Patient, Some("P01".into()));
        path.set(Level::Session, Some("Session1".into()));
        path.set(Level::Camera, Some("Cam1".into()));
        path.set(Level::Segment, Some("Seg01".into()));
        assert!(path.is_complete());

        assert!(path.set(Level::Session, Some("Session2".into())));
        assert_eq!(path.get(Level::Patient), Some("P01"));
        assert_eq!(path.get(Level::Session), Some("Session2"));
        assert_eq!(path.get(Level::Camera), None);
        assert_eq!(path.get(Level::Segment), None);
        assert!(!path.is_reachable(Level::Segment));
    }

    #[test]
    fn setting_the_same_value_is_not_a_change() {
        let mut path = SelectionPath::default();
        path.set(Level::Patient, Some("P01".into()));
        path.set(Level::Session, Some("Session1".into()));
        assert!(!path.set(Level::Patient, Some("P01".into())));
        assert_eq!(path.get(Level::Session), Some("Session1"));
    }

    #[test]
    fn incomplete_selection_names_first_missing_level() {
        let mut path = SelectionPath::default();
        path.set(Level::Patient, Some("P01".into()));
        match path.complete() {
            Err(ViewerError::SelectionIncomplete { missing }) => assert_eq!(missing, Level::Session),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lists_levels_sorted_and_skips_static_segments() {
        let tree = TempTree::new();
        tree.dir("processed/P02");
        tree.dir("processed/P01/Session2");
        tree.dir("processed/P01/Session1/Video/CT/CamB");
        tree.dir("processed/P01/Session1/Video/FMA_and_VR/CamA");
        tree.dir("processed/P01/Session1/Video/VR/CamB");
        tree.dir("processed/P01/Session1/Video/VR/CamB/Segments/Seg02");
        tree.dir("processed/P01/Session1/Video/VR/CamB/Segments/Seg01");
        tree.dir("processed/P01/Session1/Video/VR/CamB/Segments/Static_Pose");
        tree.file("processed/P01/stray.txt", "");
        let catalog = catalog(&tree);

        assert_eq!(catalog.patients(), vec!["P01", "P02"]);
        assert_eq!(catalog.sessions("P01"), vec!["Session1", "Session2"]);
        assert_eq!(catalog.cameras("P01", "Session1"), vec!["CamA", "CamB"]);
        assert_eq!(catalog.segments("P01", "Session1", "CamB"), vec!["Seg01", "Seg02"]);
    }

    #[test]
    fn missing_directories_yield_no_choices() {
        let tree = TempTree::new();
        let catalog = catalog(&tree);
        assert!(catalog.patients().is_empty());
        assert!(catalog.sessions("P09").is_empty());
        assert!(catalog.cameras("P09", "Session1").is_empty());
        assert!(catalog.segments("P09", "Session1", "Cam1").is_empty());

        let mut path = SelectionPath::default();
        path.set(Level::Patient, Some("P09".into()));
        assert!(catalog.choices(&path, Level::Camera).is_empty());
    }

    #[test]
    fn camera_in_several_modes_resolves_to_the_last_mode() {
        let tree = TempTree::new();
        tree.dir("processed/P01/Session1/Video/CT/Cam1");
        tree.dir("processed/P01/Session1/Video/FMA_and_VR/Cam1");
        let dir = catalog(&tree).camera_dir("P01", "Session1", "Cam1").unwrap();
        assert!(dir.ends_with("FMA_and_VR/Cam1"));
    }

    #[test]
    fn resolves_video_and_signal_paths() {
        let tree = full_tree();
        let assets = catalog(&tree).resolve(&selection()).unwrap();
        assert_eq!(assets.video.file_name().unwrap(), "clip.MP4");
        assert!(assets
            .signal
            .ends_with("Session1_20250203/Seg01/ViewerAssets/Cam1.csv"));
    }

    #[test]
    fn segment_without_video_is_no_matching_file() {
        let tree = TempTree::new();
        tree.file(&format!("{SEGMENT_DIR}/readme.md"), "");
        let err = catalog(&tree).resolve(&selection()).unwrap_err();
        assert!(matches!(
            err,
            ViewerError::NoMatchingFile {
                step: ResolveStep::VideoFile,
                ..
            }
        ));
    }

    #[test]
    fn missing_segment_directory_is_path_not_found() {
        let tree = TempTree::new();
        tree.dir("processed/P01/Session1/Video/VR/Cam1/Segments");
        let err = catalog(&tree).resolve(&selection()).unwrap_err();
        assert!(matches!(
            err,
            ViewerError::PathNotFound {
                step: ResolveStep::SegmentDirectory,
                ..
            }
        ));
    }

    #[test]
    fn missing_session_prefix_and_csv_are_distinguished() {
        let tree = TempTree::new();
        tree.file(&format!("{SEGMENT_DIR}/clip.mp4"), "");
        tree.dir("ready/P01/Session2_20250203/Seg01/ViewerAssets");
        let err = catalog(&tree).resolve(&selection()).unwrap_err();
        assert!(matches!(
            err,
            ViewerError::NoMatchingFile {
                step: ResolveStep::SessionPrefix,
                ..
            }
        ));

        tree.dir("ready/P01/Session1_20250203/Seg01/ViewerAssets");
        let err = catalog(&tree).resolve(&selection()).unwrap_err();
        assert!(matches!(
            err,
            ViewerError::PathNotFound {
                step: ResolveStep::SignalFile,
                ..
            }
        ));
    }

    #[test]
    fn session_prefix_matching() {
        let folders: Vec<String> = ["Session10_20250301", "Session1_20250203", "Session2_20250203"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(match_session_folder(&folders, "Session1"), Some("Session1_20250203"));
        assert_eq!(match_session_folder(&folders, "Session2"), Some("Session2_20250203"));
        assert_eq!(match_session_folder(&folders, "Session3"), None);

        let only_longer = vec!["Session10_20250301".to_string()];
        assert_eq!(match_session_folder(&only_longer, "Session1"), Some("Session10_20250301"));
    }
}
