//! Per-run directories and file names

use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;

/// Scratch and output locations owned by a single run.
/// Every run gets its own id, so runs never share files.
#[derive(Debug, Clone)]
pub struct RunWorkspace {
    pub run_id: String,
    pub root: PathBuf,
    pub audio_dir: PathBuf,
    pub images_dir: PathBuf,
    pub output_dir: PathBuf,
    pub metadata_dir: PathBuf,
}

impl RunWorkspace {
    /// Create the workspace for a new run from the configured directories
    pub fn create(config: &AppConfig) -> Result<Self> {
        Self::create_in(
            Path::new(&config.work_dir),
            Path::new(&config.default_output_dir),
            Path::new(&config.metadata_dir),
        )
    }

    /// Create `<work_dir>/run_<YYYYmmdd_HHMMSS>` (suffixed when that second is taken)
    /// along with its audio/ and images/ folders, the output dir and the metadata dir.
    pub fn create_in(work_dir: &Path, output_dir: &Path, metadata_dir: &Path) -> Result<Self> {
        fs::create_dir_all(work_dir)
            .with_context(|| format!("Failed to create work dir {}", work_dir.display()))?;

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let (run_id, root) = claim_run_dir(work_dir, &stamp)?;

        let audio_dir = root.join("audio");
        let images_dir = root.join("images");
        for dir in [audio_dir.as_path(), images_dir.as_path(), output_dir, metadata_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }

        log::info!("Run {} workspace at {}", run_id, root.display());

        Ok(Self {
            run_id,
            root,
            audio_dir,
            images_dir,
            output_dir: output_dir.to_path_buf(),
            metadata_dir: metadata_dir.to_path_buf(),
        })
    }

    /// `video_<run id>.mp4` in the output dir
    pub fn default_output_path(&self) -> PathBuf {
        self.output_dir.join(format!("video_{}.mp4", self.run_id))
    }

    /// Merged voice track
    pub fn track_path(&self) -> PathBuf {
        self.root.join("dialogue_track.wav")
    }

    /// Dialogue text kept with the run so it can be re-rendered
    pub fn dialogue_path(&self) -> PathBuf {
        self.root.join("dialogue.txt")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.metadata_dir.join(format!("run_{}.json", self.run_id))
    }
}

/// Atomically claim a fresh run directory, adding `_2`, `_3`... if needed
fn claim_run_dir(work_dir: &Path, stamp: &str) -> Result<(String, PathBuf)> {
    let mut attempt = 1u32;
    loop {
        let run_id = if attempt == 1 {
            stamp.to_string()
        } else {
            format!("{}_{}", stamp, attempt)
        };
        let root = work_dir.join(format!("run_{}", run_id));

        match fs::create_dir(&root) {
            Ok(()) => return Ok((run_id, root)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create {}", root.display()))
            }
        }
    }
}
