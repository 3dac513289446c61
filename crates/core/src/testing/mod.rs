//! Testing utilities and mock implementations.
//!
//! Mocks for the converter and resource sampler seams, so batches can be
//! exercised end to end without chdman, maxcso or real system pressure.
//!
//! # Example
//!
//! ```rust,ignore
//! use romcrush_core::testing::{FixedSampler, MockConverter};
//!
//! let converter = MockConverter::new();
//! converter.set_conversion_duration(Duration::from_millis(20)).await;
//! converter.set_failure("Broken.cue", MockFailure::Exit).await;
//!
//! let sampler = FixedSampler::constant(20.0, 40.0);
//! ```

mod fixed_sampler;
mod mock_converter;

pub use fixed_sampler::FixedSampler;
pub use mock_converter::{MockConverter, MockFailure, RecordedConversion};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    /// Writes a CUE sheet referencing `tracks` and creates each track file.
    pub fn cue_with_tracks(dir: &Path, stem: &str, tracks: &[&str]) -> PathBuf {
        let mut sheet = String::new();
        for (i, track) in tracks.iter().enumerate() {
            sheet.push_str(&format!("FILE \"{}\" BINARY\n", track));
            sheet.push_str(&format!("  TRACK {:02} MODE2/2352\n", i + 1));
            sheet.push_str("    INDEX 01 00:00:00\n");
            std::fs::write(dir.join(track), vec![0u8; 2352 * 4]).expect("write track");
        }
        let path = dir.join(format!("{}.cue", stem));
        std::fs::write(&path, sheet).expect("write cue");
        path
    }

    /// Writes a sheet referencing `referenced` while the track on disk is named `actual`.
    pub fn cue_with_renamed_track(dir: &Path, stem: &str, referenced: &str, actual: &str) -> PathBuf {
        let path = cue_with_tracks(dir, stem, &[referenced]);
        std::fs::rename(dir.join(referenced), dir.join(actual)).expect("rename track");
        path
    }

    /// Writes a single-track CUE/BIN pair.
    pub fn cue_game(dir: &Path, stem: &str) -> PathBuf {
        cue_with_tracks(dir, stem, &[&format!("{}.bin", stem)])
    }

    /// Writes a small ISO file.
    pub fn iso_game(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![0u8; 4096]).expect("write iso");
        path
    }
}
