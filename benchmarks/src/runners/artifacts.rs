//! Per-dataset anomaly-score artifacts (`.npy`).

use ndarray::Array1;
use ndarray_npy::write_npy;
use std::path::{Path, PathBuf};
use tsadbench_core::{Result, TsadError};

/// `<score_dir>/<stem>.npy` for a dataset file name.
pub fn score_artifact_path(score_dir: &Path, file: &str) -> PathBuf {
    score_dir.join(file).with_extension("npy")
}

pub fn write_scores(path: &Path, scores: &Array1<f64>) -> Result<()> {
    write_npy(path, scores)
        .map_err(|e| TsadError::Artifact(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_npy::read_npy;
    use tempfile::TempDir;

    #[test]
    fn test_artifact_path_replaces_extension() {
        let path = score_artifact_path(Path::new("/out/scores"), "001_NAB_id_1.csv");
        assert_eq!(path, PathBuf::from("/out/scores/001_NAB_id_1.npy"));
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = score_artifact_path(dir.path(), "x.csv");
        let scores = Array1::from(vec![0.1, 0.9, 0.3]);
        write_scores(&path, &scores).unwrap();
        assert!(path.exists());
        let back: Array1<f64> = read_npy(&path).unwrap();
        assert_eq!(back, scores);
    }

    #[test]
    fn test_write_into_missing_dir_is_artifact_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("x.npy");
        let err = write_scores(&path, &Array1::from(vec![1.0])).unwrap_err();
        assert!(matches!(err, TsadError::Artifact(_)));
    }
}
