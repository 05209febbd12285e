//! CSV export of candidate sites.
//!
//! The detector's output is streamed into the file row by row; the
//! advisory stage later rewrites the same file with its text filled in.

use crate::error::{PipelineError, Result};
use crate::models::{Candidate, CandidateRow};
use csv::{ReaderBuilder, WriterBuilder};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Column names of the candidate file, in order.
pub const HEADER: [&str; 6] = [
    "longitude",
    "latitude",
    "mean_ndvi",
    "mean_elevation",
    "area_km2",
    "advisory",
];

/// Append-only writer for the candidate file.
pub struct CandidateWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: usize,
}

impl CandidateWriter {
    /// Create (or truncate) `path` and write the header row.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| export_error(path, e))?;
        let mut writer = new_writer(file);
        writer.write_record(HEADER)?;
        writer.flush()?;

        debug!("Created candidate file {}", path.display());

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    /// Append one candidate. The row is flushed immediately so an aborted
    /// run keeps everything found so far.
    pub fn append(&mut self, candidate: &Candidate) -> Result<()> {
        self.writer.serialize(CandidateRow::from(candidate))?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and close, returning the number of rows written.
    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        info!("Wrote {} candidates to {}", self.rows, self.path.display());
        Ok(self.rows)
    }
}

/// Export a whole batch of candidates to a fresh file.
pub fn export_candidates(path: &Path, candidates: &[Candidate]) -> Result<usize> {
    let mut writer = CandidateWriter::create(path)?;
    for candidate in candidates {
        writer.append(candidate)?;
    }
    writer.finish()
}

/// Replace `path` with the given candidates, advisory column included.
///
/// Written to a temporary file in the same directory and renamed over the
/// original, so readers never see a half-written file.
pub fn rewrite_with_advisories(path: &Path, candidates: &[Candidate]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| export_error(path, e))?;
    {
        let mut writer = new_writer(tmp.as_file_mut());
        writer.write_record(HEADER)?;
        for candidate in candidates {
            writer.serialize(CandidateRow::from(candidate))?;
        }
        writer.flush()?;
    }
    tmp.as_file_mut().flush()?;
    tmp.persist(path)
        .map_err(|e| export_error(path, e.error))?;

    info!(
        "Rewrote {} with {} candidates ({} with advice)",
        path.display(),
        candidates.len(),
        candidates.iter().filter(|c| c.advisory.is_some()).count()
    );
    Ok(())
}

/// Read candidate rows back from a file written by this module.
pub fn read_rows(path: &Path) -> Result<Vec<CandidateRow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.iter().ne(HEADER.iter().copied()) {
        return Err(PipelineError::Export(format!(
            "unexpected header in {}: {:?}",
            path.display(),
            headers
        )));
    }

    reader
        .deserialize()
        .map(|row| row.map_err(PipelineError::from))
        .collect()
}

fn new_writer<W: Write>(inner: W) -> csv::Writer<W> {
    WriterBuilder::new().has_headers(false).from_writer(inner)
}

fn export_error(path: &Path, err: std::io::Error) -> PipelineError {
    PipelineError::Export(format!("{}: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BandStats;
    use crate::platform::tests::tile_at;

    fn candidate(col: usize, row: usize, ndvi: f64, elevation: f64) -> Candidate {
        let stats = |mean: f64| BandStats {
            mean,
            min: mean - 1.0,
            max: mean + 1.0,
            count: 10,
        };
        let tile = tile_at(col, row);
        Candidate {
            area_km2: tile.area_km2(),
            tile,
            ndvi: stats(ndvi),
            elevation: stats(elevation),
            baseline_elevation: elevation - 4.0,
            deviation_m: 4.0,
            advisory: None,
        }
    }

    #[test]
    fn test_header_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site_advice.csv");
        assert_eq!(export_candidates(&path, &[]).unwrap(), 0);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.trim_end(),
            "longitude,latitude,mean_ndvi,mean_elevation,area_km2,advisory"
        );
        assert!(read_rows(&path).unwrap().is_empty());
    }

    #[test]
    fn test_export_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site_advice.csv");
        let candidates = vec![
            candidate(0, 0, 0.123456789, 201.75),
            candidate(3, 7, -0.05, 88.0),
        ];

        let mut writer = CandidateWriter::create(&path).unwrap();
        writer.append(&candidates[0]).unwrap();
        // Rows are on disk before the writer is finished.
        assert_eq!(read_rows(&path).unwrap().len(), 1);
        writer.append(&candidates[1]).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        for (row, c) in rows.iter().zip(&candidates) {
            let (lon, lat) = c.tile.lower_left();
            assert!((row.longitude - lon).abs() < 1e-9);
            assert!((row.latitude - lat).abs() < 1e-9);
            assert!((row.mean_ndvi - c.ndvi.mean).abs() < 1e-9);
            assert!((row.mean_elevation - c.elevation.mean).abs() < 1e-9);
            assert!((row.area_km2 - c.area_km2).abs() < 1e-6);
            assert_eq!(row.advisory, "");
        }
    }

    #[test]
    fn test_rewrite_fills_advisory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site_advice.csv");
        let mut candidates = vec![candidate(0, 0, 0.1, 100.0), candidate(0, 1, 0.2, 120.0)];
        export_candidates(&path, &candidates).unwrap();

        candidates[1].advisory = Some("Rating: 7/10, \"raised\" platform,\nworth a visit".to_string());
        rewrite_with_advisories(&path, &candidates).unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].advisory, "");
        assert_eq!(
            rows[1].advisory,
            "Rating: 7/10, \"raised\" platform,\nworth a visit"
        );
    }

    #[test]
    fn test_read_rejects_foreign_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.csv");
        std::fs::write(&path, "geometry,score\n{},1.0\n").unwrap();
        assert!(matches!(read_rows(&path), Err(PipelineError::Export(_))));
    }
}
