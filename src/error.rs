use std::path::PathBuf;

/// Typed per-item failures.  None of these abort a stage; they are turned
/// into [`Outcome`](crate::Outcome)s and collected into the run report.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// An expected input file or directory is absent.
    #[error("missing input: {}", .0.display())]
    MissingInput(PathBuf),

    /// No counterpart was found for a file when pairing two layers.
    #[error("no match for {file} in {}", .dir.display())]
    NoMatch { file: String, dir: PathBuf },

    /// A geometry was empty, degenerate or could not be converted.
    #[error("malformed geometry in {context}")]
    MalformedGeometry { context: String },

    /// A layer declares a CRS other than the expected one.
    #[error("CRS mismatch in {}: expected EPSG:{expected}, found EPSG:{found}", .path.display())]
    CrsMismatch { path: PathBuf, expected: u16, found: u16 },

    /// A raster or vector file could not be opened or decoded.
    #[error("failed to decode {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },
}

impl StageError {
    #[inline]
    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Decode { path: path.into(), reason: reason.to_string() }
    }
}
