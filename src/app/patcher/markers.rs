pub const INSTALL_CONFLICT_MARKER: &str = "INSTALL_FAILED_UPDATE_INCOMPATIBLE";
pub const FINISHED_MARKER: &str = "Finished";
pub const UNMATCHED_MARKER: &str = "Unmatched";

/// Sentinels in patcher output that drive the build relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMarker {
    /// A previous install with another signature blocks the new one.
    InstallConflict,
    Finished,
    /// The patcher rejected the requested patch set.
    Unmatched,
}

impl BuildMarker {
    /// First match wins: conflict, then finished, then unmatched.
    pub fn detect(line: &str) -> Option<Self> {
        if line.contains(INSTALL_CONFLICT_MARKER) {
            Some(BuildMarker::InstallConflict)
        } else if line.contains(FINISHED_MARKER) {
            Some(BuildMarker::Finished)
        } else if line.contains(UNMATCHED_MARKER) {
            Some(BuildMarker::Unmatched)
        } else {
            None
        }
    }
}
