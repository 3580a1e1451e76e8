use crate::error::MigrateError;

/// Exit code reported for a successful run.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code reported for any failed run.
pub const EXIT_FAILURE: i32 = -1;

/// Outcome of a single migration run.
///
/// A run is binary: either every pending script committed, or nothing did.
#[derive(Debug)]
pub struct MigrationResult {
    applied: Vec<String>,
    error: Option<MigrateError>,
}

impl MigrationResult {
    /// A committed run that applied `applied`, in order.
    pub fn success(applied: Vec<String>) -> Self {
        Self {
            applied,
            error: None,
        }
    }

    /// A failed run. Nothing from it persisted.
    pub fn failure(error: MigrateError) -> Self {
        Self {
            applied: Vec::new(),
            error: Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// The triggering error, present iff the run failed.
    pub fn error(&self) -> Option<&MigrateError> {
        self.error.as_ref()
    }

    /// Scripts committed by this run.
    pub fn applied(&self) -> &[String] {
        &self.applied
    }

    /// `0` on success, `-1` on failure.
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        }
    }

    pub fn into_result(self) -> crate::Result<Vec<String>> {
        match self.error {
            None => Ok(self.applied),
            Some(e) => Err(e),
        }
    }
}

impl From<crate::Result<Vec<String>>> for MigrationResult {
    fn from(result: crate::Result<Vec<String>>) -> Self {
        match result {
            Ok(applied) => Self::success(applied),
            Err(e) => Self::failure(e),
        }
    }
}
