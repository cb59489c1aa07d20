use crate::error::{Result, SweepError};

/// Execution order for a batch. An empty request means the whole grid.
/// Explicit requests are returned untouched: repeats and ordering are the
/// caller's choice, and range checks happen per task.
pub fn resolve_indices(requested: &[i64], grid_len: usize) -> Vec<i64> {
    if requested.is_empty() {
        (0..grid_len as i64).collect()
    } else {
        requested.to_vec()
    }
}

/// Parses a scheduler-provided array task id. A missing or blank value maps
/// to index 0; anything outside the grid is an error.
pub fn resolve_array_index(raw: Option<&str>, grid_len: usize) -> Result<usize> {
    let index = match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => 0,
        Some(s) => s
            .parse::<i64>()
            .map_err(|_| SweepError::InvalidTaskId(s.to_string()))?,
    };
    match usize::try_from(index) {
        Ok(i) if i < grid_len => Ok(i),
        _ => Err(SweepError::OutOfRangeIndex {
            index,
            len: grid_len,
        }),
    }
}
