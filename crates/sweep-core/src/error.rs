use thiserror::Error;

pub type Result<T> = std::result::Result<T, SweepError>;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("task index {index} is out of range (valid range: {})", valid_range(.len))]
    OutOfRangeIndex { index: i64, len: usize },

    #[error("invalid array task id '{0}': expected an integer")]
    InvalidTaskId(String),

    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SweepError {
    pub fn invalid_grid(msg: impl Into<String>) -> Self {
        Self::InvalidGrid(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Human-readable inclusive index range for a grid of `len` entries.
pub fn valid_range(len: &usize) -> String {
    if *len == 0 {
        "none, grid is empty".to_string()
    } else {
        format!("[0, {}]", len - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_message_names_valid_range() {
        let err = SweepError::OutOfRangeIndex { index: 80, len: 80 };
        assert_eq!(
            err.to_string(),
            "task index 80 is out of range (valid range: [0, 79])"
        );
    }

    #[test]
    fn empty_grid_range_is_reported() {
        let err = SweepError::OutOfRangeIndex { index: 0, len: 0 };
        assert!(err.to_string().contains("grid is empty"), "{}", err);
    }
}
