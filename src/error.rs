use thiserror::Error;

/// Errors raised by the wish engine.
#[derive(Debug, Error)]
pub enum GachaError {
    #[error("invalid banner configuration: {0}")]
    Configuration(String),
    #[error("value out of range: {0}")]
    DomainRange(String),
    #[error("failed to read config '{path}': {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("failed to export results: {0}")]
    Export(#[source] serde_json::Error),
    #[error("worker task failed: {0}")]
    Worker(String),
    #[error("simulation cancelled after {completed} trials")]
    Cancelled { completed: usize },
}

pub type Result<T> = std::result::Result<T, GachaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_and_parse_failures_read_differently() {
        let parse = serde_json::from_str::<u32>("nope").unwrap_err();
        let export = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(GachaError::from(parse).to_string().starts_with("failed to parse config"));
        assert!(GachaError::Export(export)
            .to_string()
            .starts_with("failed to export results"));
    }
}
