use avalia_common::backend::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("config error: {0}")]
    Config(String),

    #[error("criterion not found: {0}")]
    UnknownCriterion(i64),

    #[error("analysis rejected by backend: {0}")]
    AnalysisRejected(String),
}
