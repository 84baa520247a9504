use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// No fallback identity for the heavy compute resource could be loaded.
    /// Fatal; raised only after the resource slot has been cleaned up.
    #[error("Resource exhausted: {0}")]
    ResourceExhaustion(String),

    /// Every stage-1 analysis branch failed; there is nothing to synthesize.
    #[error("No surviving stage-1 results: {0}")]
    NoSurvivors(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
