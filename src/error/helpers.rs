use super::PipelineError;

/// Extension trait for convenient error conversion
pub trait ErrorExt<T> {
    /// Convert to a configuration error with the given code
    fn to_config_error(self, code: u16, message: impl Into<String>) -> Result<T, PipelineError>;

    /// Convert to a workflow error attributed to a stage
    fn to_workflow_error(
        self,
        code: u16,
        message: impl Into<String>,
        stage: Option<String>,
    ) -> Result<T, PipelineError>;
}

impl<T, E> ErrorExt<T> for Result<T, E>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn to_config_error(self, code: u16, message: impl Into<String>) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::config_with_code(code, message).with_source(e))
    }

    fn to_workflow_error(
        self,
        code: u16,
        message: impl Into<String>,
        stage: Option<String>,
    ) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::workflow(code, message, stage).with_source(e))
    }
}
