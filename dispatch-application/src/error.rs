use dispatch_domain::error::DispatchError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("dispatch: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("validation: {0}")]
    Validation(String),

    #[error("infra: {0}")]
    Infra(String),

    #[error("config: {0}")]
    Config(String),

    #[error("handler not found: {0}")]
    HandlerNotFound(&'static str),

    #[error("handler already registered: command={command}")]
    AlreadyRegisteredCommand { command: &'static str },

    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}
