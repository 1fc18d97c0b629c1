#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("record not found")]
    NotFound,

    #[error("a user with this email already exists")]
    EmailTaken,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("you must be logged in to do this")]
    NotLoggedIn,

    #[error("image analysis failed: {0}")]
    Classifier(String),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}
