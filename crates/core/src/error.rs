use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),
}
