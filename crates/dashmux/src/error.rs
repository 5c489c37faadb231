use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashError {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("media parameters changed on manifest refresh: {0}")]
    InputChanged(String),

    #[error("access to nested resource denied: {0}")]
    PermissionDenied(String),

    #[error("interrupted")]
    Interrupted,

    #[error("seeking is not supported on this stream")]
    SeekNotSupported,

    #[error("HTTP error: {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("invalid time sync scheme: {0}")]
    InvalidTimingScheme(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    MpdParseError(#[from] dash_mpd::DashMpdError),
}

pub type DashResult<T> = Result<T, DashError>;
