use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResumenError {
    /// Fatal for the document: the media type is not one the pipeline
    /// can decode. Everything else degrades in-band instead of erroring.
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ResumenError>;
