//! Ingestion pipeline for Argentine financial documents: bank and card
//! statements go in, normalized, categorized transactions come out.
//!
//! The entry point is [`Pipeline::process_document`]; everything else is
//! a stage it orchestrates. Host applications supply the database
//! connection, optional enhanced-extraction and exchange-rate
//! collaborators, and the uploaded bytes.

pub mod categorizer;
pub mod classifier;
pub mod content;
pub mod currency;
pub mod db;
pub mod dedup;
pub mod error;
pub mod escalation;
pub mod extractor;
pub mod locale;
pub mod models;
pub mod pipeline;
pub mod profiles;
pub mod quota;
pub mod settings;

pub use currency::RateSource;
pub use error::{Result, ResumenError};
pub use escalation::EnhancedExtractor;
pub use models::{
    Bank, DocType, DocumentClassification, ExtractionMethod, ExtractionResult, ParsedContent,
    SourceDocument, TransactionCandidate, TransactionKind,
};
pub use pipeline::{Pipeline, ProcessOutcome, ProcessStatus};
pub use settings::Settings;
