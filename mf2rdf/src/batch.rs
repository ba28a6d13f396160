//! Parallel processing of independent documents.

use rayon::prelude::*;
use tracing::{info, warn};

use crate::extractor::{Extractor, Report};
use crate::session::Options;
use crate::{Error, process};

/// One document to process: its URI, raw bytes and declared encoding.
#[derive(Clone, Debug)]
pub struct Source {
    pub uri: String,
    pub content: Vec<u8>,
    pub encoding: Option<String>,
}

impl Source {
    pub fn new(uri: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            uri: uri.into(),
            content: content.into(),
            encoding: None,
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }
}

/// Processes every source on the rayon pool.
///
/// Results are in input order; a failed document does not affect the others.
pub fn process_batch(
    sources: &[Source],
    extractors: &[&dyn Extractor],
    options: &Options,
) -> Vec<Result<Report, Error>> {
    let results = sources
        .par_iter()
        .map(|source| {
            process(
                source.content.as_slice(),
                source.encoding.as_deref(),
                &source.uri,
                extractors,
                options.clone(),
            )
            .inspect_err(|err| warn!(uri = %source.uri, %err, "document failed"))
        })
        .collect::<Vec<_>>();

    let failed = results.iter().filter(|r| r.is_err()).count();
    info!(documents = sources.len(), failed, "batch processed");
    results
}
