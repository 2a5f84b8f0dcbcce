//! Error taxonomy for the collection pipeline
//!
//! Failures are split by blast radius: `CollectError` ends the current cycle
//! early, `TransformError` is confined to a single node within a page. The
//! collection loop swallows both kinds at the cycle boundary so the next
//! scheduled cycle always runs.

use thiserror::Error;

/// A failure that ends the current collection cycle.
#[derive(Debug, Error)]
pub enum CollectError {
    /// A page request against the cluster API failed.
    #[error("node page fetch failed: {0}")]
    Fetch(#[source] anyhow::Error),

    /// A downstream emission failed.
    #[error("emit to '{tag}' failed: {source}")]
    Emit {
        tag: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A failure confined to one node of a page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// A field the record set cannot be built without was absent.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
}
