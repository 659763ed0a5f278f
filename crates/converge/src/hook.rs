//! Lifecycle hooks around an apply run

use crate::error::{ConsolidatedErrors, Error};
use crate::resource::Document;
use anyhow::Result;

/// Observer and extension point for [`crate::Worker::apply`]
///
/// Hooks run on the coordinating thread in registration order. Every
/// method has a no-op default, so implementors only override what they need.
pub trait Hook {
    /// Runs before any driver is built; an error aborts the run
    fn pre_apply(&mut self) -> Result<()> {
        Ok(())
    }

    /// Template of the data wanted after a successful run
    ///
    /// String leaves may hold queries; they are resolved against a document
    /// keyed by resource name holding every resource's output.
    fn data_queries(&self) -> Document {
        Document::new()
    }

    /// Runs after every resource succeeded, with the resolved
    /// [`Hook::data_queries`] template
    fn post_apply(&mut self, _data: &Document) -> Result<()> {
        Ok(())
    }

    /// A fatal error ended the run
    fn on_error(&mut self, _error: &Error) {}

    /// One or more resources failed
    fn on_consolidated_errors(&mut self, _errors: &ConsolidatedErrors) {}
}
