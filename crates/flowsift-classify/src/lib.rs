//! Flow classification for flowsift
//!
//! Walks decoded exchanges and decides what gets written:
//!
//! - **rules**: host, path and content-type matching
//! - **classifier**: projection of exchanges and socket messages onto events
//! - **processor**: the record loop driving a source into an export sink

pub mod classifier;
pub mod processor;
pub mod rules;

pub use classifier::FlowClassifier;
pub use processor::{FlowProcessor, ProcessError, RunOutcome, RunStats};
pub use rules::FilterRules;
