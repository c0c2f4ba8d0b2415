//! Export plugins for flowsift

pub mod jsonl;

pub use jsonl::{JsonlExporter, JsonlExporterConfig};
