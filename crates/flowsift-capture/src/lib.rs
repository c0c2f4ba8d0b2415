//! Capture reader for flowsift
//!
//! Turns a mitmproxy flow dump into a lazy stream of [`flowsift_core::Exchange`]
//! records:
//!
//! - **tnetstring**: the serialization format of the dump
//! - **flow**: mapping of flow state onto exchanges
//! - **reader**: the streaming [`FlowReader`]

pub mod flow;
pub mod reader;
pub mod tnetstring;

pub use reader::FlowReader;
