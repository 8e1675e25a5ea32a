//! patacquire - patent document acquisition from Google Patents.
//!
//! Drives a browser against the search frontend to extract patent
//! identifiers for a topic, then downloads each patent as PDF (with HTML
//! fallback), keeping a durable per-identifier download record.

pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod ident;
pub mod render;
pub mod run;
pub mod search;
pub mod storage;
