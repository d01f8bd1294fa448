//! # docsync-typesense
//!
//! HTTP index client for the Typesense search engine.

pub mod client;

pub use client::{TypesenseClient, TypesenseConfig};
