#![doc = "notion-catalog-core: pipeline library for notion-catalog."]

//! Fetches products from a Notion database, normalizes them into canonical
//! [`product::Product`]s and renders a selection into a PDF catalog.
//!
//! # Pipeline
//! [`source`] -> [`normalize`] -> [`extract`] (per field) -> caller selection
//! -> [`render`] -> [`compile`] -> [`output`]. [`pipeline`] wires the last
//! three together behind `generate`.
//!
//! The CLI crate only does argument parsing, config loading and logging
//! setup; everything else belongs here.

pub mod compile;
pub mod config;
pub mod contract;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod product;
pub mod render;
pub mod source;

pub use error::{CatalogError, GenerationError, Stage};
pub use product::{CatalogRequest, GeneratedArtifact, Product};
