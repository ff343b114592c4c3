#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pure catalog logic for the mirror pipeline.
//!
//! Everything in this crate is a total function over plain data: the
//! frequency cadence model, the fresh-vs-previous catalog reconciler, the
//! selection filter, and the folder-key/column naming rules. No I/O, no
//! error types — callers that talk to the network or the object store live
//! in the `wds`, `store`, and `ingest` packages.

pub mod filter;
pub mod frequency;
pub mod naming;
pub mod reconcile;
