//! pkgpress-lib: build a package recipe in a clean chroot and publish the result
//!
//! This crate provides the stages of the build-and-publish pipeline:
//! - `Workspace`: private scratch directory for one run
//! - `PackageSource`: resolves an identifier to a recipe URL and clones it
//! - `Sandbox`: provisions and refreshes the chroot collection
//! - `Builder`: runs the chrooted build and enumerates its artifacts
//! - `Publisher`: places artifacts into per-architecture repository buckets
//! - `Pipeline`: ties the stages together

pub mod build;
pub mod config;
pub mod consts;
pub mod fetch;
pub mod lock;
pub mod pipeline;
pub mod process;
pub mod publish;
pub mod sandbox;
pub mod util;
pub mod workspace;
