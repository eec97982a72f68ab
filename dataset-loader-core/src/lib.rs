#![doc = "dataset-loader-core: core logic library for dataset-loader."]

//! This crate holds the pipeline that takes a zipped dataset archive (items, annotation
//! sidecars, ontology, precomputed feature vectors) and loads it into a remote
//! dataset-management service.
//! The service itself is only reached through [`contract::DatasetClient`]; the HTTP
//! implementation lives in the CLI crate.
//!
//! # Usage
//! Build a [`download::ArchiveDownloader`], hand it and a client to
//! [`synchronise::load_unannotated`].

pub mod annotation;
pub mod config;
pub mod contract;
pub mod download;
pub mod feature_set;
pub mod layout;
pub mod synchronise;
