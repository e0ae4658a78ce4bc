#![doc = "zip-push-core: core pipeline library for zip-push."]

//! This crate contains the upload-and-publish pipeline: it takes an uploaded ZIP
//! archive plus repository metadata, extracts the archive into a private session
//! directory and drives the `git` command-line tool to push it to a remote.
//!
//! # Usage
//! Build a [`config::PipelineConfig`], pick a [`contract::CommandRunner`]
//! (normally [`git::GitCli`]) and call [`publish::publish`].

pub mod archive;
pub mod config;
pub mod contract;
pub mod credentials;
pub mod error;
pub mod git;
pub mod log;
pub mod publish;
pub mod session;
