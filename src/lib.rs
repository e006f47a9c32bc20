//! loadout — addon and plugin package manager for game client
//! installations.
//!
//! The [`engine::Manager`] is the entry point: point it at a managed
//! root and it installs, updates and removes scriptable addons
//! (`addons/<name>/<name>.lua`) and native plugins (`plugins/<name>.dll`)
//! sourced from git repositories or GitHub releases, tracking everything
//! in a JSON ledger so shared files can be conflict-checked on install
//! and reference-counted on removal.
//!
//! Every install/update operation returns an [`outcome::InstallOutcome`];
//! callers branch on it and re-invoke with selections filled in when a
//! checkpoint variant asks for one.

pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod git;
pub mod github;
pub mod outcome;
pub mod tracker;
pub mod util;
