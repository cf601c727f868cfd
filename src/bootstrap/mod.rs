//! Session bootstrap module
//!
//! Authenticates the test identity once and persists the browser session
//! state that later browser checks reuse.

#![allow(unused_imports)]

mod pattern;
mod runner;
mod state;

pub use pattern::UrlPattern;
pub use runner::{
    refresh_persisted, BootstrapConfig, BootstrapError, BootstrapOutcome, BootstrapState,
    SessionBootstrap,
};
pub use state::{SessionStore, StateError, StorageState};
