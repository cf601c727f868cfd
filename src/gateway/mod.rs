//! Backend client gateway module
//!
//! Provides the configured handle to the hosted auth and data service.

#![allow(unused_imports)]

mod auth;
mod client;

pub use auth::{AuthSession, AuthUser};
pub use client::{
    BackendGateway, GatewayConfig, GatewayError, RuntimeContext, SelectQuery, PLACEHOLDER_KEY,
    PLACEHOLDER_URL,
};

#[cfg(test)]
pub(crate) use auth::fixtures;
