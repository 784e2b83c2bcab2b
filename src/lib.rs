//! Offline-first client for the EventHub campus platform.
//!
//! Every view paints the last snapshot from the [`cache`] straight away and
//! revalidates it against the upstream through a [`resource::Resource`].
//! The [`hub`] hands out those views and runs the mutating actions.

pub mod app;
pub mod cache;
pub mod calendar;
pub mod config;
pub mod error;
pub mod hub;
pub mod logging;
pub mod mutation;
pub mod render;
pub mod resource;
