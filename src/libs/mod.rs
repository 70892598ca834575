//! Core library modules.
//!
//! - **Model**: [`rule`] records and [`accounting`] of time charged against them
//! - **Persistence**: [`store`] (single-writer rule store) and [`config`]
//! - **Engine**: tab event [`handlers`], the periodic [`sweep`], the daily
//!   [`reset`], their [`scheduler`] and the [`engine`] that wires them
//! - **Browser side**: the [`browser`] seam and its [`native_host`] implementation
//! - **CLI support**: [`messages`], [`view`], [`data_storage`]

pub mod accounting;
pub mod browser;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod data_storage;
pub mod engine;
pub mod handlers;
pub mod messages;
pub mod native_host;
pub mod reset;
pub mod rule;
pub mod scheduler;
pub mod store;
pub mod sweep;
pub mod view;
