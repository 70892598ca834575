//! # tabquota - daily time budgets for browser domains
//!
//! A native-messaging host that enforces per-domain daily time limits across
//! browser tabs and windows.
//!
//! ## Features
//!
//! - **Rules**: one daily budget in minutes per base origin
//! - **Time Accounting**: time of every open tab on a limited domain counts,
//!   including tabs open in parallel
//! - **Enforcement**: tabs of an exhausted domain are redirected to a neutral page
//! - **Daily Reset**: budgets start over at local midnight, including a
//!   catch-up reset when the host starts after a missed midnight
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tabquota::commands::Cli;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Cli::menu().await
//! }
//! ```

pub mod commands;
pub mod db;
pub mod libs;
