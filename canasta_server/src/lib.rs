//! Library surface for the Canasta server binary, split out so integration
//! tests can build a router against mock repositories without going through
//! `main`.

pub mod api;
pub mod config;
pub mod logging;
