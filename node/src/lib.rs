// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod clock;
pub mod files;
pub mod store;
pub mod session;
pub mod query;
pub mod api;
pub mod server;
