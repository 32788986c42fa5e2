// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod model;
pub mod manager;
pub(crate) mod ingest;

pub use manager::{SessionHandle, SessionManager};
pub use model::{ParseSession, SessionStatus};
