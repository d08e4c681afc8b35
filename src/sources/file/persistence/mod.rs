// SPDX-License-Identifier: Apache-2.0

//! Persistence for saved read positions.

mod json_file;
mod schema;

pub use json_file::{JsonFileDatabase, JsonFilePersister};
pub use schema::{
    PERSISTED_POSITION_VERSION, POSITION_KEY, PersistedPosition, format_persist_name,
};
