// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

pub use database::{Database, IssuedCredential};
pub use state::StateStore;

mod database;
mod state;
