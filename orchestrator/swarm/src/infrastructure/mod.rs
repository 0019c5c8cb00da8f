// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod repositories;

pub use repositories::{InMemorySwarmRepository, JsonSwarmRepository};
