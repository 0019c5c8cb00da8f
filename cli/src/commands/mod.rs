// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the codeswarm CLI

pub mod backend;
pub mod config;
pub mod swarm;

pub use self::backend::ServeArgs;
pub use self::config::ConfigCommand;
pub use self::swarm::SwarmCommand;
