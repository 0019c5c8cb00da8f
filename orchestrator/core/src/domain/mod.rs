// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Pure types, no I/O.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`protocol`] | `Command`, `CommandEnvelope`, `RouterEvent`, `RequestId` |
//! | [`events`] | `HubMessage`, browser-facing event names |
//! | [`config`] | `BackendConfig` manifest |

pub mod config;
pub mod events;
pub mod protocol;
