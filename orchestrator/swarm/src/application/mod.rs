// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_processor;
pub mod registry_service;

pub use event_processor::{Effects, EventProcessor};
pub use registry_service::SwarmRegistryService;
