// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod channel;
pub mod command_line;
pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod registry;
pub mod replay;
pub mod resolver;
pub mod session;
pub mod test_support;
pub mod tracker;
