// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session Keeper - Wallet Background Session Service
//!
//! This crate owns the lifecycle of a wallet's cached decryption key and keeps
//! a health-checked gateway directory cache fresh, both driven by durable
//! named alarms.
//!
//! ## Modules
//!
//! - `alarms` - Named durable timers and fan-out dispatch
//! - `api` - Loopback control API handlers (Axum)
//! - `background` - Alarm handler wiring and startup tasks
//! - `gateways` - Gateway directory fetch, probe and cache
//! - `session` - Decryption key lifecycle
//! - `storage` - Key-value store (memory and redb)
//! - `wallets` - Saved wallet list and password verification

pub mod alarms;
pub mod api;
pub mod background;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateways;
pub mod session;
pub mod state;
pub mod storage;
pub mod wallets;

#[cfg(test)]
pub(crate) mod testing;
