// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes API access for the resource kinds the migration workflow touches.

pub mod client;

pub use client::ResourceClient;
