// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Plugins shipped with the crate.

pub mod mask;
pub mod row_batch;

use crate::plugin::PluginDescriptor;

/// Descriptors registered by [`crate::plugin::Registry::with_builtins`].
pub static BUILTINS: &[&PluginDescriptor] = &[&mask::DESCRIPTOR, &row_batch::DESCRIPTOR];
