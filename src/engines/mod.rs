// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod audio_fetcher;
pub mod chromium_session;
pub mod locator_chain;
pub mod traits;
