// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Common test utilities, mock servers, and mock collaborators for
//! integration tests

pub mod mock_server;
pub mod mocks;
