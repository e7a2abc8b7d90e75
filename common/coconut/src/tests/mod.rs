// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0
