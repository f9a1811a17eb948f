// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Monotonic reference-number sequences.
//!
//! Each prefix (`MOV-IN`, `MOV-TRF`, `BORR`, ...) has its own counter. The
//! increment happens under the map entry's lock, so concurrent callers never
//! receive the same number.

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct ReferenceSequence {
    counters: DashMap<String, u64>,
}

impl ReferenceSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next number for `prefix`, starting at 1.
    pub fn next(&self, prefix: &str) -> u64 {
        let mut counter = self.counters.entry(prefix.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Returns the next reference formatted as `PREFIX-00001`.
    pub fn next_reference(&self, prefix: &str) -> String {
        format!("{prefix}-{:05}", self.next(prefix))
    }

    /// Last number handed out for `prefix`, if any.
    pub fn current(&self, prefix: &str) -> Option<u64> {
        self.counters.get(prefix).map(|c| *c)
    }
}
