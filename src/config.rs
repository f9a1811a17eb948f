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

//! Engine policy knobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What an outbound application may do to on-hand quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockPolicy {
    /// Reject OUT and TRANSFER applications that exceed on-hand quantity.
    #[default]
    ForbidNegative,
    /// Permit backorders; quantities may go below zero.
    AllowNegative,
}

/// Engine configuration.
///
/// # Example
///
/// ```
/// use stock_ledger_rs::{EngineConfig, StockPolicy};
/// use std::time::Duration;
///
/// let config = EngineConfig::default().with_lock_timeout(Duration::from_millis(250));
/// assert_eq!(config.stock_policy, StockPolicy::ForbidNegative);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Maximum time to wait for a stock lock. `None` waits indefinitely.
    #[serde(default)]
    pub lock_timeout: Option<Duration>,
    #[serde(default)]
    pub stock_policy: StockPolicy,
}

impl EngineConfig {
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn with_stock_policy(mut self, policy: StockPolicy) -> Self {
        self.stock_policy = policy;
        self
    }

    pub(crate) fn allows_negative(&self) -> bool {
        self.stock_policy == StockPolicy::AllowNegative
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_forbids_negative_and_waits_forever() {
        let config = EngineConfig::default();
        assert_eq!(config.lock_timeout, None);
        assert!(!config.allows_negative());
    }

    #[test]
    fn deserializes_with_missing_fields() {
        let config: EngineConfig = serde_json::from_str(r#"{"stock_policy":"allow_negative"}"#).unwrap();
        assert!(config.allows_negative());
        assert_eq!(config.lock_timeout, None);
    }
}
