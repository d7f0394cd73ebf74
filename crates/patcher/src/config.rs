//! Runtime configuration for the patching engine.
//!
//! Timings, the acknowledgment colour and the recognised test attributes can be
//! loaded from environment variables or constructed programmatically.

use core::time::Duration;
use std::env;

/// Class added to the element under the pointer while picking.
pub const HOVER_CLASS: &str = "dom-patcher-hover";

/// Class left on the element that was picked last.
pub const SELECTED_CLASS: &str = "dom-patcher-selected";

/// Classes the engine itself puts on page elements; never part of a selector.
pub const ENGINE_CLASSES: [&str; 2] = [HOVER_CLASS, SELECTED_CLASS];

const DEFAULT_RECHECK_MS: u64 = 60_000;
const DEFAULT_RESTORE_DELAY_MS: u64 = 1_000;
const DEFAULT_ACK_MS: u64 = 1_000;
const DEFAULT_REFRESH_MS: u64 = 60_000;
const DEFAULT_HIGHLIGHT: &str = "#fff3a0";
const DEFAULT_TEST_ATTRIBUTES: [&str; 3] = ["data-testid", "data-test", "data-cy"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatcherConfig {
    /// Period of the timer-driven reconciliation pass
    pub recheck_interval_ms: u64,
    /// Delay between page start and the restore pass
    pub restore_delay_ms: u64,
    /// How long the acknowledgment highlight stays on a written element
    pub ack_ms: u64,
    /// Period of the background `refreshAll` fan-out
    pub refresh_interval_ms: u64,
    /// Inline `background-color` used for the acknowledgment
    pub highlight_color: String,
    /// Test attributes the selector resolver recognises, in priority order
    pub test_attributes: Vec<String>,
}

impl Default for PatcherConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_RECHECK_MS,
            DEFAULT_RESTORE_DELAY_MS,
            DEFAULT_ACK_MS,
            DEFAULT_REFRESH_MS,
        )
    }
}

impl PatcherConfig {
    /// Construct a configuration with explicit timings and default colour and attributes.
    ///
    /// Both periods are clamped to at least 1ms.
    #[must_use]
    pub fn new(
        recheck_interval_ms: u64,
        restore_delay_ms: u64,
        ack_ms: u64,
        refresh_interval_ms: u64,
    ) -> Self {
        Self {
            recheck_interval_ms: recheck_interval_ms.max(1),
            restore_delay_ms,
            ack_ms,
            refresh_interval_ms: refresh_interval_ms.max(1),
            highlight_color: DEFAULT_HIGHLIGHT.to_owned(),
            test_attributes: DEFAULT_TEST_ATTRIBUTES.map(str::to_owned).to_vec(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `PATCHER_RECHECK_INTERVAL_MS` (default: 60000)
    /// - `PATCHER_RESTORE_DELAY_MS` (default: 1000)
    /// - `PATCHER_ACK_MS` (default: 1000)
    /// - `PATCHER_REFRESH_INTERVAL_MS` (default: 60000)
    /// - `PATCHER_HIGHLIGHT_COLOR` (default: `#fff3a0`)
    /// - `PATCHER_TEST_ATTRIBUTES`: comma separated (default: `data-testid,data-test,data-cy`)
    #[must_use]
    pub fn from_env() -> Self {
        let millis = |name: &str, default: u64| {
            env::var(name)
                .ok()
                .and_then(|val| val.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        let mut config = Self::new(
            millis("PATCHER_RECHECK_INTERVAL_MS", DEFAULT_RECHECK_MS),
            millis("PATCHER_RESTORE_DELAY_MS", DEFAULT_RESTORE_DELAY_MS),
            millis("PATCHER_ACK_MS", DEFAULT_ACK_MS),
            millis("PATCHER_REFRESH_INTERVAL_MS", DEFAULT_REFRESH_MS),
        );
        if let Some(color) = env::var("PATCHER_HIGHLIGHT_COLOR")
            .ok()
            .map(|val| val.trim().to_owned())
            .filter(|val| !val.is_empty())
        {
            config.highlight_color = color;
        }
        if let Ok(list) = env::var("PATCHER_TEST_ATTRIBUTES") {
            config.test_attributes = parse_attribute_list(&list);
        }
        config
    }

    pub const fn recheck_interval(&self) -> Duration {
        Duration::from_millis(self.recheck_interval_ms)
    }

    pub const fn restore_delay(&self) -> Duration {
        Duration::from_millis(self.restore_delay_ms)
    }

    pub const fn ack_duration(&self) -> Duration {
        Duration::from_millis(self.ack_ms)
    }

    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

fn parse_attribute_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}
