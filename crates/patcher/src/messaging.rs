//! Control-plane messages, JSON-tagged by `action`.

use serde::{Deserialize, Serialize};

use crate::classify::ModificationKind;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Message {
    EnableSelection,
    DisableSelection,
    ApplyModification {
        selector: String,
        value: String,
        kind: ModificationKind,
    },
    GetCurrentValue {
        selector: String,
    },
    DetectKind {
        selector: String,
    },
    /// Page to control surface, unsolicited.
    TargetSelected {
        selector: String,
        value: String,
    },
    /// Background to every page, recurring.
    RefreshAll,
    /// Page to control surface when a pick could not be resolved.
    SelectionFailed {
        reason: String,
    },
}

impl Message {
    pub fn action(&self) -> &'static str {
        match self {
            Self::EnableSelection => "enableSelection",
            Self::DisableSelection => "disableSelection",
            Self::ApplyModification { .. } => "applyModification",
            Self::GetCurrentValue { .. } => "getCurrentValue",
            Self::DetectKind { .. } => "detectKind",
            Self::TargetSelected { .. } => "targetSelected",
            Self::RefreshAll => "refreshAll",
            Self::SelectionFailed { .. } => "selectionFailed",
        }
    }
}

/// Reply to a request. The shape depends on the action that was asked.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum Response {
    Success { success: bool },
    Value { value: Option<String> },
    Kind { kind: Option<ModificationKind> },
}

impl Response {
    pub fn success(&self) -> bool {
        matches!(self, Self::Success { success: true })
    }

    pub fn into_value(self) -> Option<String> {
        match self {
            Self::Value { value } => value,
            _ => None,
        }
    }

    pub fn into_kind(self) -> Option<ModificationKind> {
        match self {
            Self::Kind { kind } => kind,
            _ => None,
        }
    }
}
