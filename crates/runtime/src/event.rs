//! The fixed catalogue of runtime events.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::value::Value;

/// Name accepted by subscriptions to mean every kind at once.
pub const ALL: &str = "all";

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum EventKind {
    MethodEntry,
    MethodExit,
    Alloc,
    PropRead,
    PropWrite,
    PropOpWrite,
    PropUpdate,
    BeforeCall,
    AfterCall,
    FunctionDefined,
}

/// One observed operation with its parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    MethodEntry { name: String, arguments: Value, location: String },
    MethodExit { name: String, value: Value, location: String },
    Alloc { object: Value, tag: String, location: String },
    PropRead { object: Value, key: Value, location: String },
    PropWrite { object: Value, key: Value, value: Value, location: String },
    PropOpWrite {
        object: Value,
        key: Value,
        current: Value,
        operand: Value,
        operator: String,
        location: String,
    },
    PropUpdate { object: Value, key: Value, operator: String, location: String },
    BeforeCall { receiver: Value, callee: Value, arguments: Value, location: String },
    AfterCall { receiver: Value, callee: Value, arguments: Value, location: String },
    FunctionDefined { function: Value, location: String },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MethodEntry { .. } => EventKind::MethodEntry,
            Self::MethodExit { .. } => EventKind::MethodExit,
            Self::Alloc { .. } => EventKind::Alloc,
            Self::PropRead { .. } => EventKind::PropRead,
            Self::PropWrite { .. } => EventKind::PropWrite,
            Self::PropOpWrite { .. } => EventKind::PropOpWrite,
            Self::PropUpdate { .. } => EventKind::PropUpdate,
            Self::BeforeCall { .. } => EventKind::BeforeCall,
            Self::AfterCall { .. } => EventKind::AfterCall,
            Self::FunctionDefined { .. } => EventKind::FunctionDefined,
        }
    }

    pub fn location(&self) -> &str {
        match self {
            Self::MethodEntry { location, .. }
            | Self::MethodExit { location, .. }
            | Self::Alloc { location, .. }
            | Self::PropRead { location, .. }
            | Self::PropWrite { location, .. }
            | Self::PropOpWrite { location, .. }
            | Self::PropUpdate { location, .. }
            | Self::BeforeCall { location, .. }
            | Self::AfterCall { location, .. }
            | Self::FunctionDefined { location, .. } => location,
        }
    }

    /// The parameters in the order a script listener receives them after the kind name.
    pub fn values(&self) -> Vec<Value> {
        let location = Value::from(self.location());
        match self.clone() {
            Self::MethodEntry { name, arguments, .. } => vec![name.into(), arguments, location],
            Self::MethodExit { name, value, .. } => vec![name.into(), value, location],
            Self::Alloc { object, tag, .. } => vec![object, tag.into(), location],
            Self::PropRead { object, key, .. } => vec![object, key, location],
            Self::PropWrite { object, key, value, .. } => vec![object, key, value, location],
            Self::PropOpWrite { object, key, current, operand, operator, .. } => {
                vec![object, key, current, operand, operator.into(), location]
            }
            Self::PropUpdate { object, key, operator, .. } => {
                vec![object, key, operator.into(), location]
            }
            Self::BeforeCall { receiver, callee, arguments, .. }
            | Self::AfterCall { receiver, callee, arguments, .. } => {
                vec![receiver, callee, arguments, location]
            }
            Self::FunctionDefined { function, .. } => vec![function, location],
        }
    }
}
