use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Groups of rewrite rules that can be switched on and off.
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
pub enum Category {
    /// `esprof$onMethodEntry` at the top of every function body.
    MethodEntry,
    /// `esprof$onMethodExit` around returns and at the end of every function body.
    MethodExit,
    /// Array, object, `new` and function-expression allocations.
    Alloc,
    PropRead,
    /// Plain, compound and update writes to properties.
    PropWrite,
    /// Direct calls and method calls.
    Call,
    FunctionDefined,
}

/// Configuration of one instrumentation run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstrumentConfig {
    /// Name of the source unit, used in location strings.
    pub script_name: String,
    /// Enabled categories.
    pub categories: BTreeSet<Category>,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self { script_name: "<anonymous>".to_string(), categories: Category::iter().collect() }
    }
}

impl InstrumentConfig {
    /// A configuration with every category disabled. Instrumenting with it leaves the program
    /// unchanged.
    pub fn none() -> Self {
        Self { categories: BTreeSet::new(), ..Default::default() }
    }

    /// Set the script name. If not set, `<anonymous>` is used.
    pub fn with_script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = name.into();
        self
    }

    /// Replace the set of enabled categories.
    pub fn with_categories(mut self, categories: impl IntoIterator<Item = Category>) -> Self {
        self.categories = categories.into_iter().collect();
        self
    }

    pub fn enable(mut self, category: Category) -> Self {
        self.categories.insert(category);
        self
    }

    pub fn disable(mut self, category: Category) -> Self {
        self.categories.remove(&category);
        self
    }

    pub fn is_enabled(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }
}
