use serde::{Deserialize, Serialize};

/// An item with information from the driver attached, usually the location of
/// the declaration it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithInfo<I, T> {
    /// Additional information about the item provided by the driver.
    pub info: I,

    /// The item itself.
    pub item: T,
}
