//! Cache key namespaces. Full keys are built with [`super::fingerprint`].

pub const HOLDERS: &str = "holders";
pub const SWAPS: &str = "swaps";
pub const PAIRS_INFO: &str = "pairs-info";
pub const PAIRS_LIST: &str = "pairs-list";
