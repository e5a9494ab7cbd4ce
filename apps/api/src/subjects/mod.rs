// Subject reconciliation: merges each extraction pass into the persisted
// subjects of a meeting without losing ids that curated artifacts point at.

pub mod handlers;
pub mod reconcile;
