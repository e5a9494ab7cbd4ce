//! Match engine: decides which users hear about which subjects, and why.
//!
//! Pure and synchronous. Callers load subjects and preferences, hand them in,
//! and persist whatever comes out.

pub mod engine;
pub mod geo;
pub mod importance;

pub use engine::{match_subjects, MatchCandidate, SubjectForMatching, SubjectMatch, UserMatches};
pub use geo::GeoPoint;
pub use importance::{
    index_overrides, ImportanceOverride, ProximityImportance, ProximityRadii, TopicImportance,
};
