//! Protocol communication with ground control stations.

pub mod mavlink;
