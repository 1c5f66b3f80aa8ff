pub mod buckets;
pub mod predicates;
pub mod quarter_map;
pub mod result_shaper;
pub mod temporal_filters;
