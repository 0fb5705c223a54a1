//! Display widgets.

pub mod pattern_table;
