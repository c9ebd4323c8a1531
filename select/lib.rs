#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod config;
pub mod data;
pub mod features;
pub mod grid;
pub mod model;
pub mod report;
pub mod search;
pub mod solver;
pub mod sparsity;
pub mod split;
pub mod table;
pub mod workflow;
