pub mod assistant;
pub mod builder;
pub mod config;
pub mod dataset;
pub mod design;
pub mod domain;
pub mod ebayes;
pub mod engine;
pub mod error;
pub mod formula;
pub mod gateway;
pub mod geo;
pub mod linear_model;
pub mod matrix;
pub mod normalize;
pub mod output;
pub mod report;
pub mod soft;
pub mod store;
pub mod top_table;
