pub mod apply;
pub mod commands;
pub mod model;
