pub mod config;
pub mod duck;
pub mod load;
pub mod pipeline;
pub mod query;

#[cfg(test)]
mod fixtures;
