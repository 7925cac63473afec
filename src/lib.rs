//! Back-office companion for a product pricing service: formula-driven
//! prices, price lists, promotions and the selection/filter logic behind
//! their editors.

pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
