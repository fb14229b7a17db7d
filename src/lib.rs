pub mod catalog;
pub mod config;
pub mod db;
pub mod lists;
pub mod model;
pub mod paging;
pub mod refresh;
pub mod repository;
pub mod session;
