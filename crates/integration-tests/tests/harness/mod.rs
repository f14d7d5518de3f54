#![allow(dead_code)]

pub mod config;
pub mod mock_spark;
pub mod mock_vendor;
