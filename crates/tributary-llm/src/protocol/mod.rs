//! Wire format types for vendor API protocols
//!
//! Each module contains pure serde structs matching one vendor's JSON API.
//! These types are only used at the boundary and never leave the adapters.

pub mod anthropic;
pub mod coze;
pub mod dashscope;
pub mod dify;
pub mod fastgpt;
pub mod google;
pub mod minimax;
pub mod openai;
pub mod spark;
pub mod tiangong;
pub mod wenxin;
