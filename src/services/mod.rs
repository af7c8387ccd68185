//! 服务层模块

pub mod generation;
pub mod preferences;
