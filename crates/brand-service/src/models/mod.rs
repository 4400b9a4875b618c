//! 品牌服务数据模型

mod campaign;

pub use campaign::*;
