//! JSON文档键值存储
//!
//! 把磁盘上的单个JSON文件当作可变的键值存储使用，提供创建、读取、更新、删除操作，
//! 调用方无需自己管理文件句柄、解析与序列化。每次操作都会完整读写整个文件，
//! 适合配置文件规模的文档。

pub mod model;
pub mod utils;

// 重新导出主要类型
pub use model::document::{DocError, JsonDocument};
pub use model::nested::{
    find_nested_value, find_nested_value_with, set_nested_value, set_nested_value_with, SearchMode,
};
pub use model::options::{DocumentOptions, RefreshPolicy, TextEncoding};
