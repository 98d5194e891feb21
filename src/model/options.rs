//! 文档句柄配置：编码、输出格式、写入策略与元数据刷新策略

use serde::{Deserialize, Serialize};

use crate::model::nested::SearchMode;

/// 文件文本编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextEncoding {
    /// UTF-8，不处理BOM；带BOM的文件会解析失败，应改用 `Utf8Bom`
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    /// 带BOM的UTF-8（写入时输出BOM，读取时去掉BOM）
    #[serde(rename = "utf-8-sig")]
    Utf8Bom,
    /// UTF-16 小端
    #[serde(rename = "utf-16-le")]
    Utf16Le,
}

impl TextEncoding {
    pub fn label(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf8Bom => "utf-8-sig",
            TextEncoding::Utf16Le => "utf-16-le",
        }
    }
}

/// 缓存元数据（exists/size 等）何时重新探测
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshPolicy {
    /// 每个公开操作执行前都重新探测文件系统
    #[default]
    BeforeEachOperation,
    /// 只信任缓存标志，仅在构造、显式refresh与写入后更新
    Cached,
}

/// 文档句柄选项，可从任意serde格式加载，缺省字段取默认值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentOptions {
    pub encoding: TextEncoding,
    /// 是否格式化输出
    pub pretty: bool,
    /// 先写同目录临时文件再rename覆盖目标
    pub atomic_writes: bool,
    pub refresh: RefreshPolicy,
    pub search_mode: SearchMode,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            pretty: true,
            atomic_writes: true,
            refresh: RefreshPolicy::BeforeEachOperation,
            search_mode: SearchMode::Exhaustive,
        }
    }
}

impl DocumentOptions {
    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn atomic_writes(mut self, atomic: bool) -> Self {
        self.atomic_writes = atomic;
        self
    }

    pub fn refresh(mut self, refresh: RefreshPolicy) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn search_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = mode;
        self
    }
}
