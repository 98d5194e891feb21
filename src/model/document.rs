//! JsonDocument：把磁盘上的一个JSON文件当作可变的键值存储
//!
//! 句柄只缓存文件元数据（是否存在、大小、文件名），不缓存内容。
//! 每个操作都会完整地读取、解析、修改、序列化并写回整个文件，
//! 不做加锁，多个句柄或进程同时修改同一文件会互相覆盖。

use std::path::{Path, PathBuf};

use jsonpath_rust::{JsonPath, query::queryable::Queryable}; // 提供 query/query_only_path/reference_mut 等扩展
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::nested::{find_nested_value_with, set_nested_value_with};
use crate::model::options::{DocumentOptions, RefreshPolicy, TextEncoding};
use crate::utils::fs::{probe_file, read_json_file, remove_json_file, write_json_file, FileProbe};

#[derive(Error, Debug)]
pub enum DocError {
    #[error("文件不存在: {}，请先创建文件", .path.display())]
    NotFound { path: PathBuf },
    #[error("文件已存在: {}，请先删除文件", .path.display())]
    AlreadyExists { path: PathBuf },
    #[error("键不存在: {key}")]
    KeyNotFound { key: String },
    #[error("JSON解析失败: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("JSON序列化失败: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("类型不匹配: 需要{expected}，实际为{found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("{encoding}解码失败: {reason}")]
    Decode {
        encoding: &'static str,
        reason: String,
    },
    #[error("JSONPath错误: {0}")]
    JsonPath(String),
    #[error("IO失败: {0}")]
    Io(#[from] std::io::Error),
}

/// 绑定到单个文件路径的文档句柄
#[derive(Debug, Clone)]
pub struct JsonDocument {
    path: PathBuf,
    options: DocumentOptions,
    exists: bool,
    display_name: String,
    is_empty: bool,
    size_bytes: u64,
}

/// 修改闭包的结果：是否需要写回文件
enum Change<R> {
    Write(R),
    Skip(R),
}

fn kind_name(v: &Value) -> &'static str {
    match v {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "bool",
        Value::Null => "null",
    }
}

fn as_object(v: &Value) -> Result<&Map<String, Value>, DocError> {
    v.as_object().ok_or(DocError::TypeMismatch {
        expected: "object",
        found: kind_name(v),
    })
}

fn as_object_mut(v: &mut Value) -> Result<&mut Map<String, Value>, DocError> {
    let found = kind_name(v);
    v.as_object_mut().ok_or(DocError::TypeMismatch {
        expected: "object",
        found,
    })
}

impl JsonDocument {
    /// 以默认选项（UTF-8）打开句柄；文件不存在只记录警告
    pub fn new(path: impl AsRef<Path>) -> Result<Self, DocError> {
        Self::with_options(path, DocumentOptions::default())
    }

    pub fn with_options(path: impl AsRef<Path>, options: DocumentOptions) -> Result<Self, DocError> {
        let mut doc = Self {
            path: path.as_ref().to_path_buf(),
            options,
            exists: false,
            display_name: String::new(),
            is_empty: true,
            size_bytes: 0,
        };
        doc.refresh()?;
        if !doc.exists {
            tracing::warn!("{} 不存在，需要先调用 create()", doc.path.display());
        }
        Ok(doc)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encoding(&self) -> TextEncoding {
        self.options.encoding
    }

    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }

    /// 上次刷新时文件是否存在（快照，不是实时状态）
    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// 文件不存在或大小为0
    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    // ------------------------------ 生命周期 ------------------------------ //

    /// 重新探测文件系统并更新缓存的元数据
    pub fn refresh(&mut self) -> Result<(), DocError> {
        let FileProbe { exists, size_bytes } = probe_file(&self.path)?;
        self.exists = exists;
        self.size_bytes = size_bytes;
        self.is_empty = size_bytes == 0;
        self.display_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(())
    }

    /// 创建内容为 `{}` 的文件
    pub fn create(&mut self) -> Result<(), DocError> {
        self.sync_metadata()?;
        if self.exists {
            return Err(DocError::AlreadyExists {
                path: self.path.clone(),
            });
        }
        self.store(&Value::Object(Map::new()))?;
        tracing::info!("已创建JSON文件: {}", self.path.display());
        Ok(())
    }

    /// 删除文件
    pub fn delete(&mut self) -> Result<(), DocError> {
        self.ensure_present()?;
        remove_json_file(&self.path)?;
        self.refresh()?;
        tracing::info!("已删除JSON文件: {}", self.path.display());
        Ok(())
    }

    // ------------------------------ 基础读写 ------------------------------ //

    /// 读取并解析整个文件
    pub fn read_all(&mut self) -> Result<Value, DocError> {
        self.ensure_present()?;
        self.load()
    }

    /// 用 `tree` 覆盖整个文件；文件不存在时会被创建
    pub fn write_all(&mut self, tree: &Value) -> Result<(), DocError> {
        self.store(tree)
    }

    /// 读取整个文件并反序列化为 `T`
    pub fn read_as<T: DeserializeOwned>(&mut self) -> Result<T, DocError> {
        let data = self.read_all()?;
        serde_json::from_value(data).map_err(DocError::Parse)
    }

    /// 把 `value` 序列化后覆盖整个文件
    pub fn write_as<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), DocError> {
        let tree = serde_json::to_value(value).map_err(DocError::Serialize)?;
        self.write_all(&tree)
    }

    // ------------------------------ 存在性判断 ------------------------------ //

    /// 顶层对象是否包含 `key`
    pub fn key_exists(&mut self, key: &str) -> Result<bool, DocError> {
        self.inspect(|data| data.contains_key(key))
    }

    /// 顶层对象的某个直接值是否与 `value` 深度相等
    pub fn value_exists(&mut self, value: &Value) -> Result<bool, DocError> {
        self.inspect(|data| data.values().any(|v| v == value))
    }

    // ------------------------------ 按键读写 ------------------------------ //

    /// `key` 为 None 时返回整个文档；否则返回顶层键对应的值，键不存在时返回 None
    pub fn read(&mut self, key: Option<&str>) -> Result<Option<Value>, DocError> {
        match key {
            None => self.read_all().map(Some),
            Some(key) => self.inspect(|data| data.get(key).cloned()),
        }
    }

    /// 设置顶层 `key`；`key` 为 None 时以当前条目数（字符串形式）作为新键追加
    pub fn write(&mut self, key: Option<&str>, value: Value) -> Result<(), DocError> {
        self.mutate(|data| {
            let key = match key {
                Some(key) => key.to_owned(),
                None => data.len().to_string(),
            };
            data.insert(key, value);
            Ok(())
        })
    }

    /// 删除顶层条目，键不存在时返回 [`DocError::KeyNotFound`] 且不写回
    pub fn delete_key(&mut self, key: &str) -> Result<(), DocError> {
        self.mutate(|data| {
            data.shift_remove(key)
                .map(|_| ())
                .ok_or_else(|| DocError::KeyNotFound { key: key.to_owned() })
        })
    }

    /// 把顶层 `key` 的值置为 null，键本身保留
    pub fn delete_value(&mut self, key: &str) -> Result<(), DocError> {
        self.mutate(|data| {
            data.insert(key.to_owned(), Value::Null);
            Ok(())
        })
    }

    /// 重命名顶层键：先移除再插入，新键排在末尾；已存在的 `new_key` 会被覆盖
    pub fn change_key(&mut self, old_key: &str, new_key: &str) -> Result<(), DocError> {
        self.mutate(|data| {
            let value = data.shift_remove(old_key).ok_or_else(|| DocError::KeyNotFound {
                key: old_key.to_owned(),
            })?;
            data.insert(new_key.to_owned(), value);
            Ok(())
        })
    }

    /// 设置顶层 `key` 的值；`new_value` 为 None 时写入 null。
    /// 显式传入的 `0`、`""`、`false` 会按原样写入
    pub fn change_value(&mut self, key: &str, new_value: Option<Value>) -> Result<(), DocError> {
        self.mutate(|data| {
            data.insert(key.to_owned(), new_value.unwrap_or(Value::Null));
            Ok(())
        })
    }

    /// 在整个文档中搜索 `key` 并改写第一个匹配项（策略见 [`SearchMode`](crate::SearchMode)）。
    /// 未找到时记录警告、不写回并返回 false
    pub fn change_nested_value(&mut self, key: &str, value: Value) -> Result<bool, DocError> {
        let mode = self.options.search_mode;
        let found = self.transact(|tree| {
            Ok(if set_nested_value_with(mode, tree, key, value) {
                Change::Write(true)
            } else {
                Change::Skip(false)
            })
        })?;
        if !found {
            tracing::warn!("未找到键: {} ({})", key, self.path.display());
        }
        Ok(found)
    }

    /// 在整个文档中搜索 `key`，返回第一个匹配项的值
    pub fn read_nested(&mut self, key: &str) -> Result<Option<Value>, DocError> {
        self.ensure_present()?;
        let data = self.load()?;
        Ok(find_nested_value_with(self.options.search_mode, &data, key).cloned())
    }

    // ------------------------------ JSONPath ------------------------------ //

    /// 返回所有匹配 JSONPath 的节点
    pub fn query(&mut self, json_path: &str) -> Result<Vec<Value>, DocError> {
        self.ensure_present()?;
        let dom = self.load()?;
        let hits: Vec<&Value> = dom
            .query(json_path)
            .map_err(|e| DocError::JsonPath(e.to_string()))?;
        Ok(hits.into_iter().cloned().collect())
    }

    /// 把第一个匹配 JSONPath 的节点替换为 `value`，未匹配时文件保持不变
    pub fn update_at_path(&mut self, json_path: &str, value: Value) -> Result<(), DocError> {
        self.transact(|dom| {
            let paths: Vec<String> = dom
                .query_only_path(json_path)
                .map_err(|e| DocError::JsonPath(e.to_string()))?;
            let Some(p) = paths.into_iter().next() else {
                return Err(DocError::JsonPath(format!("未匹配到可更新路径: {}", json_path)));
            };
            let Some(slot) = dom.reference_mut(&p) else {
                return Err(DocError::JsonPath(format!("路径不可更新: {}", p)));
            };
            *slot = value;
            Ok(Change::Write(()))
        })
    }

    // ------------------------------ 列举 ------------------------------ //

    /// 把文件内容重置为 `{}`
    pub fn clear_file(&mut self) -> Result<(), DocError> {
        self.ensure_present()?;
        self.store(&Value::Object(Map::new()))?;
        tracing::info!("已清空JSON文件: {}", self.path.display());
        Ok(())
    }

    /// 顶层键，按插入顺序
    pub fn get_keys(&mut self) -> Result<Vec<String>, DocError> {
        self.inspect(|data| data.keys().cloned().collect())
    }

    /// 顶层值，与 [`get_keys`](Self::get_keys) 一一对应
    pub fn get_values(&mut self) -> Result<Vec<Value>, DocError> {
        self.inspect(|data| data.values().cloned().collect())
    }

    pub fn get_items(&mut self) -> Result<Vec<(String, Value)>, DocError> {
        self.inspect(|data| data.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// 顶层条目数
    pub fn entry_count(&mut self) -> Result<usize, DocError> {
        self.inspect(|data| data.len())
    }

    // ------------------------------ 内部 ------------------------------ //

    fn sync_metadata(&mut self) -> Result<(), DocError> {
        match self.options.refresh {
            RefreshPolicy::BeforeEachOperation => self.refresh(),
            RefreshPolicy::Cached => Ok(()),
        }
    }

    /// 文件缺失时在任何读写之前失败
    fn ensure_present(&mut self) -> Result<(), DocError> {
        self.sync_metadata()?;
        if !self.exists {
            return Err(DocError::NotFound {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    fn load(&self) -> Result<Value, DocError> {
        tracing::debug!("读取JSON文件: {}", self.path.display());
        read_json_file(&self.path, self.options.encoding)
    }

    fn store(&mut self, tree: &Value) -> Result<(), DocError> {
        write_json_file(&self.path, tree, &self.options)?;
        self.refresh()?;
        tracing::info!("JSON文件已保存到: {} ({} 字节)", self.path.display(), self.size_bytes);
        Ok(())
    }

    fn inspect<R>(&mut self, f: impl FnOnce(&Map<String, Value>) -> R) -> Result<R, DocError> {
        self.ensure_present()?;
        let data = self.load()?;
        Ok(f(as_object(&data)?))
    }

    /// 读取-解析-修改-序列化-写回的唯一入口；闭包返回错误时不写回
    fn transact<R>(
        &mut self,
        f: impl FnOnce(&mut Value) -> Result<Change<R>, DocError>,
    ) -> Result<R, DocError> {
        self.ensure_present()?;
        let mut tree = self.load()?;
        match f(&mut tree)? {
            Change::Write(out) => {
                self.store(&tree)?;
                Ok(out)
            }
            Change::Skip(out) => Ok(out),
        }
    }

    fn mutate<R>(
        &mut self,
        f: impl FnOnce(&mut Map<String, Value>) -> Result<R, DocError>,
    ) -> Result<R, DocError> {
        self.transact(|tree| f(as_object_mut(tree)?).map(Change::Write))
    }
}
