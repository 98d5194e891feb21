//! 嵌套键搜索：在多层对象中定位第一个匹配的键并读取或改写其值
//!
//! 只沿对象（mapping）下钻，数组中的对象不参与搜索。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 嵌套搜索策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    /// 深度优先：先匹配当前层的直接键，再依次进入每个子对象，命中即停止
    #[default]
    Exhaustive,
    /// 兼容旧行为：按插入顺序遍历，遇到第一个子对象就进入并直接返回其结果，
    /// 不再回到同层的兄弟分支；子对象的检查先于键名比较
    FirstBranchOnly,
}

/// 以 [`SearchMode::Exhaustive`] 改写第一个匹配键的值，返回是否找到
pub fn set_nested_value(tree: &mut Value, key: &str, value: Value) -> bool {
    set_nested_value_with(SearchMode::Exhaustive, tree, key, value)
}

/// 按指定策略改写第一个匹配键的值；根节点不是对象时返回false
pub fn set_nested_value_with(mode: SearchMode, tree: &mut Value, key: &str, value: Value) -> bool {
    let Value::Object(map) = tree else {
        return false;
    };
    match mode {
        SearchMode::Exhaustive => set_exhaustive(map, key, value).is_ok(),
        SearchMode::FirstBranchOnly => set_first_branch(map, key, value),
    }
}

/// 未命中时通过 Err 把值交还给调用方，供下一个分支继续使用
fn set_exhaustive(map: &mut Map<String, Value>, key: &str, value: Value) -> Result<(), Value> {
    if let Some(slot) = map.get_mut(key) {
        *slot = value;
        return Ok(());
    }
    let mut value = value;
    for child in map.values_mut() {
        if let Value::Object(inner) = child {
            match set_exhaustive(inner, key, value) {
                Ok(()) => return Ok(()),
                Err(back) => value = back,
            }
        }
    }
    Err(value)
}

fn set_first_branch(map: &mut Map<String, Value>, key: &str, value: Value) -> bool {
    for (name, child) in map.iter_mut() {
        if let Value::Object(inner) = child {
            return set_first_branch(inner, key, value);
        }
        if name == key {
            *child = value;
            return true;
        }
    }
    false
}

/// 以 [`SearchMode::Exhaustive`] 查找第一个匹配键的值
pub fn find_nested_value<'a>(tree: &'a Value, key: &str) -> Option<&'a Value> {
    find_nested_value_with(SearchMode::Exhaustive, tree, key)
}

/// 按指定策略查找第一个匹配键的值，遍历顺序与 [`set_nested_value_with`] 一致
pub fn find_nested_value_with<'a>(mode: SearchMode, tree: &'a Value, key: &str) -> Option<&'a Value> {
    fn exhaustive<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
        if let Some(hit) = map.get(key) {
            return Some(hit);
        }
        map.values().find_map(|child| match child {
            Value::Object(inner) => exhaustive(inner, key),
            _ => None,
        })
    }
    fn first_branch<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
        for (name, child) in map {
            if let Value::Object(inner) = child {
                return first_branch(inner, key);
            }
            if name == key {
                return Some(child);
            }
        }
        None
    }

    let Value::Object(map) = tree else {
        return None;
    };
    match mode {
        SearchMode::Exhaustive => exhaustive(map, key),
        SearchMode::FirstBranchOnly => first_branch(map, key),
    }
}
