//! 名称与注册表
//!
//! 未指定名称时按类型生成默认名（`Serial`、`Serial-1`、`Serial-2` ...），
//! 计数器按类型独立、单调递增、进程级共享。

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

static NAME_COUNTERS: OnceLock<Mutex<HashMap<String, u64>>> = OnceLock::new();

/// 生成默认名称
///
/// 同一类型第一次调用返回类型名本身，之后依次追加 `-1`、`-2` ...
///
/// # 示例
///
/// ```
/// use robokit_core::default_name;
///
/// let a = default_name("DocSerial");
/// let b = default_name("DocSerial");
/// assert_eq!(a, "DocSerial");
/// assert_eq!(b, "DocSerial-1");
/// ```
pub fn default_name(type_hint: &str) -> String {
    let counters = NAME_COUNTERS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut counters = counters.lock();
    let n = counters.entry(type_hint.to_string()).or_insert(0);
    let name = if *n == 0 {
        type_hint.to_string()
    } else {
        format!("{}-{}", type_hint, n)
    };
    *n += 1;
    name
}

/// 具名实体
pub trait Named {
    fn name(&self) -> &str;
}

impl<T: Named + ?Sized> Named for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: Named + ?Sized> Named for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// 有序注册表
///
/// 元素数量很小，按声明顺序线性查找；同一作用域内名称唯一。
#[derive(Debug, Clone)]
pub struct Registry<T> {
    scope: String,
    items: Vec<T>,
}

impl<T: Named> Registry<T> {
    /// `scope` 用于错误信息，如 `"robot 'bot' devices"`
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            items: Vec::new(),
        }
    }

    /// 注册新元素
    ///
    /// # 错误
    ///
    /// 名称为空返回 [`Error::InvalidArgument`]；重名返回 [`Error::DuplicateName`]。
    pub fn add(&mut self, item: T) -> Result<()> {
        if item.name().is_empty() {
            return Err(Error::InvalidArgument(format!("empty name in {}", self.scope)));
        }
        if self.contains(item.name()) {
            return Err(Error::DuplicateName {
                scope: self.scope.clone(),
                name: item.name().to_string(),
            });
        }
        self.items.push(item);
        Ok(())
    }

    /// 按名称查找第一个匹配项
    pub fn get(&self, name: &str) -> Option<&T> {
        self.items.iter().find(|item| item.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<T> {
        let idx = self.items.iter().position(|item| item.name() == name)?;
        Some(self.items.remove(idx))
    }

    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|item| item.name().to_string()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl<'a, T> IntoIterator for &'a Registry<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Thing(String);

    impl Named for Thing {
        fn name(&self) -> &str {
            &self.0
        }
    }

    #[test]
    fn test_default_name_sequence() {
        // 使用测试专用的类型名，避免与其他测试共享计数器
        assert_eq!(default_name("TestSeqSerial"), "TestSeqSerial");
        assert_eq!(default_name("TestSeqSerial"), "TestSeqSerial-1");
        assert_eq!(default_name("TestSeqSerial"), "TestSeqSerial-2");
        assert_eq!(default_name("TestSeqLed"), "TestSeqLed");
    }

    #[test]
    fn test_registry_duplicate_name() {
        let mut reg = Registry::new("robot 'bot' devices");
        reg.add(Thing("led".into())).unwrap();
        reg.add(Thing("button".into())).unwrap();

        let err = reg.add(Thing("led".into())).unwrap_err();
        match err {
            Error::DuplicateName { scope, name } => {
                assert_eq!(scope, "robot 'bot' devices");
                assert_eq!(name, "led");
            },
            other => panic!("Expected DuplicateName, got {:?}", other),
        }
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_registry_rejects_empty_name() {
        let mut reg = Registry::new("robot 'bot' connections");
        let err = reg.add(Thing(String::new())).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ref m) if m.contains("robot 'bot' connections")));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_registry_lookup_keeps_order() {
        let mut reg = Registry::new("test");
        for n in ["c", "a", "b"] {
            reg.add(Thing(n.into())).unwrap();
        }
        assert_eq!(reg.names(), vec!["c", "a", "b"]);
        assert!(reg.get("a").is_some());
        assert!(reg.get("zzz").is_none());

        assert!(reg.remove("a").is_some());
        assert_eq!(reg.names(), vec!["c", "b"]);
    }

    #[test]
    fn test_registry_of_arc_trait_objects() {
        let mut reg: Registry<Arc<dyn Named + Send + Sync>> = Registry::new("test");
        reg.add(Arc::new(Thing("x".into()))).unwrap();
        assert_eq!(reg.get("x").map(|t| t.name()), Some("x"));
    }
}
