//! 命令注册表
//!
//! 名称到处理函数的映射，挂在机器人、管理器或设备上，由 RPC 前端按名称调用。
//! 核心不对处理函数做超时或重试。

use crate::error::{Error, Result};
use crate::value::{Params, Value};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// 命令处理函数：参数表 → 动态值
pub type CommandHandler = Arc<dyn Fn(&Params) -> Value + Send + Sync>;

/// 命令表（可廉价克隆，克隆共享同一张表）
#[derive(Clone)]
pub struct Commander {
    owner: Arc<str>,
    commands: Arc<RwLock<BTreeMap<String, CommandHandler>>>,
}

impl Commander {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: Arc::from(owner.into()),
            commands: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// 注册命令；名称为空返回 [`Error::InvalidArgument`]，同名命令已存在时返回 [`Error::DuplicateName`]
    pub fn add_command<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&Params) -> Value + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "empty command name for '{}'",
                self.owner
            )));
        }
        let mut commands = self.commands.write();
        if commands.contains_key(name) {
            return Err(Error::DuplicateName {
                scope: format!("commands of '{}'", self.owner),
                name: name.to_string(),
            });
        }
        commands.insert(name.to_string(), Arc::new(handler));
        debug!("{}: registered command '{}'", self.owner, name);
        Ok(())
    }

    pub fn remove_command(&self, name: &str) -> bool {
        self.commands.write().remove(name).is_some()
    }

    /// 按名称调用命令
    ///
    /// 处理函数在读锁释放后执行，处理函数内部可以注册新命令。
    ///
    /// # 错误
    ///
    /// 命令不存在时返回 [`Error::UnknownCommand`]。
    pub fn invoke(&self, name: &str, params: &Params) -> Result<Value> {
        let handler = self
            .commands
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownCommand(name.to_string()))?;
        Ok(handler(params))
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.commands.read().contains_key(name)
    }

    /// 命令名列表（按字典序）
    pub fn names(&self) -> Vec<String> {
        self.commands.read().keys().cloned().collect()
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl std::fmt::Debug for Commander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commander")
            .field("owner", &self.owner)
            .field("commands", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::params;

    #[test]
    fn test_invoke_echo() {
        let c = Commander::new("bot");
        c.add_command("echo", |p| p.get("a").cloned().unwrap_or(Value::Null))
            .unwrap();

        let v = c.invoke("echo", &params([("a", Value::from(42))])).unwrap();
        assert_eq!(v, Value::Int(42));
    }

    #[test]
    fn test_invoke_unknown() {
        let c = Commander::new("bot");
        let err = c.invoke("nope", &Params::new()).unwrap_err();
        assert!(matches!(err, Error::UnknownCommand(ref n) if n == "nope"));
    }

    #[test]
    fn test_empty_command_name() {
        let c = Commander::new("bot");
        assert!(matches!(
            c.add_command("", |_| Value::Null),
            Err(Error::InvalidArgument(_))
        ));
        assert!(c.names().is_empty());
    }

    #[test]
    fn test_duplicate_command() {
        let c = Commander::new("bot");
        c.add_command("x", |_| Value::Null).unwrap();
        assert!(matches!(
            c.add_command("x", |_| Value::Null),
            Err(Error::DuplicateName { .. })
        ));
        assert!(c.remove_command("x"));
        assert!(c.add_command("x", |_| Value::Null).is_ok());
    }

    #[test]
    fn test_names_sorted() {
        let c = Commander::new("bot");
        for n in ["stop", "go", "status"] {
            c.add_command(n, |_| Value::Null).unwrap();
        }
        assert_eq!(c.names(), vec!["go", "status", "stop"]);
    }

    #[test]
    fn test_handler_may_register_command() {
        let c = Commander::new("bot");
        let c2 = c.clone();
        c.add_command("install", move |_| {
            Value::Bool(c2.add_command("late", |_| Value::from("hi")).is_ok())
        })
        .unwrap();

        assert_eq!(c.invoke("install", &Params::new()).unwrap(), Value::Bool(true));
        assert_eq!(c.invoke("late", &Params::new()).unwrap(), Value::from("hi"));
    }
}
