//! 服务实例与实例集合定义

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 服务实例
///
/// `key` 在注册中心内唯一标识一个进程的一个传输端点，`address` 为可达的网络地址
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub key: String,
    pub address: String,
}

impl ServiceInstance {
    pub fn new(key: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.key, self.address)
    }
}

/// 某个逻辑服务当前的实例集合（key -> address）
///
/// 只由注册中心的变更通知产生，对客户端缓存和负载均衡器只读。
/// 按 key 有序，保证快照的遍历顺序稳定。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceSet {
    entries: BTreeMap<String, String>,
}

impl InstanceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn instances(&self) -> Vec<ServiceInstance> {
        self.iter()
            .map(|(key, address)| ServiceInstance::new(key, address))
            .collect()
    }

    /// 返回值表示集合是否发生了变化
    pub(crate) fn upsert(&mut self, key: String, address: String) -> bool {
        match self.entries.get(&key) {
            Some(existing) if *existing == address => false,
            _ => {
                self.entries.insert(key, address);
                true
            }
        }
    }

    pub(crate) fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }
}

impl<K, V> FromIterator<(K, V)> for InstanceSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// 注册中心 key 布局
///
/// 服务端注册边界：把 (服务名, 传输标签, 实例标识) 映射为唯一的注册 key，
/// 客户端用同样的布局计算要监听的前缀。
///
/// 默认布局为 `/services/<service>/<transport>/<instance>`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLayout {
    root: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::new("/services")
    }
}

impl KeyLayout {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let root = root.trim_end_matches('/').to_string();
        Self { root }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// 某个服务所有传输的前缀
    pub fn service_prefix(&self, service: &str) -> String {
        format!("{}/{}/", self.root, service)
    }

    /// 某个服务某个传输的前缀（Instancer 监听的范围）
    pub fn transport_prefix(&self, service: &str, transport: &str) -> String {
        format!("{}/{}/{}/", self.root, service, transport)
    }

    /// 单个实例的 key
    pub fn instance_key(&self, service: &str, transport: &str, instance: impl fmt::Display) -> String {
        format!("{}/{}/{}/{}", self.root, service, transport, instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_reports_changes_only() {
        let mut set = InstanceSet::new();
        assert!(set.upsert("a".into(), "10.0.0.1:9000".into()));
        assert!(!set.upsert("a".into(), "10.0.0.1:9000".into()));
        assert!(set.upsert("a".into(), "10.0.0.9:9000".into()));
        assert!(set.remove("a"));
        assert!(!set.remove("a"));
        assert!(set.is_empty());
    }

    #[test]
    fn iteration_is_ordered_by_key() {
        let set: InstanceSet = [("b", "2"), ("a", "1"), ("c", "3")].into_iter().collect();
        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(set.get("b"), Some("2"));
    }

    #[test]
    fn key_layout_builds_nested_keys() {
        let layout = KeyLayout::new("/services/");
        assert_eq!(layout.transport_prefix("Event", "twirp"), "/services/Event/twirp/");
        assert_eq!(
            layout.instance_key("Event", "twirp", "10.0.0.1:9000"),
            "/services/Event/twirp/10.0.0.1:9000"
        );
        assert!(layout
            .instance_key("Event", "grpc", "x")
            .starts_with(&layout.service_prefix("Event")));
    }
}
