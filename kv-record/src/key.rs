use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::error::Error;

// 未完成的 key 用临时句柄区分，保证两个不同的新记录不会相等
static NEXT_PROVISIONAL: AtomicU64 = AtomicU64::new(1);

/// key 的标识部分：未分配、数字 ID 或字符串名称
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyId {
    Incomplete { provisional: u64 },
    Id(i64),
    Name(String),
}

impl KeyId {
    fn incomplete() -> Self {
        KeyId::Incomplete {
            provisional: NEXT_PROVISIONAL.fetch_add(1, AtomicOrdering::Relaxed),
        }
    }

    pub fn is_complete(&self) -> bool {
        !matches!(self, KeyId::Incomplete { .. })
    }

    fn rank(&self) -> u8 {
        match self {
            KeyId::Incomplete { .. } => 0,
            KeyId::Id(_) => 1,
            KeyId::Name(_) => 2,
        }
    }
}

impl Ord for KeyId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyId::Incomplete { provisional: a }, KeyId::Incomplete { provisional: b }) => {
                a.cmp(b)
            }
            (KeyId::Id(a), KeyId::Id(b)) => a.cmp(b),
            (KeyId::Name(a), KeyId::Name(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 记录的唯一定位：kind + id/name + 可选父 key + namespace
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    kind: String,
    id: KeyId,
    parent: Option<Box<Key>>,
    namespace: String,
}

impl Key {
    fn build(kind: impl Into<String>, id: KeyId, parent: Option<&Key>) -> Result<Self, Error> {
        let kind = kind.into();
        if kind.is_empty() {
            return Err(Error::InvalidKey("kind must not be empty".to_string()));
        }
        match &id {
            KeyId::Id(0) => return Err(Error::InvalidKey("id must not be zero".to_string())),
            KeyId::Name(name) if name.is_empty() => {
                return Err(Error::InvalidKey("name must not be empty".to_string()));
            }
            _ => {}
        }
        let Some(parent) = parent else {
            return Ok(Key {
                kind,
                id,
                parent: None,
                namespace: String::new(),
            });
        };
        if !parent.is_complete() {
            return Err(Error::InvalidKey(format!("parent {} is incomplete", parent)));
        }
        Ok(Key {
            kind,
            id,
            namespace: parent.namespace.clone(),
            parent: Some(Box::new(parent.clone())),
        })
    }

    pub fn incomplete(kind: impl Into<String>, parent: Option<&Key>) -> Result<Self, Error> {
        Self::build(kind, KeyId::incomplete(), parent)
    }

    pub fn from_id(kind: impl Into<String>, id: i64, parent: Option<&Key>) -> Result<Self, Error> {
        Self::build(kind, KeyId::Id(id), parent)
    }

    pub fn from_name(
        kind: impl Into<String>,
        name: impl Into<String>,
        parent: Option<&Key>,
    ) -> Result<Self, Error> {
        Self::build(kind, KeyId::Name(name.into()), parent)
    }

    /// 设置 namespace；子 key 的 namespace 必须与父 key 一致
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Result<Self, Error> {
        let namespace = namespace.into();
        if let Some(parent) = &self.parent {
            if parent.namespace != namespace {
                return Err(Error::InvalidKey(format!(
                    "namespace {:?} differs from parent namespace {:?}",
                    namespace, parent.namespace
                )));
            }
        }
        self.namespace = namespace;
        Ok(self)
    }

    /// Incomplete -> Complete 的单向转换，保留 kind、parent 与 namespace
    pub fn complete_with_id(&self, id: i64) -> Result<Self, Error> {
        if self.is_complete() {
            return Err(Error::InvalidState(format!(
                "cannot set an ID on an already-complete key {}",
                self
            )));
        }
        if id == 0 {
            return Err(Error::InvalidKey("id must not be zero".to_string()));
        }
        Ok(Key {
            kind: self.kind.clone(),
            id: KeyId::Id(id),
            parent: self.parent.clone(),
            namespace: self.namespace.clone(),
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn key_id(&self) -> &KeyId {
        &self.id
    }

    pub fn id(&self) -> Option<i64> {
        match self.id {
            KeyId::Id(id) => Some(id),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match &self.id {
            KeyId::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_complete(&self) -> bool {
        self.id.is_complete()
    }

    /// 从根到自身的祖先路径
    pub fn path(&self) -> Vec<&Key> {
        let mut path = Vec::new();
        let mut current = Some(self);
        while let Some(key) = current {
            path.push(key);
            current = key.parent();
        }
        path.reverse();
        path
    }

    /// 祖先查询语义：自身也算作自己的祖先
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        let mut current = Some(self);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = key.parent();
        }
        false
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.namespace.cmp(&other.namespace).then_with(|| {
            let (a, b) = (self.path(), other.path());
            for (x, y) in a.iter().zip(b.iter()) {
                let ordering = x.kind.cmp(&y.kind).then_with(|| x.id.cmp(&y.id));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.len().cmp(&b.len())
        })
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{}/", parent)?;
        }
        match &self.id {
            KeyId::Incomplete { .. } => write!(f, "{}(no-id-yet)", self.kind),
            KeyId::Id(id) => write!(f, "{}({})", self.kind, id),
            KeyId::Name(name) => write!(f, "{}({:?})", self.kind, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_keys_are_distinct() {
        let a = Key::incomplete("Player", None).unwrap();
        let b = Key::incomplete("Player", None).unwrap();
        assert!(!a.is_complete());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn rejects_invalid_parts() {
        assert!(matches!(Key::incomplete("", None), Err(Error::InvalidKey(_))));
        assert!(matches!(Key::from_id("Player", 0, None), Err(Error::InvalidKey(_))));
        assert!(matches!(Key::from_name("Player", "", None), Err(Error::InvalidKey(_))));

        let parent = Key::incomplete("Guild", None).unwrap();
        assert!(matches!(
            Key::from_id("Player", 1, Some(&parent)),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn complete_with_id_keeps_parent_and_namespace() {
        let guild = Key::from_name("Guild", "red", None)
            .unwrap()
            .in_namespace("tenant-a")
            .unwrap();
        let key = Key::incomplete("Player", Some(&guild)).unwrap();
        let done = key.complete_with_id(42).unwrap();

        assert!(done.is_complete());
        assert_eq!(done.kind(), "Player");
        assert_eq!(done.id(), Some(42));
        assert_eq!(done.parent(), Some(&guild));
        assert_eq!(done.namespace(), "tenant-a");

        assert!(matches!(done.complete_with_id(43), Err(Error::InvalidState(_))));
    }

    #[test]
    fn child_inherits_namespace() {
        let guild = Key::from_id("Guild", 7, None)
            .unwrap()
            .in_namespace("tenant-a")
            .unwrap();
        let child = Key::from_id("Player", 1, Some(&guild)).unwrap();
        assert_eq!(child.namespace(), "tenant-a");
        assert!(child.clone().in_namespace("tenant-b").is_err());
    }

    #[test]
    fn ordering_follows_path() {
        let guild = Key::from_id("Guild", 1, None).unwrap();
        let by_id = Key::from_id("Player", 9, Some(&guild)).unwrap();
        let by_name = Key::from_name("Player", "a", Some(&guild)).unwrap();
        let other_guild = Key::from_id("Guild", 2, None).unwrap();

        assert!(guild < by_id);
        assert!(by_id < by_name);
        assert!(by_name < other_guild);
        assert!(by_id.has_ancestor(&guild));
        assert!(guild.has_ancestor(&guild));
        assert!(!other_guild.has_ancestor(&guild));
    }

    #[test]
    fn display_shows_path() {
        let guild = Key::from_name("Guild", "red", None).unwrap();
        let key = Key::from_id("Player", 42, Some(&guild)).unwrap();
        assert_eq!(key.to_string(), "Guild(\"red\")/Player(42)");
        let pending = Key::incomplete("Player", None).unwrap();
        assert_eq!(pending.to_string(), "Player(no-id-yet)");
    }
}
