use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::{
    codec::{self, LogicalType},
    error::Error,
    key::Key,
    schema::SchemaProvider,
    store::IdAllocator,
    value::Value,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Property {
    value: Value,
    unindexed: bool,
}

impl Property {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_unindexed(&self) -> bool {
        self.unindexed
    }
}

/// 未包装的原始表示：一个 key 加属性表
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Entity {
    key: Key,
    properties: BTreeMap<String, Property>,
}

impl Entity {
    pub fn new(key: Key) -> Self {
        Entity {
            key,
            properties: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn properties(&self) -> &BTreeMap<String, Property> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.put(name.into(), value.into(), false);
    }

    pub fn set_unindexed_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.put(name.into(), value.into(), true);
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name).map(|p| p.value)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn is_unindexed_property(&self, name: &str) -> bool {
        self.properties.get(name).is_some_and(|p| p.unindexed)
    }

    fn put(&mut self, name: String, value: Value, unindexed: bool) {
        self.properties.insert(name, Property { value, unindexed });
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<Entity [{}]:", self.key)?;
        for (name, property) in &self.properties {
            writeln!(f, "\t{} = {}", name, property.value)?;
        }
        write!(f, ">")
    }
}

/// 记录：包装一个 Entity，负责 key 生命周期与按 schema 写入属性。
///
/// 构造出的新记录和每次属性修改都会置脏；记录自身从不清除脏标记，
/// 由持久化层在写入后调用 [`Record::mark_saved`]。
#[derive(Clone)]
pub struct Record {
    entity: Entity,
    unsaved: bool,
    schema: Option<Arc<dyn SchemaProvider>>,
}

impl Record {
    fn from_entity(entity: Entity, unsaved: bool) -> Self {
        Record {
            entity,
            unsaved,
            schema: None,
        }
    }

    /// 包装已有的 key；完整的 key 视为从存储中读取，不置脏，未完成的 key 置脏
    pub fn from_key(key: Key) -> Self {
        Self::wrap(Entity::new(key))
    }

    pub fn wrap(entity: Entity) -> Self {
        let unsaved = !entity.key.is_complete();
        Self::from_entity(entity, unsaved)
    }

    pub fn new(kind: impl Into<String>) -> Result<Self, Error> {
        Ok(Self::from_entity(
            Entity::new(Key::incomplete(kind, None)?),
            true,
        ))
    }

    pub fn with_parent(kind: impl Into<String>, parent: &Key) -> Result<Self, Error> {
        Ok(Self::from_entity(
            Entity::new(Key::incomplete(kind, Some(parent))?),
            true,
        ))
    }

    pub fn with_id(kind: impl Into<String>, id: i64) -> Result<Self, Error> {
        Ok(Self::from_entity(
            Entity::new(Key::from_id(kind, id, None)?),
            true,
        ))
    }

    pub fn with_id_and_parent(
        kind: impl Into<String>,
        id: i64,
        parent: &Key,
    ) -> Result<Self, Error> {
        Ok(Self::from_entity(
            Entity::new(Key::from_id(kind, id, Some(parent))?),
            true,
        ))
    }

    pub fn with_name(kind: impl Into<String>, name: impl Into<String>) -> Result<Self, Error> {
        Ok(Self::from_entity(
            Entity::new(Key::from_name(kind, name, None)?),
            true,
        ))
    }

    pub fn with_name_and_parent(
        kind: impl Into<String>,
        name: impl Into<String>,
        parent: &Key,
    ) -> Result<Self, Error> {
        Ok(Self::from_entity(
            Entity::new(Key::from_name(kind, name, Some(parent))?),
            true,
        ))
    }

    /// 先向分配服务预取 ID，使 key 立即完整，不必等到首次写入
    pub fn preallocated<A: IdAllocator>(
        kind: impl Into<String>,
        allocator: &A,
    ) -> Result<Self, A::Error> {
        let kind = kind.into();
        let id = allocator.preallocate_id(&kind)?;
        Ok(Self::from_entity(
            Entity::new(Key::from_id(kind, id, None)?),
            true,
        ))
    }

    pub fn with_schema(mut self, schema: Arc<dyn SchemaProvider>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn set_schema(&mut self, schema: Option<Arc<dyn SchemaProvider>>) {
        self.schema = schema;
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn into_entity(self) -> Entity {
        self.entity
    }

    pub fn key(&self) -> &Key {
        &self.entity.key
    }

    pub fn kind(&self) -> &str {
        self.entity.key.kind()
    }

    pub fn id(&self) -> Option<i64> {
        self.entity.key.id()
    }

    pub fn name(&self) -> Option<&str> {
        self.entity.key.name()
    }

    pub fn namespace(&self) -> &str {
        self.entity.key.namespace()
    }

    pub fn parent(&self) -> Option<&Key> {
        self.entity.key.parent()
    }

    pub fn is_unsaved(&self) -> bool {
        self.unsaved
    }

    /// 供持久化层在写入成功后调用
    pub fn mark_saved(&mut self) {
        self.unsaved = false;
    }

    /// 为未完成的 key 设置 ID；属性原样保留
    pub fn set_id(&mut self, id: i64) -> Result<(), Error> {
        let key = self.entity.key.complete_with_id(id)?;
        log::debug!("{} finalized as {}", self.entity.key, key);
        let properties = std::mem::take(&mut self.entity.properties);
        self.entity = Entity { key, properties };
        Ok(())
    }

    /// 将所有指向 `original` 的 key 属性（含列表元素）替换为 `replacement`，返回替换次数
    pub fn update_stored_key(&mut self, original: &Key, replacement: &Key) -> usize {
        let key = &self.entity.key;
        let mut replaced = 0;
        for (field, property) in self.entity.properties.iter_mut() {
            match &mut property.value {
                Value::Key(stored) if stored == original => {
                    *stored = replacement.clone();
                    replaced += 1;
                    log::warn!(
                        "{}.{} was {} and is now {}",
                        key,
                        field,
                        original,
                        replacement
                    );
                }
                Value::List(items) => {
                    for (i, item) in items.iter_mut().enumerate() {
                        match item {
                            Value::Key(stored) if stored == original => {
                                *stored = replacement.clone();
                                replaced += 1;
                                log::warn!(
                                    "{}.{}[{}] was {} and is now {}",
                                    key,
                                    field,
                                    i,
                                    original,
                                    replacement
                                );
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        if replaced > 0 {
            self.unsaved = true;
        }
        replaced
    }

    /// 读取属性，长文本透明解包为字符串
    pub fn get(&self, name: &str) -> Option<Cow<'_, Value>> {
        self.entity.property(name).map(|p| codec::decode(&p.value))
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.entity.property(name)
    }

    /// 根据 schema 决定是否建索引、是否编码为长文本；无论值是否变化都会置脏
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let mut value = value.into();
        let mut unindexed = false;

        if let Some(schema) = &self.schema {
            let kind = self.entity.key.kind();
            unindexed = schema.is_field_unindexed(kind, &name);
            if let Some(type_name) = schema.field_type_name(kind, &name) {
                value = LogicalType::parse(type_name).encode(value);
            }
            log::trace!("{}.{} unindexed={}", kind, name, unindexed);
        }

        self.entity.put(name, value, unindexed);
        self.unsaved = true;
    }

    pub fn set_property_manually(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.entity.set_property(name, value);
        self.unsaved = true;
    }

    pub fn set_unindexed_property_manually(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) {
        self.entity.set_unindexed_property(name, value);
        self.unsaved = true;
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let removed = self.entity.remove_property(name);
        if removed.is_some() {
            self.unsaved = true;
        }
        removed
    }

    pub fn has(&self, name: &str) -> bool {
        self.entity.has_property(name)
    }

    pub fn is_unindexed(&self, name: &str) -> bool {
        self.entity.is_unindexed_property(name)
    }

    pub fn properties(&self) -> &BTreeMap<String, Property> {
        self.entity.properties()
    }
}

impl From<Entity> for Record {
    fn from(entity: Entity) -> Self {
        Record::wrap(entity)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity
    }
}

impl Eq for Record {}

impl PartialEq<Entity> for Record {
    fn eq(&self, other: &Entity) -> bool {
        &self.entity == other
    }
}

impl PartialEq<Record> for Entity {
    fn eq(&self, other: &Record) -> bool {
        self == &other.entity
    }
}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity.hash(state);
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("entity", &self.entity)
            .field("unsaved", &self.unsaved)
            .field("schema", &self.schema.is_some())
            .finish()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.entity, f)
    }
}
