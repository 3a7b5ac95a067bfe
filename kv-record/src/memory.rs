use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use prost::Message;

use crate::{
    error::Error,
    filter::{Filter, Query},
    key::Key,
    proto::{KeyProto, key_from_proto, key_to_proto},
    record::{Entity, Record},
    schema::SchemaProvider,
    store::{Cursor, IdAllocator, Page, StoreClient},
    value::Value,
};

fn encode_cursor(last: &Key) -> Result<Cursor, Error> {
    Ok(Cursor::from_bytes(key_to_proto(last)?.encode_to_vec()))
}

fn decode_cursor(cursor: &Cursor) -> Result<Key, Error> {
    key_from_proto(KeyProto::decode(cursor.as_bytes())?)
}

fn dangling_reference<'a>(value: &'a Value, pending: &[Key]) -> Option<&'a Key> {
    match value {
        Value::Key(key) if !key.is_complete() && !pending.contains(key) => Some(key),
        Value::List(items) => items.iter().find_map(|item| dangling_reference(item, pending)),
        _ => None,
    }
}

/// 进程内的存储实现，按 key 顺序保存实体；单线程使用
#[derive(Default)]
pub struct MemoryStore {
    entities: RefCell<BTreeMap<Key, Entity>>,
    next_id: Cell<i64>,
    schema: Option<Arc<dyn SchemaProvider>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读出的记录都会绑定这个 schema
    pub fn with_schema(mut self, schema: Arc<dyn SchemaProvider>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn len(&self) -> usize {
        self.entities.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.borrow().is_empty()
    }

    pub fn get(&self, key: &Key) -> Result<Record, Error> {
        let entities = self.entities.borrow();
        let Some(entity) = entities.get(key) else {
            return Err(Error::NotFound);
        };
        Ok(self.load(entity.clone()))
    }

    pub fn put(&self, record: &mut Record) -> Result<(), Error> {
        self.put_all(std::slice::from_mut(record))
    }

    /// 先为未完成的 key 分配 ID，再修正批内所有指向旧 key 的引用，最后写入并清除脏标记。
    ///
    /// 若属性引用了批外的未完成 key，整批拒绝且不做任何修改。
    pub fn put_all(&self, records: &mut [Record]) -> Result<(), Error> {
        let pending: Vec<Key> = records
            .iter()
            .map(Record::key)
            .filter(|key| !key.is_complete())
            .cloned()
            .collect();
        for record in records.iter() {
            for property in record.properties().values() {
                if let Some(key) = dangling_reference(property.value(), &pending) {
                    return Err(Error::IncompleteKey(format!(
                        "{} references unsaved {}",
                        record.key(),
                        key
                    )));
                }
            }
            self.reserve(record.key());
        }

        let mut finalized = Vec::new();
        for record in records.iter_mut() {
            if record.key().is_complete() {
                continue;
            }
            let original = record.key().clone();
            let id = self.preallocate_id(record.kind())?;
            record.set_id(id)?;
            finalized.push((original, record.key().clone()));
        }

        for record in records.iter_mut() {
            for (original, replacement) in &finalized {
                record.update_stored_key(original, replacement);
            }
        }

        let mut entities = self.entities.borrow_mut();
        for record in records.iter_mut() {
            entities.insert(record.key().clone(), record.entity().clone());
            record.mark_saved();
        }
        Ok(())
    }

    pub fn delete(&self, key: &Key) -> bool {
        self.entities.borrow_mut().remove(key).is_some()
    }

    // 显式写入的数字 ID 不会再被分配出去
    fn reserve(&self, key: &Key) {
        if let Some(id) = key.id() {
            if id > self.next_id.get() {
                self.next_id.set(id);
            }
        }
    }

    fn load(&self, entity: Entity) -> Record {
        let mut record = Record::wrap(entity);
        record.set_schema(self.schema.clone());
        record
    }

    fn scan<F>(
        &self,
        cursor: Option<&Cursor>,
        limit: usize,
        mut matches: F,
    ) -> Result<Vec<Entity>, Error>
    where
        F: FnMut(&Entity) -> bool,
    {
        let after = cursor.map(decode_cursor).transpose()?;
        let entities = self.entities.borrow();
        let lower = match &after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        Ok(entities
            .range::<Key, _>((lower, Bound::Unbounded))
            .map(|(_, entity)| entity)
            .filter(|entity| matches(*entity))
            .take(limit)
            .cloned()
            .collect())
    }
}

impl IdAllocator for MemoryStore {
    type Error = Error;

    fn preallocate_id(&self, _kind: &str) -> Result<i64, Error> {
        let Some(id) = self.next_id.get().checked_add(1) else {
            return Err(Error::InvalidState("id space exhausted".to_string()));
        };
        self.next_id.set(id);
        Ok(id)
    }
}

impl StoreClient for MemoryStore {
    type Error = Error;

    fn fetch_query(
        &self,
        query: &Query,
        limit: usize,
        cursor: Option<&Cursor>,
    ) -> Result<Page, Error> {
        if let Some(ancestor) = query.ancestor() {
            if !ancestor.is_complete() {
                return Err(Error::IncompleteKey(ancestor.to_string()));
            }
        }
        let entities = self.scan(cursor, limit, |entity| query.matches(entity))?;
        let next = match entities.last() {
            Some(last) => Some(encode_cursor(last.key())?),
            None => None,
        };
        let records = entities.into_iter().map(|entity| self.load(entity)).collect();
        Ok(Page::new(records, next))
    }

    fn fetch_key_list(
        &self,
        kind: &str,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<Key>, Error> {
        let query = match filter {
            Some(filter) => Query::new(kind).with_filter(filter.clone()),
            None => Query::new(kind),
        };
        Ok(self
            .scan(None, limit, |entity| query.matches(entity))?
            .into_iter()
            .map(|entity| entity.key().clone())
            .collect())
    }
}

impl StoreClient for &MemoryStore {
    type Error = Error;

    fn fetch_query(
        &self,
        query: &Query,
        limit: usize,
        cursor: Option<&Cursor>,
    ) -> Result<Page, Error> {
        (**self).fetch_query(query, limit, cursor)
    }

    fn fetch_key_list(
        &self,
        kind: &str,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<Key>, Error> {
        (**self).fetch_key_list(kind, filter, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSchema, Schema};

    #[test]
    fn cursor_round_trips_through_prost() {
        let guild = Key::from_name("Guild", "red", None)
            .unwrap()
            .in_namespace("tenant")
            .unwrap();
        let key = Key::from_id("Player", 12, Some(&guild)).unwrap();
        let cursor = encode_cursor(&key).unwrap();
        assert_eq!(decode_cursor(&cursor).unwrap(), key);
    }

    #[test]
    fn garbage_cursor_is_rejected() {
        let cursor = Cursor::from_bytes(vec![0xff, 0xff, 0xff]);
        assert!(matches!(decode_cursor(&cursor), Err(Error::DeserializationError(_))));
        let empty = Cursor::from_bytes(Vec::new());
        assert!(matches!(decode_cursor(&empty), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn put_finalizes_incomplete_keys() {
        let store = MemoryStore::new();
        let mut record = Record::new("Player").unwrap();
        record.set("name", "alice");

        store.put(&mut record).unwrap();

        assert!(record.key().is_complete());
        assert!(!record.is_unsaved());
        let loaded = store.get(record.key()).unwrap();
        assert_eq!(loaded, record);
        assert!(!loaded.is_unsaved());
    }

    #[test]
    fn put_all_rewrites_references_inside_the_batch() {
        let store = MemoryStore::new();
        let mut sword = Record::new("Item").unwrap();
        sword.set("name", "sword");
        let mut player = Record::new("Player").unwrap();
        player.set("weapon", sword.key().clone());
        player.set("bag", vec![sword.key().clone()]);

        let mut batch = vec![sword, player];
        store.put_all(&mut batch).unwrap();

        let sword_key = batch[0].key().clone();
        let player = store.get(batch[1].key()).unwrap();
        assert_eq!(player.get("weapon").as_deref(), Some(&Value::Key(sword_key.clone())));
        assert_eq!(
            player.get("bag").as_deref(),
            Some(&Value::from(vec![sword_key]))
        );
    }

    #[test]
    fn allocation_skips_ids_already_written() {
        let store = MemoryStore::new();
        let mut alice = Record::with_id("Player", 1).unwrap();
        alice.set("name", "alice");
        store.put(&mut alice).unwrap();

        let mut bob = Record::new("Player").unwrap();
        bob.set("name", "bob");
        store.put(&mut bob).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(bob.id(), Some(2));
        let kept = store.get(alice.key()).unwrap();
        assert_eq!(kept.get("name").as_deref(), Some(&Value::from("alice")));
    }

    #[test]
    fn allocation_skips_explicit_ids_in_the_same_batch() {
        let store = MemoryStore::new();
        let fresh = Record::new("Player").unwrap();
        let fixed = Record::with_id("Player", 5).unwrap();

        let mut batch = vec![fresh, fixed];
        store.put_all(&mut batch).unwrap();

        assert_eq!(batch[0].id(), Some(6));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn reference_to_unsaved_record_outside_the_batch_is_rejected() {
        let store = MemoryStore::new();
        let sword = Record::new("Item").unwrap();
        let mut player = Record::with_id("Player", 7).unwrap();
        player.set("weapon", sword.key().clone());

        assert!(matches!(store.put(&mut player), Err(Error::IncompleteKey(_))));
        assert!(store.is_empty());
        assert!(player.is_unsaved());

        let mut listed = Record::new("Player").unwrap();
        listed.set("bag", vec![sword.key().clone()]);
        assert!(matches!(store.put(&mut listed), Err(Error::IncompleteKey(_))));
        assert!(!listed.key().is_complete());
    }

    #[test]
    fn missing_key_is_not_found() {
        let store = MemoryStore::new();
        let key = Key::from_id("Player", 1, None).unwrap();
        assert!(matches!(store.get(&key), Err(Error::NotFound)));
        assert!(!store.delete(&key));
    }

    #[test]
    fn loaded_records_carry_the_store_schema() {
        let schema = Arc::new(
            Schema::new().field("Player", "bio", FieldSchema::typed("Text").unindexed()),
        );
        let store = MemoryStore::new().with_schema(schema);
        let mut record = Record::with_id("Player", 1).unwrap();
        store.put(&mut record).unwrap();

        let mut loaded = store.get(record.key()).unwrap();
        loaded.set("bio", "long story");
        assert!(loaded.is_unindexed("bio"));
        assert_eq!(loaded.get("bio").as_deref(), Some(&Value::from("long story")));
    }

    #[test]
    fn incomplete_ancestor_is_rejected() {
        let store = MemoryStore::new();
        let ancestor = Key::incomplete("Guild", None).unwrap();
        let query = Query::kindless().with_ancestor(ancestor);
        assert!(matches!(
            store.fetch_query(&query, 10, None),
            Err(Error::IncompleteKey(_))
        ));
    }
}
