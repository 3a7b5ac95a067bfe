use std::collections::HashMap;

/// 按 (kind, 属性名) 给出索引与类型策略；只读
pub trait SchemaProvider: Send + Sync {
    fn is_field_unindexed(&self, kind: &str, property: &str) -> bool;

    fn field_type_name(&self, kind: &str, property: &str) -> Option<&str>;
}

// 定义字段元信息
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldMeta {
    pub name: &'static str,
    pub type_name: &'static str,
    pub unindexed: bool,
}

// 定义 kind 元信息，由 RecordSchema 派生宏注册
pub struct KindMeta {
    pub kind: &'static str,
    pub fields: fn() -> Vec<FieldMeta>,
}

impl std::fmt::Debug for KindMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "KindMeta {{ kind: {}, fields: {:?} }}",
            self.kind,
            (self.fields)()
        )
    }
}

// 使用 inventory 收集所有 kind
inventory::collect!(KindMeta);

/// RecordSchema 派生宏实现的 trait
pub trait RecordKind {
    /// 返回存储中的 kind 名
    fn kind() -> &'static str;

    /// 返回字段定义
    fn field_schemas() -> Vec<FieldMeta>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldSchema {
    pub type_name: Option<String>,
    pub unindexed: bool,
}

impl FieldSchema {
    pub fn typed(type_name: impl Into<String>) -> Self {
        FieldSchema {
            type_name: Some(type_name.into()),
            unindexed: false,
        }
    }

    pub fn unindexed(mut self) -> Self {
        self.unindexed = true;
        self
    }
}

impl From<FieldMeta> for FieldSchema {
    fn from(meta: FieldMeta) -> Self {
        FieldSchema {
            type_name: Some(meta.type_name.to_string()),
            unindexed: meta.unindexed,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Schema {
    kinds: HashMap<String, HashMap<String, FieldSchema>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// 汇总所有通过派生宏注册的 kind
    pub fn registered() -> Self {
        let mut schema = Self::new();
        for meta in inventory::iter::<KindMeta>() {
            log::debug!("registering schema for kind {}", meta.kind);
            for field in (meta.fields)() {
                schema.insert(meta.kind, field.name, field.into());
            }
        }
        schema
    }

    pub fn with_kind<T: RecordKind>(mut self) -> Self {
        for field in T::field_schemas() {
            self.insert(T::kind(), field.name, field.into());
        }
        self
    }

    pub fn field(
        mut self,
        kind: impl Into<String>,
        property: impl Into<String>,
        field: FieldSchema,
    ) -> Self {
        self.insert(kind, property, field);
        self
    }

    pub fn insert(
        &mut self,
        kind: impl Into<String>,
        property: impl Into<String>,
        field: FieldSchema,
    ) {
        self.kinds
            .entry(kind.into())
            .or_default()
            .insert(property.into(), field);
    }

    pub fn get(&self, kind: &str, property: &str) -> Option<&FieldSchema> {
        self.kinds.get(kind)?.get(property)
    }

    pub fn contains_kind(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }
}

impl SchemaProvider for Schema {
    fn is_field_unindexed(&self, kind: &str, property: &str) -> bool {
        self.get(kind, property).is_some_and(|field| field.unindexed)
    }

    fn field_type_name(&self, kind: &str, property: &str) -> Option<&str> {
        self.get(kind, property)?.type_name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_entries_default_to_indexed() {
        let schema = Schema::new().field(
            "Player",
            "bio",
            FieldSchema::typed("Text").unindexed(),
        );

        assert!(schema.is_field_unindexed("Player", "bio"));
        assert_eq!(schema.field_type_name("Player", "bio"), Some("Text"));
        assert!(!schema.is_field_unindexed("Player", "name"));
        assert_eq!(schema.field_type_name("Player", "name"), None);
        assert!(!schema.is_field_unindexed("Guild", "bio"));
    }

    struct Item;

    impl RecordKind for Item {
        fn kind() -> &'static str {
            "Item"
        }

        fn field_schemas() -> Vec<FieldMeta> {
            vec![FieldMeta {
                name: "lore",
                type_name: "Text",
                unindexed: true,
            }]
        }
    }

    #[test]
    fn with_kind_reads_field_metadata() {
        let schema = Schema::new().with_kind::<Item>();
        assert!(schema.contains_kind("Item"));
        assert!(schema.is_field_unindexed("Item", "lore"));
        assert_eq!(schema.field_type_name("Item", "lore"), Some("Text"));
    }
}
