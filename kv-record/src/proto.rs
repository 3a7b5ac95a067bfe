use prost::Message;

use crate::{
    error::Error,
    key::{Key, KeyId},
    record::Entity,
    value::{Text, Value},
};

#[derive(Clone, PartialEq, ::prost::Message)]
pub(crate) struct PathElementProto {
    #[prost(string, tag = "1")]
    pub kind: String,
    #[prost(int64, optional, tag = "2")]
    pub id: Option<i64>,
    #[prost(string, optional, tag = "3")]
    pub name: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub(crate) struct KeyProto {
    #[prost(string, tag = "1")]
    pub namespace: String,
    #[prost(message, repeated, tag = "2")]
    pub path: Vec<PathElementProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub(crate) struct ListProto {
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<ValueProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub(crate) struct ValueProto {
    #[prost(oneof = "value_proto::Kind", tags = "1, 2, 3, 4, 5, 6, 7, 8, 9")]
    pub kind: Option<value_proto::Kind>,
}

pub(crate) mod value_proto {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(bool, tag = "1")]
        Null(bool),
        #[prost(bool, tag = "2")]
        Bool(bool),
        #[prost(int64, tag = "3")]
        Integer(i64),
        #[prost(double, tag = "4")]
        Float(f64),
        #[prost(string, tag = "5")]
        String(String),
        #[prost(string, tag = "6")]
        Text(String),
        #[prost(bytes = "vec", tag = "7")]
        Bytes(Vec<u8>),
        #[prost(message, tag = "8")]
        Key(super::KeyProto),
        #[prost(message, tag = "9")]
        List(super::ListProto),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub(crate) struct PropertyProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<ValueProto>,
    #[prost(bool, tag = "3")]
    pub unindexed: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub(crate) struct EntityProto {
    #[prost(message, optional, tag = "1")]
    pub key: Option<KeyProto>,
    #[prost(message, repeated, tag = "2")]
    pub properties: Vec<PropertyProto>,
}

/// 临时句柄只在本进程内有意义，未完成的 key 不能序列化
pub(crate) fn key_to_proto(key: &Key) -> Result<KeyProto, Error> {
    let mut path = Vec::new();
    for element in key.path() {
        let (id, name) = match element.key_id() {
            KeyId::Id(id) => (Some(*id), None),
            KeyId::Name(name) => (None, Some(name.clone())),
            KeyId::Incomplete { .. } => return Err(Error::IncompleteKey(key.to_string())),
        };
        path.push(PathElementProto {
            kind: element.kind().to_string(),
            id,
            name,
        });
    }
    Ok(KeyProto {
        namespace: key.namespace().to_string(),
        path,
    })
}

pub(crate) fn key_from_proto(proto: KeyProto) -> Result<Key, Error> {
    let mut current: Option<Key> = None;
    for element in proto.path {
        let key = match (element.id, element.name) {
            (Some(id), None) => Key::from_id(element.kind, id, current.as_ref())?,
            (None, Some(name)) => Key::from_name(element.kind, name, current.as_ref())?,
            _ => {
                return Err(Error::InvalidKey(
                    "path element needs id or name".to_string(),
                ));
            }
        };
        // namespace 只设置在根上，子 key 继承
        current = Some(match current {
            None => key.in_namespace(proto.namespace.clone())?,
            Some(_) => key,
        });
    }
    current.ok_or_else(|| Error::InvalidKey("key path is empty".to_string()))
}

fn value_to_proto(value: &Value) -> Result<ValueProto, Error> {
    use value_proto::Kind;

    let kind = match value {
        Value::Null => Kind::Null(true),
        Value::Bool(b) => Kind::Bool(*b),
        Value::Integer(i) => Kind::Integer(*i),
        Value::Float(f) => Kind::Float(*f),
        Value::String(s) => Kind::String(s.clone()),
        Value::Text(text) => Kind::Text(text.value().to_string()),
        Value::Bytes(bytes) => Kind::Bytes(bytes.clone()),
        Value::Key(key) => Kind::Key(key_to_proto(key)?),
        Value::List(items) => Kind::List(ListProto {
            values: items.iter().map(value_to_proto).collect::<Result<_, _>>()?,
        }),
    };
    Ok(ValueProto { kind: Some(kind) })
}

fn value_from_proto(proto: ValueProto) -> Result<Value, Error> {
    use value_proto::Kind;

    let Some(kind) = proto.kind else {
        return Err(Error::InvalidEntity("property value is missing".to_string()));
    };
    Ok(match kind {
        Kind::Null(_) => Value::Null,
        Kind::Bool(b) => Value::Bool(b),
        Kind::Integer(i) => Value::Integer(i),
        Kind::Float(f) => Value::Float(f),
        Kind::String(s) => Value::String(s),
        Kind::Text(s) => Value::Text(Text::new(s)),
        Kind::Bytes(bytes) => Value::Bytes(bytes),
        Kind::Key(key) => Value::Key(key_from_proto(key)?),
        Kind::List(list) => Value::List(
            list.values
                .into_iter()
                .map(value_from_proto)
                .collect::<Result<_, _>>()?,
        ),
    })
}

impl Entity {
    /// 编码为 protobuf，供缓存层跨进程保存；key 与所有 key 引用都必须完整
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut properties = Vec::with_capacity(self.properties().len());
        for (name, property) in self.properties() {
            properties.push(PropertyProto {
                name: name.clone(),
                value: Some(value_to_proto(property.value())?),
                unindexed: property.is_unindexed(),
            });
        }
        let proto = EntityProto {
            key: Some(key_to_proto(self.key())?),
            properties,
        };
        Ok(proto.encode_to_vec())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let proto = EntityProto::decode(bytes)?;
        let Some(key) = proto.key else {
            return Err(Error::InvalidEntity("key is missing".to_string()));
        };
        let mut entity = Entity::new(key_from_proto(key)?);
        for property in proto.properties {
            let Some(value) = property.value else {
                return Err(Error::InvalidEntity(format!(
                    "property {} has no value",
                    property.name
                )));
            };
            let value = value_from_proto(value)?;
            if property.unindexed {
                entity.set_unindexed_property(property.name, value);
            } else {
                entity.set_property(property.name, value);
            }
        }
        Ok(entity)
    }
}
