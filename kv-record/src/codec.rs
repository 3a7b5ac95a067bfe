use std::borrow::Cow;

use crate::value::{Text, Value};

pub const TEXT_TYPE_NAME: &str = "Text";

/// schema 中声明的字段逻辑类型，决定写入时的编码
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogicalType {
    Text,
    Other(String),
}

impl LogicalType {
    pub fn parse(type_name: &str) -> Self {
        match type_name {
            TEXT_TYPE_NAME => LogicalType::Text,
            other => LogicalType::Other(other.to_string()),
        }
    }

    pub fn encode(&self, value: Value) -> Value {
        match (self, value) {
            (LogicalType::Text, Value::String(s)) => Value::Text(Text::new(s)),
            (_, value) => value,
        }
    }
}

/// 读取方向：长文本解包为普通字符串，其余原样借出
pub fn decode(value: &Value) -> Cow<'_, Value> {
    match value {
        Value::Text(text) => Cow::Owned(Value::String(text.value().to_string())),
        value => Cow::Borrowed(value),
    }
}
