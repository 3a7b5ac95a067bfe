use std::ops::Deref;

use crate::{
    error::Error,
    filter::{Filter, Query},
    key::Key,
    record::Record,
};

/// 不透明的分页游标，内容由 StoreClient 自行定义
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Cursor(Vec<u8>);

impl Cursor {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Cursor(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// 一次抓取的结果，附带可用于续取的游标
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    records: Vec<Record>,
    cursor: Option<Cursor>,
}

impl Page {
    pub fn new(records: Vec<Record>, cursor: Option<Cursor>) -> Self {
        Page { records, cursor }
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl Deref for Page {
    type Target = [Record];

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

impl IntoIterator for Page {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// 底层存储客户端。错误类型原样透传给调用方，本层不做重试
pub trait StoreClient {
    type Error;

    fn fetch_query(
        &self,
        query: &Query,
        limit: usize,
        cursor: Option<&Cursor>,
    ) -> Result<Page, Self::Error>;

    /// 只取 key，用于计数
    fn fetch_key_list(
        &self,
        kind: &str,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<Key>, Self::Error>;

    fn fetch_list(
        &self,
        kind: &str,
        filter: Option<&Filter>,
        limit: usize,
        cursor: Option<&Cursor>,
    ) -> Result<Page, Self::Error> {
        let mut query = Query::new(kind);
        if let Some(filter) = filter {
            query = query.with_filter(filter.clone());
        }
        self.fetch_query(&query, limit, cursor)
    }
}

/// ID 预分配服务
pub trait IdAllocator {
    type Error: From<Error>;

    fn preallocate_id(&self, kind: &str) -> Result<i64, Self::Error>;
}
