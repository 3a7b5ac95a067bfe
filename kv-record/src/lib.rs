mod codec;
mod error;
mod filter;
mod key;
mod memory;
mod proto;
mod query;
mod record;
mod schema;
mod store;
mod value;

pub use codec::{LogicalType, TEXT_TYPE_NAME};
pub use error::Error;
pub use filter::{
    CompositeFilter, CompositeOperator, Filter, FilterOperator, FilterPredicate, Query,
};
pub use key::{Key, KeyId};
pub use memory::MemoryStore;
pub use query::{COUNT_CEILING, DEFAULT_LIMIT, PredicateSet, QueryBuilder, QueryConfig};
pub use record::{Entity, Property, Record};
pub use schema::{FieldMeta, FieldSchema, KindMeta, RecordKind, Schema, SchemaProvider};
pub use store::{Cursor, IdAllocator, Page, StoreClient};
pub use value::{Text, Value};

pub use kv_record_derive::RecordSchema;

#[doc(hidden)]
pub use inventory;
