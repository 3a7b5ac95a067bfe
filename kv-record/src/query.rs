use crate::{
    filter::{CompositeOperator, Filter, FilterPredicate, Query},
    key::Key,
    store::{Cursor, Page, StoreClient},
};

pub const DEFAULT_LIMIT: usize = 1000;
pub const COUNT_CEILING: usize = 5000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryConfig {
    /// 未指定 limit 时的最大返回条数
    pub default_limit: usize,
    /// 计数上限，超过部分不保证准确
    pub count_ceiling: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            default_limit: DEFAULT_LIMIT,
            count_ceiling: COUNT_CEILING,
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// 可组合的谓词组：两个或三个
pub trait PredicateSet: sealed::Sealed {
    fn into_filters(self) -> Vec<Filter>;
}

impl sealed::Sealed for (FilterPredicate, FilterPredicate) {}

impl PredicateSet for (FilterPredicate, FilterPredicate) {
    fn into_filters(self) -> Vec<Filter> {
        vec![self.0.into(), self.1.into()]
    }
}

impl sealed::Sealed for (FilterPredicate, FilterPredicate, FilterPredicate) {}

impl PredicateSet for (FilterPredicate, FilterPredicate, FilterPredicate) {
    fn into_filters(self) -> Vec<Filter> {
        vec![self.0.into(), self.1.into(), self.2.into()]
    }
}

/// 把 "字段 操作符 值" 组合成过滤条件并交给 StoreClient 执行
pub struct QueryBuilder<S> {
    store: S,
    config: QueryConfig,
}

impl<S: StoreClient> QueryBuilder<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, QueryConfig::default())
    }

    pub fn with_config(store: S, config: QueryConfig) -> Self {
        QueryBuilder { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn filtered_list(
        &self,
        kind: &str,
        predicate: FilterPredicate,
        limit: Option<usize>,
        cursor: Option<&Cursor>,
    ) -> Result<Page, S::Error> {
        let filter = Filter::from(predicate);
        let limit = limit.unwrap_or(self.config.default_limit);
        log::debug!("fetch {} where {} limit {}", kind, filter, limit);
        self.store.fetch_list(kind, Some(&filter), limit, cursor)
    }

    /// 只取 key 计数，最多数到 count_ceiling
    pub fn filtered_count(
        &self,
        kind: &str,
        predicate: FilterPredicate,
    ) -> Result<usize, S::Error> {
        self.count(kind, Filter::from(predicate))
    }

    pub fn and_list(
        &self,
        kind: &str,
        predicates: impl PredicateSet,
        limit: Option<usize>,
        cursor: Option<&Cursor>,
    ) -> Result<Page, S::Error> {
        let filter = Filter::composite_unchecked(CompositeOperator::And, predicates.into_filters());
        let limit = limit.unwrap_or(self.config.default_limit);
        log::debug!("fetch {} where {} limit {}", kind, filter, limit);
        self.store.fetch_list(kind, Some(&filter), limit, cursor)
    }

    pub fn and_count(&self, kind: &str, predicates: impl PredicateSet) -> Result<usize, S::Error> {
        self.count(
            kind,
            Filter::composite_unchecked(CompositeOperator::And, predicates.into_filters()),
        )
    }

    /// OR 查询总是携带游标参数（可以为 None），便于调用方做合并分页
    pub fn or_list(
        &self,
        cursor: Option<&Cursor>,
        kind: &str,
        predicates: impl PredicateSet,
    ) -> Result<Page, S::Error> {
        let filter = Filter::composite_unchecked(CompositeOperator::Or, predicates.into_filters());
        log::debug!("fetch {} where {}", kind, filter);
        let query = Query::new(kind).with_filter(filter);
        self.store
            .fetch_query(&query, self.config.default_limit, cursor)
    }

    /// 祖先查询：取 parent 之下的所有记录
    pub fn fetch_children(&self, parent: &Key, limit: usize) -> Result<Page, S::Error> {
        log::debug!("fetch children of {} limit {}", parent, limit);
        let query = Query::kindless().with_ancestor(parent.clone());
        self.store.fetch_query(&query, limit, None)
    }

    pub fn list_all(&self, kind: &str) -> Result<Page, S::Error> {
        self.store
            .fetch_list(kind, None, self.config.default_limit, None)
    }

    fn count(&self, kind: &str, filter: Filter) -> Result<usize, S::Error> {
        log::debug!("count {} where {}", kind, filter);
        Ok(self
            .store
            .fetch_key_list(kind, Some(&filter), self.config.count_ceiling)?
            .len())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::record::Record;

    #[derive(Debug, PartialEq)]
    enum Call {
        List(String, Option<Filter>, usize, Option<Cursor>),
        Keys(String, Option<Filter>, usize),
        Query(Query, usize, Option<Cursor>),
    }

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<Call>>,
    }

    impl StoreClient for &Recorder {
        type Error = String;

        fn fetch_query(
            &self,
            query: &Query,
            limit: usize,
            cursor: Option<&Cursor>,
        ) -> Result<Page, String> {
            self.calls
                .borrow_mut()
                .push(Call::Query(query.clone(), limit, cursor.cloned()));
            Ok(Page::default())
        }

        fn fetch_key_list(
            &self,
            kind: &str,
            filter: Option<&Filter>,
            limit: usize,
        ) -> Result<Vec<Key>, String> {
            self.calls
                .borrow_mut()
                .push(Call::Keys(kind.to_string(), filter.cloned(), limit));
            Ok(vec![Key::from_id(kind, 1, None).map_err(|e| e.to_string())?])
        }

        fn fetch_list(
            &self,
            kind: &str,
            filter: Option<&Filter>,
            limit: usize,
            cursor: Option<&Cursor>,
        ) -> Result<Page, String> {
            self.calls.borrow_mut().push(Call::List(
                kind.to_string(),
                filter.cloned(),
                limit,
                cursor.cloned(),
            ));
            let key = Key::from_id(kind, 1, None).map_err(|e| e.to_string())?;
            Ok(Page::new(vec![Record::from_key(key)], None))
        }
    }

    struct Failing;

    impl StoreClient for Failing {
        type Error = &'static str;

        fn fetch_query(
            &self,
            _: &Query,
            _: usize,
            _: Option<&Cursor>,
        ) -> Result<Page, Self::Error> {
            Err("quota exceeded")
        }

        fn fetch_key_list(
            &self,
            _: &str,
            _: Option<&Filter>,
            _: usize,
        ) -> Result<Vec<Key>, Self::Error> {
            Err("quota exceeded")
        }
    }

    #[test]
    fn single_predicate_uses_default_limit() {
        let recorder = Recorder::default();
        let builder = QueryBuilder::new(&recorder);
        let cursor = Cursor::from_bytes(vec![1, 2]);

        let page = builder
            .filtered_list("Player", FilterPredicate::eq("class", "mage"), None, None)
            .unwrap();
        assert_eq!(page.len(), 1);
        builder
            .filtered_list("Player", FilterPredicate::gt("level", 3), Some(10), Some(&cursor))
            .unwrap();

        assert_eq!(
            *recorder.calls.borrow(),
            vec![
                Call::List(
                    "Player".to_string(),
                    Some(FilterPredicate::eq("class", "mage").into()),
                    DEFAULT_LIMIT,
                    None
                ),
                Call::List(
                    "Player".to_string(),
                    Some(FilterPredicate::gt("level", 3).into()),
                    10,
                    Some(cursor)
                ),
            ]
        );
    }

    #[test]
    fn counts_fetch_keys_up_to_ceiling() {
        let recorder = Recorder::default();
        let builder = QueryBuilder::new(&recorder);

        let count = builder
            .and_count(
                "Player",
                (
                    FilterPredicate::eq("class", "mage"),
                    FilterPredicate::gte("level", 10),
                    FilterPredicate::ne("guild", "red"),
                ),
            )
            .unwrap();
        assert_eq!(count, 1);

        let calls = recorder.calls.borrow();
        let Call::Keys(kind, Some(Filter::Composite(composite)), limit) = &calls[0] else {
            panic!("expected key fetch, got {:?}", calls[0]);
        };
        assert_eq!(kind, "Player");
        assert_eq!(*limit, COUNT_CEILING);
        assert_eq!(composite.operator(), CompositeOperator::And);
        assert_eq!(composite.filters().len(), 3);
    }

    #[test]
    fn or_list_builds_query_with_cursor() {
        let recorder = Recorder::default();
        let builder = QueryBuilder::with_config(
            &recorder,
            QueryConfig {
                default_limit: 50,
                ..Default::default()
            },
        );
        let cursor = Cursor::from_bytes(vec![9]);

        builder
            .or_list(
                Some(&cursor),
                "Player",
                (FilterPredicate::eq("a", 1), FilterPredicate::eq("b", 2)),
            )
            .unwrap();

        let expected = Query::new("Player").with_filter(
            Filter::or(vec![
                FilterPredicate::eq("a", 1).into(),
                FilterPredicate::eq("b", 2).into(),
            ])
            .unwrap(),
        );
        assert_eq!(
            *recorder.calls.borrow(),
            vec![Call::Query(expected, 50, Some(cursor))]
        );
    }

    #[test]
    fn children_and_unfiltered_fetches() {
        let recorder = Recorder::default();
        let builder = QueryBuilder::new(&recorder);
        let guild = Key::from_id("Guild", 3, None).unwrap();

        builder.fetch_children(&guild, 25).unwrap();
        builder.list_all("Player").unwrap();

        assert_eq!(
            *recorder.calls.borrow(),
            vec![
                Call::Query(Query::kindless().with_ancestor(guild), 25, None),
                Call::List("Player".to_string(), None, DEFAULT_LIMIT, None),
            ]
        );
    }

    #[test]
    fn store_errors_pass_through() {
        let builder = QueryBuilder::new(Failing);
        assert_eq!(
            builder.filtered_count("Player", FilterPredicate::eq("a", 1)),
            Err("quota exceeded")
        );
        assert_eq!(builder.list_all("Player").unwrap_err(), "quota exceeded");
    }
}
