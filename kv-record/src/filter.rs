use std::cmp::Ordering;
use std::fmt;

use crate::{error::Error, key::Key, record::Entity, value::Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    In,
}

impl FilterOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            FilterOperator::Equal => "=",
            FilterOperator::NotEqual => "!=",
            FilterOperator::LessThan => "<",
            FilterOperator::LessThanOrEqual => "<=",
            FilterOperator::GreaterThan => ">",
            FilterOperator::GreaterThanOrEqual => ">=",
            FilterOperator::In => "IN",
        }
    }

    fn test(self, actual: &Value, expected: &Value) -> bool {
        let ordering = || actual.compare(expected);
        match self {
            FilterOperator::Equal => ordering() == Some(Ordering::Equal),
            // 不同类型视为不相等
            FilterOperator::NotEqual => ordering() != Some(Ordering::Equal),
            FilterOperator::LessThan => ordering() == Some(Ordering::Less),
            FilterOperator::LessThanOrEqual => {
                matches!(ordering(), Some(Ordering::Less | Ordering::Equal))
            }
            FilterOperator::GreaterThan => ordering() == Some(Ordering::Greater),
            FilterOperator::GreaterThanOrEqual => {
                matches!(ordering(), Some(Ordering::Greater | Ordering::Equal))
            }
            FilterOperator::In => match expected {
                Value::List(options) => options
                    .iter()
                    .any(|option| FilterOperator::Equal.test(actual, option)),
                single => FilterOperator::Equal.test(actual, single),
            },
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// 单个谓词：属性 操作符 值
#[derive(Clone, Debug, PartialEq)]
pub struct FilterPredicate {
    property: String,
    operator: FilterOperator,
    value: Value,
}

impl FilterPredicate {
    pub fn new(
        property: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<Value>,
    ) -> Self {
        FilterPredicate {
            property: property.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterOperator::Equal, value)
    }

    pub fn ne(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterOperator::NotEqual, value)
    }

    pub fn lt(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterOperator::LessThan, value)
    }

    pub fn lte(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterOperator::LessThanOrEqual, value)
    }

    pub fn gt(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterOperator::GreaterThan, value)
    }

    pub fn gte(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterOperator::GreaterThanOrEqual, value)
    }

    pub fn in_(property: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(property, FilterOperator::In, Value::List(values))
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// 缺失或未建索引的属性不参与过滤；多值属性任一元素满足即可
    pub fn matches(&self, entity: &Entity) -> bool {
        let Some(property) = entity.property(&self.property) else {
            return false;
        };
        if property.is_unindexed() {
            return false;
        }
        match property.value() {
            Value::List(items) => items
                .iter()
                .any(|item| self.operator.test(item, &self.value)),
            value => self.operator.test(value, &self.value),
        }
    }
}

impl fmt::Display for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.property, self.operator, self.value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompositeOperator {
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompositeFilter {
    operator: CompositeOperator,
    filters: Vec<Filter>,
}

impl CompositeFilter {
    pub fn operator(&self) -> CompositeOperator {
        self.operator
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Predicate(FilterPredicate),
    Composite(CompositeFilter),
}

impl Filter {
    pub fn and(filters: Vec<Filter>) -> Result<Self, Error> {
        Self::composite(CompositeOperator::And, filters)
    }

    pub fn or(filters: Vec<Filter>) -> Result<Self, Error> {
        Self::composite(CompositeOperator::Or, filters)
    }

    fn composite(operator: CompositeOperator, filters: Vec<Filter>) -> Result<Self, Error> {
        if filters.len() < 2 {
            return Err(Error::InvalidFilter(format!(
                "{:?} needs at least two filters, got {}",
                operator,
                filters.len()
            )));
        }
        Ok(Self::composite_unchecked(operator, filters))
    }

    pub(crate) fn composite_unchecked(operator: CompositeOperator, filters: Vec<Filter>) -> Self {
        Filter::Composite(CompositeFilter { operator, filters })
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Filter::Predicate(predicate) => predicate.matches(entity),
            Filter::Composite(composite) => match composite.operator {
                CompositeOperator::And => composite.filters.iter().all(|f| f.matches(entity)),
                CompositeOperator::Or => composite.filters.iter().any(|f| f.matches(entity)),
            },
        }
    }
}

impl From<FilterPredicate> for Filter {
    fn from(predicate: FilterPredicate) -> Self {
        Filter::Predicate(predicate)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Predicate(predicate) => write!(f, "{}", predicate),
            Filter::Composite(composite) => {
                let joiner = match composite.operator {
                    CompositeOperator::And => " AND ",
                    CompositeOperator::Or => " OR ",
                };
                f.write_str("(")?;
                for (i, filter) in composite.filters.iter().enumerate() {
                    if i > 0 {
                        f.write_str(joiner)?;
                    }
                    write!(f, "{}", filter)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// 完整查询：可选 kind、可选过滤条件、可选祖先
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    kind: Option<String>,
    filter: Option<Filter>,
    ancestor: Option<Key>,
}

impl Query {
    pub fn new(kind: impl Into<String>) -> Self {
        Query {
            kind: Some(kind.into()),
            ..Default::default()
        }
    }

    /// 不限 kind，通常配合祖先查询
    pub fn kindless() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_ancestor(mut self, ancestor: Key) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn ancestor(&self) -> Option<&Key> {
        self.ancestor.as_ref()
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if let Some(kind) = &self.kind {
            if entity.key().kind() != kind {
                return false;
            }
        }
        if let Some(ancestor) = &self.ancestor {
            if !entity.key().has_ancestor(ancestor) {
                return false;
            }
        }
        self.filter.as_ref().is_none_or(|filter| filter.matches(entity))
    }
}
