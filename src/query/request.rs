//! 执行请求与响应

use super::predicate::ValuePredicate;
use crate::error::Error;
use crate::types::{EntityId, QueryId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 执行请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub query_id: QueryId,
    /// 临时过滤条件，与查询做顶层 AND
    #[serde(default)]
    pub filters: Vec<ValuePredicate>,
    #[serde(default)]
    pub options: ExecuteOptions,
}

impl ExecuteRequest {
    pub fn new(query_id: QueryId) -> Self {
        Self {
            query_id,
            filters: Vec::new(),
            options: ExecuteOptions::default(),
        }
    }

    pub fn with_filter(mut self, filter: ValuePredicate) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_options(mut self, options: ExecuteOptions) -> Self {
        self.options = options;
        self
    }
}

/// 分页与排序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
}

impl ExecuteOptions {
    pub fn page(limit: usize, offset: usize) -> Self {
        Self {
            limit: Some(limit),
            offset,
            order_by: None,
        }
    }

    pub fn ordered(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }
}

/// 排序字段，文本形式为 `field` 或 `-field`（降序）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    /// 内置字段：按实体 ID 排序
    pub const ID: &'static str = "id";

    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    pub fn is_id(&self) -> bool {
        self.field == Self::ID
    }
}

impl FromStr for OrderBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, descending) = match s.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        if field.trim().is_empty() {
            return Err(Error::InvalidToken(format!("order_by: {:?}", s)));
        }
        Ok(Self {
            field: field.to_string(),
            descending,
        })
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "-{}", self.field)
        } else {
            write!(f, "{}", self.field)
        }
    }
}

impl Serialize for OrderBy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OrderBy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 执行响应；`count` 为分页前的总数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub results: Vec<EntityId>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Lookup;
    use crate::types::PathId;

    #[test]
    fn test_order_by_parse() {
        let o: OrderBy = "-price".parse().unwrap();
        assert_eq!(o, OrderBy::desc("price"));
        assert_eq!(o.to_string(), "-price");
        assert!("id".parse::<OrderBy>().unwrap().is_id());
        assert!("-".parse::<OrderBy>().is_err());
        assert!("".parse::<OrderBy>().is_err());
    }

    #[test]
    fn test_request_wire_format() {
        let json = r#"{
            "query_id": 3,
            "filters": [{"path_id": 1, "lookup": "eq", "values": ["red"]}],
            "options": {"limit": 10, "offset": 5, "order_by": "-price"}
        }"#;
        let req: ExecuteRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.query_id, QueryId::new(3));
        assert_eq!(req.filters.len(), 1);
        assert_eq!(req.filters[0].path_id, PathId::new(1));
        assert_eq!(req.filters[0].lookup, Lookup::Eq);
        assert_eq!(req.options.limit, Some(10));
        assert_eq!(req.options.offset, 5);
        assert_eq!(req.options.order_by, Some(OrderBy::desc("price")));

        let minimal: ExecuteRequest = serde_json::from_str(r#"{"query_id": 1}"#).unwrap();
        assert_eq!(minimal, ExecuteRequest::new(QueryId::new(1)));
    }

    #[test]
    fn test_response_serialize() {
        let resp = ExecuteResponse {
            results: vec![1, 2],
            count: 7,
        };
        assert_eq!(
            serde_json::to_string(&resp).unwrap(),
            r#"{"results":[1,2],"count":7}"#
        );
    }
}
