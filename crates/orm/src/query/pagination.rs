//! Query Builder pagination operations

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::model::ModelInstance;
use crate::query::builder::ModelQuery;
use crate::query::types::{OrderClause, OrderDirection};

/// `paginate` input; missing fields fall back to the configured defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOptions {
    pub limit: Option<usize>,
    pub page: Option<usize>,
}

impl PageOptions {
    pub fn new(limit: usize, page: usize) -> Self {
        Self {
            limit: Some(limit),
            page: Some(page),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub total_records: i64,
    pub page: usize,
    pub total_pages: i64,
}

/// One page of results
#[derive(Debug, Clone, PartialEq)]
pub struct Paginated {
    pub data: Vec<ModelInstance>,
    pub paging: Paging,
    /// Primary key of the first row of the next page
    pub next_cursor: Option<i64>,
}

impl Paginated {
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "data": self.data.iter().map(ModelInstance::to_json).collect::<Vec<_>>(),
            "paging": {
                "total_records": self.paging.total_records,
                "page": self.paging.page,
                "total_pages": self.paging.total_pages,
            },
            "next_cursor": self.next_cursor,
        })
    }
}

impl ModelQuery {
    /// Add OFFSET clause
    pub fn skip(mut self, count: usize) -> Self {
        self.offset = Some(count);
        self
    }

    /// Add LIMIT clause
    pub fn take(mut self, count: usize) -> Self {
        self.limit = Some(count);
        self
    }

    /// Page `page` of `limit` rows by ascending primary key. One extra row
    /// is fetched to find the next page's cursor.
    pub async fn paginate(&self, options: PageOptions) -> ModelResult<Paginated> {
        let limit = options.limit.unwrap_or(self.db.config().default_page_size);
        let page = options.page.unwrap_or(1);
        if limit == 0 || page == 0 {
            return Err(ModelError::InvalidQueryCondition(format!(
                "paginate expects a positive limit and page, got limit {} and page {}",
                limit, page
            )));
        }

        let mut counter = self.clone();
        counter.limit = None;
        counter.offset = None;
        let total_records = counter.count().await?;

        let mut query = self.clone();
        query.order_by = vec![OrderClause::Column(
            self.qualified_key(),
            OrderDirection::Asc,
        )];
        query.offset = Some((page - 1) * limit);
        query.limit = Some(limit + 1);

        let mut data = query.get().await?;
        let next_cursor = if data.len() > limit {
            data.pop().and_then(|extra| extra.id())
        } else {
            None
        };

        let limit_i64 = limit as i64;
        let total_pages = (total_records + limit_i64 - 1) / limit_i64;
        debug!(
            "Paginated {} page {} of {} ({} records)",
            self.model.name, page, total_pages, total_records
        );

        Ok(Paginated {
            data,
            paging: Paging {
                total_records,
                page,
                total_pages,
            },
            next_cursor,
        })
    }

    /// Process the matched rows in primary-key order, `size` rows at a time
    pub async fn chunk<F>(&self, size: usize, mut callback: F) -> ModelResult<()>
    where
        F: FnMut(Vec<ModelInstance>) -> ModelResult<()>,
    {
        if size == 0 {
            return Err(ModelError::InvalidQueryCondition(
                "chunk size must be positive".to_string(),
            ));
        }

        let mut offset = 0;
        loop {
            let mut query = self.clone();
            query.order_by = vec![OrderClause::Column(
                self.qualified_key(),
                OrderDirection::Asc,
            )];
            query.offset = Some(offset);
            query.limit = Some(size);

            let batch = query.get().await?;
            let fetched = batch.len();
            if fetched > 0 {
                callback(batch)?;
            }
            if fetched < size {
                break;
            }
            offset += size;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_options() {
        let options = PageOptions::new(2, 3);
        assert_eq!(options.limit, Some(2));
        assert_eq!(options.page, Some(3));
        assert_eq!(PageOptions::default().limit, None);

        let parsed: PageOptions = serde_json::from_str(r#"{"limit": 5}"#).unwrap();
        assert_eq!(parsed.limit, Some(5));
        assert_eq!(parsed.page, None);
    }
}
