//! Limit/skip paging shared by list endpoints

use serde::Deserialize;

use crate::error::{ApiError, ApiResult};

/// Raw `?limit=&skip=` query values
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

/// Validated window into a result list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub skip: i64,
}

impl PageQuery {
    /// Apply the endpoint's default and ceiling
    ///
    /// Out-of-range values are rejected, not clamped.
    pub fn resolve(&self, default_limit: i64, max_limit: i64) -> ApiResult<Page> {
        let limit = self.limit.unwrap_or(default_limit);
        if limit < 1 || limit > max_limit {
            return Err(ApiError::BadRequest(format!(
                "limit must be between 1 and {}",
                max_limit
            )));
        }
        let skip = self.skip.unwrap_or(0);
        if skip < 0 {
            return Err(ApiError::BadRequest("skip must not be negative".to_string()));
        }
        Ok(Page { limit, skip })
    }
}

/// Split a comma-separated query value, dropping empty items
pub fn split_csv(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
