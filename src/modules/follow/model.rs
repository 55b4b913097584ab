use serde::Deserialize;
use validator::Validate;

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_ID, MAX_PAGE_SIZE};

#[derive(Deserialize, Validate)]
pub struct ListQuery {
    #[validate(range(min = 0, message = "last_id cannot be negative"))]
    pub last_id: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(serde::Serialize)]
pub struct FollowStatusResponse {
    pub is_followed: bool,
}

/// `0` (or anything non-positive) means "no cursor": start from the newest row.
pub fn normalize_cursor(last_id: i64) -> i64 {
    if last_id <= 0 { MAX_ID } else { last_id }
}

/// `0` means the default page size; everything else is clamped to the allowed range.
pub fn normalize_limit(limit: i64) -> i64 {
    if limit == 0 { DEFAULT_PAGE_SIZE } else { limit.clamp(1, MAX_PAGE_SIZE) }
}
