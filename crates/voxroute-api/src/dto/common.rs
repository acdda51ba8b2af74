//! Common DTOs used across the API

use serde::{Deserialize, Serialize};
use validator::Validate;
use voxroute_core::traits::Pagination;

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Response message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a success response with data
    pub fn success(data: T) -> Self {
        Self {
            data,
            message: None,
        }
    }

    /// Create a success response with data and message
    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: Some(message.into()),
        }
    }
}

/// Pagination query parameters
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PaginationParams {
    /// Page number (1-indexed)
    #[serde(default = "default_page", deserialize_with = "deserialize_number_from_string")]
    #[validate(range(min = 1, max = 1000000))]
    pub page: i64,

    /// Items per page
    #[serde(default = "default_per_page", deserialize_with = "deserialize_number_from_string")]
    #[validate(range(min = 1, max = 100))]
    pub per_page: i64,
}

/// Query strings arrive as text; JSON bodies as numbers
fn deserialize_number_from_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct I64OrStringVisitor;

    impl<'de> Visitor<'de> for I64OrStringVisitor {
        type Value = i64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an integer or a string containing an integer")
        }

        fn visit_i64<E>(self, value: i64) -> Result<i64, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<i64, E>
        where
            E: de::Error,
        {
            i64::try_from(value).map_err(de::Error::custom)
        }

        fn visit_str<E>(self, value: &str) -> Result<i64, E>
        where
            E: de::Error,
        {
            value.trim().parse::<i64>().map_err(de::Error::custom)
        }
    }

    deserializer.deserialize_any(I64OrStringVisitor)
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl From<&PaginationParams> for Pagination {
    fn from(params: &PaginationParams) -> Self {
        Pagination::new(params.page, params.per_page)
    }
}
