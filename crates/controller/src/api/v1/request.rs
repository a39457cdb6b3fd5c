//! Pagination Query types
//!
//! Great blogposts are: <https://phauer.com/2015/restful-api-design-best-practices/> and <https://phauer.com/2018/web-api-pagination-timestamp-id-continuation-token/>
use serde::Deserialize;

/// Page-based pagination query
#[derive(Deserialize)]
pub struct PagePaginationQuery {
    #[serde(
        default = "default_pagination_per_page",
        deserialize_with = "deserialize_pagination_per_page"
    )]
    pub per_page: u64,
    #[serde(
        default = "default_pagination_page",
        deserialize_with = "deserialize_pagination_page"
    )]
    pub page: u64,
}

fn default_pagination_per_page() -> u64 {
    30
}

/// Enforce the per_page setting to be <100
fn deserialize_pagination_per_page<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let per_page = u64::deserialize(deserializer)?;
    if per_page <= 100 {
        Ok(per_page)
    } else {
        Err(serde::de::Error::custom("per_page too large"))
    }
}

/// Enforce the page setting to be a valid page number
///
/// Pages are 1-based, a page of 0 would produce a negative database offset.
fn deserialize_pagination_page<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let page = u64::deserialize(deserializer)?;
    if (1..=i64::MAX as u64).contains(&page) {
        Ok(page)
    } else {
        Err(serde::de::Error::custom("invalid page number"))
    }
}

fn default_pagination_page() -> u64 {
    1
}
