//! Success response types for REST APIv1
//!
//! These all implement the [`Responder`] trait.
//! The current Pagination support follows the GitHub REST APIv3, i.e. page hints are included inside the Link HTTP header.

use actix_web::body::BoxBody;
use actix_web::http::header::{self, HeaderMap};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Responder};
use serde::Serialize;
use std::collections::HashMap;
use url::Url;

#[derive(Debug, Clone, Serialize)]
pub struct PagePaginationLinks {
    page: i64,
    per_page: i64,
    first: Option<i64>,
    prev: Option<i64>,
    next: Option<i64>,
    last: Option<i64>,
}

impl PagePaginationLinks {
    pub fn new(per_page: i64, page: i64, total: i64) -> Self {
        let first = (page > 1).then_some(1);
        let prev = (page > 1).then_some(page - 1);

        let last_page = {
            let quotient = total / per_page;
            let remainder = total % per_page;
            if (remainder > 0 && per_page > 0) || (remainder < 0 && per_page < 0) {
                quotient + 1
            } else {
                quotient
            }
        };

        let next = (page < last_page).then_some(page + 1);
        let last = (page < last_page).then_some(last_page);

        Self {
            page,
            per_page,
            first,
            prev,
            next,
            last,
        }
    }

    pub fn as_links_vec(&self, url: &Url) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        let mut query = url
            .query_pairs()
            .into_owned()
            .collect::<HashMap<String, String>>();
        query.remove("page");
        let mut url = url.clone();
        let base = url
            .query_pairs_mut()
            .clear()
            .extend_pairs(query.iter())
            .finish();

        let rels = [
            ("first", self.first),
            ("prev", self.prev),
            ("next", self.next),
            ("last", self.last),
        ];

        for (rel, page) in rels {
            if let Some(page) = page {
                let link = base
                    .clone()
                    .query_pairs_mut()
                    .append_pair("page", &page.to_string())
                    .finish()
                    .to_string();
                headers.push((rel.to_string(), link));
            }
        }

        headers
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse<T: Serialize> {
    status: StatusCode,
    pagination: Option<PagePaginationLinks>,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates new [`ApiResponse`] responding with 200 OK
    pub fn new(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            pagination: None,
            data,
        }
    }

    /// Overrides the response status, e.g. 201 Created for creation endpoints
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;

        self
    }

    /// Transforms [`ApiResponse`] to also return page based pagination links.
    pub fn with_page_pagination(mut self, per_page: i64, page: i64, total: i64) -> Self {
        self.pagination = Some(PagePaginationLinks::new(per_page, page, total));

        self
    }
}

impl<T: Serialize> Responder for ApiResponse<T> {
    type Body = BoxBody;

    fn respond_to(self, req: &actix_web::HttpRequest) -> HttpResponse {
        match serde_json::to_string(&self.data) {
            Ok(body) => {
                let url = extract_full_url_from_request(req);

                let mut headers = HeaderMap::new();
                if let Some(links) = match url {
                    Ok(url) => self
                        .pagination
                        .map(|links| vec_to_header_value(links.as_links_vec(&url))),
                    Err(_) => return HttpResponse::InternalServerError().finish(),
                } {
                    match links {
                        Ok(links) => {
                            headers.insert(header::LINK, links);
                        }
                        Err(_) => return HttpResponse::InternalServerError().finish(),
                    }
                }

                let mut response = HttpResponse::build(self.status);
                response.content_type(mime::APPLICATION_JSON);

                for pair in headers {
                    response.insert_header(pair);
                }

                response.body(body)
            }
            Err(err) => {
                HttpResponse::from_error(actix_web::error::JsonPayloadError::Serialize(err))
            }
        }
    }
}

fn vec_to_header_value(
    vec: Vec<(String, String)>,
) -> Result<header::HeaderValue, header::InvalidHeaderValue> {
    let buf = vec
        .iter()
        .map(|(rel, url)| format!("<{url}>; rel=\"{rel}\""))
        .collect::<Vec<_>>()
        .join(",");

    header::HeaderValue::from_str(&buf)
}

fn extract_full_url_from_request(req: &actix_web::HttpRequest) -> Result<Url, anyhow::Error> {
    let conn = req.connection_info();

    let url = Url::parse(&format!(
        "{scheme}://{host}/",
        scheme = conn.scheme(),
        host = conn.host()
    ))?;

    Ok(url.join(&req.uri().to_string())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn first_page_only_links_forward() {
        let links = PagePaginationLinks::new(10, 1, 35);

        assert_eq!(links.first, None);
        assert_eq!(links.prev, None);
        assert_eq!(links.next, Some(2));
        assert_eq!(links.last, Some(4));
    }

    #[test]
    fn last_page_only_links_backward() {
        let links = PagePaginationLinks::new(10, 4, 35);

        assert_eq!(links.first, Some(1));
        assert_eq!(links.prev, Some(3));
        assert_eq!(links.next, None);
        assert_eq!(links.last, None);
    }

    #[test]
    fn responses_default_to_ok() {
        let request = actix_web::test::TestRequest::default().to_http_request();

        let response = ApiResponse::new(serde_json::json!({"id": 1})).respond_to(&request);

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn creation_responses_carry_the_overridden_status() {
        let request = actix_web::test::TestRequest::default().to_http_request();

        let response = ApiResponse::new(serde_json::json!({"id": 1}))
            .with_status(StatusCode::CREATED)
            .respond_to(&request);

        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[test]
    fn link_urls_replace_the_page_parameter() {
        let links = PagePaginationLinks::new(10, 2, 35);
        let url = Url::parse("https://jug.example.org/v1/events?per_page=10&page=2").unwrap();

        let vec = links.as_links_vec(&url);

        let next = vec.iter().find(|(rel, _)| rel == "next").unwrap();
        assert!(next.1.contains("page=3"));
        assert!(next.1.contains("per_page=10"));
        assert!(!next.1.contains("page=2"));
    }
}
