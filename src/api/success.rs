#![allow(unused)]
use actix_web::HttpResponse;
use std::borrow::Cow;

#[derive(serde::Serialize)]
pub struct SuccessData<T: serde::Serialize> {
    pub data: Option<T>,
    pub message: Option<Cow<'static, str>>,
}

pub struct Success<T: serde::Serialize> {
    pub status: actix_web::http::StatusCode,
    pub body: Option<SuccessData<T>>,
}

impl<T: serde::Serialize> Success<T> {
    pub fn ok(data: Option<T>) -> Self {
        Self {
            status: actix_web::http::StatusCode::OK,
            body: Some(SuccessData { data, message: None }),
        }
    }

    pub fn message<M>(mut self, msg: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        if let Some(body) = &mut self.body {
            body.message = Some(msg.into());
        }
        self
    }

    pub fn created(data: Option<T>) -> Self {
        Self {
            status: actix_web::http::StatusCode::CREATED,
            body: Some(SuccessData { data, message: None }),
        }
    }

    pub fn no_content() -> Self {
        Self { status: actix_web::http::StatusCode::NO_CONTENT, body: None }
    }
}

impl<T: serde::Serialize> actix_web::Responder for Success<T> {
    type Body = actix_web::body::BoxBody;

    fn respond_to(self, _req: &actix_web::HttpRequest) -> HttpResponse<Self::Body> {
        let mut response = HttpResponse::build(self.status);

        match self.body {
            Some(body) => response.json(body),
            None => response.finish(),
        }
    }
}

/// One page of a cursor-paginated listing.
///
/// `next_cursor` is the smallest row id on this page; pass it back as
/// `last_id` to fetch the next one.
#[derive(serde::Serialize)]
pub struct CursorPage<T: serde::Serialize> {
    pub items: Vec<T>,
    pub next_cursor: Option<i64>,
    pub has_more: bool,
}

impl<T: serde::Serialize> CursorPage<T> {
    /// `fetched` is the number of rows read for this page, which may exceed
    /// `items.len()` when some rows had nothing to show.
    pub fn new(items: Vec<T>, next_cursor: Option<i64>, fetched: usize, limit: i64) -> Self {
        let has_more = fetched as i64 >= limit && next_cursor.is_some();
        Self { items, next_cursor, has_more }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_page_reports_more_only_for_full_pages() {
        let full = CursorPage::new(vec![1, 2], Some(7), 3, 3);
        assert!(full.has_more);

        let short = CursorPage::new(vec![1], Some(9), 1, 3);
        assert!(!short.has_more);

        let empty = CursorPage::<i64>::new(Vec::new(), None, 0, 3);
        assert!(!empty.has_more);
    }
}
