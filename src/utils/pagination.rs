use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Raw `page`/`limit` query values. Kept as text so that junk input falls
/// back to the defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn offset(&self) -> i64 {
        // Saturates so an absurd page lands past the last row.
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            0
        } else {
            (total + self.limit - 1) / self.limit
        }
    }
}

impl PageQuery {
    pub fn resolve(&self) -> Page {
        let page = parse_number(self.page.as_deref()).unwrap_or(1).max(1);
        let limit = parse_number(self.limit.as_deref())
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        Page { page, limit }
    }
}

fn parse_number(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: i64, page: Page) -> Self {
        Self {
            data,
            total,
            page: page.page,
            total_pages: page.total_pages(total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<&str>, limit: Option<&str>) -> PageQuery {
        PageQuery {
            page: page.map(str::to_string),
            limit: limit.map(str::to_string),
        }
    }

    #[test]
    fn defaults_when_absent_or_unparseable() {
        assert_eq!(query(None, None).resolve(), Page { page: 1, limit: 10 });
        assert_eq!(
            query(Some("abc"), Some("")).resolve(),
            Page { page: 1, limit: 10 }
        );
    }

    #[test]
    fn clamps_limit_and_floors_page() {
        assert_eq!(query(None, Some("1000")).resolve().limit, 100);
        assert_eq!(query(None, Some("0")).resolve().limit, 1);
        assert_eq!(query(None, Some("-5")).resolve().limit, 1);
        assert_eq!(query(Some("0"), None).resolve().page, 1);
        assert_eq!(query(Some("-3"), None).resolve().page, 1);
        assert_eq!(query(Some("4"), Some("25")).resolve(), Page { page: 4, limit: 25 });
    }

    #[test]
    fn offset_skips_previous_pages() {
        let page = Page { page: 3, limit: 20 };
        assert_eq!(page.offset(), 40);
    }

    #[test]
    fn huge_page_numbers_do_not_overflow() {
        let page = query(Some("9223372036854775807"), Some("10")).resolve();
        assert_eq!(page.page, i64::MAX);
        assert_eq!(page.offset(), i64::MAX);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Page { page: 1, limit: 10 };
        assert_eq!(page.total_pages(0), 0);
        assert_eq!(page.total_pages(1), 1);
        assert_eq!(page.total_pages(10), 1);
        assert_eq!(page.total_pages(11), 2);
    }

    #[test]
    fn envelope_uses_client_field_names() {
        let body = Paginated::new(vec![1, 2], 12, Page { page: 2, limit: 2 });
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["totalPages"], 6);
        assert_eq!(json["page"], 2);
        assert_eq!(json["total"], 12);
    }
}
