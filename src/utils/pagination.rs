use serde::Serialize;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: Pagination, total: i64) -> Self {
        let per_page = pagination.per_page as i64;
        Self {
            items,
            page: pagination.page,
            per_page: pagination.per_page,
            total,
            total_pages: (total.max(0) + per_page - 1) / per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        assert_eq!(Pagination::new(None, None), Pagination { page: 1, per_page: 20 });
        assert_eq!(Pagination::new(Some(0), Some(0)), Pagination { page: 1, per_page: 1 });
        assert_eq!(Pagination::new(Some(3), Some(500)).per_page, MAX_PER_PAGE);
    }

    #[test]
    fn offset_follows_page() {
        let p = Pagination::new(Some(3), Some(25));
        assert_eq!(p.offset(), 50);
        assert_eq!(p.limit(), 25);
    }

    #[test]
    fn total_pages_rounds_up() {
        let p = Pagination::new(Some(1), Some(10));
        assert_eq!(Page::new(Vec::<u8>::new(), p, 0).total_pages, 0);
        assert_eq!(Page::new(Vec::<u8>::new(), p, 10).total_pages, 1);
        assert_eq!(Page::new(Vec::<u8>::new(), p, 11).total_pages, 2);
    }
}
