use chrono::NaiveDate;
use serde::Deserialize;
use unipool_core::{Page, RideQuery};

const MAX_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl PageParams {
    pub fn page(&self) -> Page {
        page(self.skip, self.limit)
    }
}

/// `?status=PENDING&skip=0&limit=20`
#[derive(Debug, Deserialize)]
pub struct ListParams<S> {
    pub status: Option<S>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl<S> ListParams<S> {
    pub fn page(&self) -> Page {
        page(self.skip, self.limit)
    }
}

/// Flat query string form of `RideQuery`
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub date: Option<NaiveDate>,
    pub min_seats: Option<i32>,
    pub max_price_cents: Option<i32>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl From<SearchParams> for RideQuery {
    fn from(params: SearchParams) -> Self {
        RideQuery {
            page: page(params.skip, params.limit),
            origin: params.origin.filter(|s| !s.trim().is_empty()),
            destination: params.destination.filter(|s| !s.trim().is_empty()),
            date: params.date,
            min_seats: params.min_seats,
            max_price_cents: params.max_price_cents,
        }
    }
}

fn page(skip: Option<usize>, limit: Option<usize>) -> Page {
    let default = Page::default();
    Page::new(
        skip.unwrap_or(default.skip),
        limit.unwrap_or(default.limit),
    )
    .clamped(MAX_PAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_capped() {
        let params = PageParams { skip: Some(40), limit: Some(5000) };
        assert_eq!(params.page(), Page::new(40, MAX_PAGE));
    }

    #[test]
    fn test_blank_text_filters_are_dropped() {
        let query = RideQuery::from(SearchParams {
            origin: Some("  ".to_string()),
            destination: Some("LUMS".to_string()),
            date: None,
            min_seats: Some(2),
            max_price_cents: None,
            skip: None,
            limit: None,
        });

        assert_eq!(query.origin, None);
        assert_eq!(query.destination.as_deref(), Some("LUMS"));
        assert_eq!(query.page, Page::default());
    }
}
