use shared::domain::{CategoryId, Money, SubCategoryId};

use crate::{error::ClientError, transport::CatalogRequest};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_RATING: u8 = 5;

const PRODUCTS_PATH: &str = "/api/products";
const CATEGORY_PATH: &str = "/api/products/catId";
const SUB_CATEGORY_PATH: &str = "/api/products/subCatId";
// Path spelling matches the deployed API.
const PRICE_RANGE_PATH: &str = "/api/products/fiterByPrice";
const RATING_PATH: &str = "/api/products/rating";
const SEARCH_PATH: &str = "/api/search";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CatalogScope {
    Category(CategoryId),
    SubCategory(SubCategoryId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    All,
    Category,
    SubCategory,
    PriceRange,
    Rating,
    Search,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FilterSelector {
    #[default]
    All,
    Category(CategoryId),
    SubCategory(SubCategoryId),
    PriceRange {
        min: Money,
        max: Money,
        scope: Option<CatalogScope>,
    },
    Rating {
        rating: u8,
        scope: Option<CatalogScope>,
    },
    Search(String),
}

/// What the catalog is showing. Replaced wholesale on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub selector: FilterSelector,
    pub location: Option<String>,
}

impl FilterState {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn category(id: CategoryId) -> Self {
        Self::from_selector(FilterSelector::Category(id))
    }

    pub fn sub_category(id: SubCategoryId) -> Self {
        Self::from_selector(FilterSelector::SubCategory(id))
    }

    pub fn price_range(min: Money, max: Money, scope: Option<CatalogScope>) -> Self {
        Self::from_selector(FilterSelector::PriceRange { min, max, scope })
    }

    pub fn rating(rating: u8, scope: Option<CatalogScope>) -> Self {
        Self::from_selector(FilterSelector::Rating { rating, scope })
    }

    pub fn search(text: impl Into<String>) -> Self {
        Self::from_selector(FilterSelector::Search(text.into()))
    }

    fn from_selector(selector: FilterSelector) -> Self {
        Self {
            selector,
            location: None,
        }
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn mode(&self) -> FilterMode {
        match &self.selector {
            FilterSelector::All => FilterMode::All,
            FilterSelector::Category(_) => FilterMode::Category,
            FilterSelector::SubCategory(_) => FilterMode::SubCategory,
            FilterSelector::PriceRange { .. } => FilterMode::PriceRange,
            FilterSelector::Rating { .. } => FilterMode::Rating,
            FilterSelector::Search(_) => FilterMode::Search,
        }
    }

    /// Price, rating and search listings come back whole.
    pub fn is_paged(&self) -> bool {
        matches!(
            self.mode(),
            FilterMode::All | FilterMode::Category | FilterMode::SubCategory
        )
    }

    /// Category or subcategory the filter is narrowed to, if any. Price and
    /// rating filters inherit this scope from the filter they replace.
    pub fn scope(&self) -> Option<CatalogScope> {
        match &self.selector {
            FilterSelector::Category(id) => Some(CatalogScope::Category(id.clone())),
            FilterSelector::SubCategory(id) => Some(CatalogScope::SubCategory(id.clone())),
            FilterSelector::PriceRange { scope, .. } | FilterSelector::Rating { scope, .. } => {
                scope.clone()
            }
            FilterSelector::All | FilterSelector::Search(_) => None,
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        match &self.selector {
            FilterSelector::PriceRange { min, max, .. } if min > max => Err(
                ClientError::validation(format!("price range minimum {min} exceeds maximum {max}")),
            ),
            FilterSelector::Rating { rating, .. } if *rating > MAX_RATING => Err(
                ClientError::validation(format!("rating {rating} is above {MAX_RATING}")),
            ),
            _ => Ok(()),
        }
    }

    pub fn to_request(&self, page: PageState) -> CatalogRequest {
        let mut request = match &self.selector {
            FilterSelector::All => CatalogRequest::new(PRODUCTS_PATH),
            FilterSelector::Category(id) => {
                CatalogRequest::new(CATEGORY_PATH).param("catId", id.as_str())
            }
            FilterSelector::SubCategory(id) => {
                CatalogRequest::new(SUB_CATEGORY_PATH).param("subCatId", id.as_str())
            }
            FilterSelector::PriceRange { min, max, scope } => {
                let request = CatalogRequest::new(PRICE_RANGE_PATH)
                    .param("minPrice", min.to_string())
                    .param("maxPrice", max.to_string());
                with_scope(request, scope.as_ref())
            }
            FilterSelector::Rating { rating, scope } => {
                let request = CatalogRequest::new(RATING_PATH).param("rating", rating.to_string());
                with_scope(request, scope.as_ref())
            }
            FilterSelector::Search(text) => {
                return CatalogRequest::new(SEARCH_PATH).param("q", text.trim());
            }
        };

        if self.mode() != FilterMode::All {
            if let Some(location) = &self.location {
                request = request.param("location", location.as_str());
            }
        }

        if self.is_paged() {
            request = request
                .param("page", page.page().to_string())
                .param("perPage", page.per_page().to_string());
        }

        request
    }
}

fn with_scope(request: CatalogRequest, scope: Option<&CatalogScope>) -> CatalogRequest {
    match scope {
        Some(CatalogScope::Category(id)) => request.param("catId", id.as_str()),
        Some(CatalogScope::SubCategory(id)) => request.param("subCatId", id.as_str()),
        None => request,
    }
}

/// Requested page, always queried together with a [`FilterState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageState {
    page: u32,
    per_page: u32,
}

impl PageState {
    pub fn new(page: u32, per_page: u32) -> Result<Self, ClientError> {
        if page == 0 {
            return Err(ClientError::validation("page must be at least 1"));
        }
        if per_page == 0 {
            return Err(ClientError::validation("perPage must be at least 1"));
        }
        Ok(Self { page, per_page })
    }

    pub fn first(per_page: u32) -> Result<Self, ClientError> {
        Self::new(1, per_page)
    }

    pub fn page(self) -> u32 {
        self.page
    }

    pub fn per_page(self) -> u32 {
        self.per_page
    }

    /// Caller guarantees `page >= 1`.
    pub(crate) fn at(self, page: u32) -> Self {
        debug_assert!(page >= 1);
        Self {
            page: page.max(1),
            per_page: self.per_page,
        }
    }

    pub(crate) fn rewound(self) -> Self {
        Self {
            page: 1,
            per_page: self.per_page,
        }
    }
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(page: u32, per_page: u32) -> PageState {
        PageState::new(page, per_page).expect("page")
    }

    #[test]
    fn unfiltered_catalog_is_paged() {
        let request = FilterState::all().to_request(page(3, 12));
        assert_eq!(request.describe(), "/api/products?page=3&perPage=12");
    }

    #[test]
    fn category_request_carries_location_and_paging() {
        let request = FilterState::category(CategoryId::new("shoes"))
            .with_location(Some("Lagos".into()))
            .to_request(page(1, 20));
        assert_eq!(
            request.describe(),
            "/api/products/catId?catId=shoes&location=Lagos&page=1&perPage=20"
        );
    }

    #[test]
    fn blank_location_is_dropped() {
        let filter = FilterState::sub_category(SubCategoryId::new("boots"))
            .with_location(Some("  ".into()));
        assert_eq!(filter.location, None);
        assert_eq!(
            filter.to_request(page(2, 5)).describe(),
            "/api/products/subCatId?subCatId=boots&page=2&perPage=5"
        );
    }

    #[test]
    fn price_range_uses_scope_without_paging() {
        let scope = Some(CatalogScope::SubCategory(SubCategoryId::new("bags")));
        let request = FilterState::price_range(Money(100), Money(900), scope)
            .with_location(Some("Accra".into()))
            .to_request(page(4, 10));
        assert_eq!(
            request.describe(),
            "/api/products/fiterByPrice?minPrice=100&maxPrice=900&subCatId=bags&location=Accra"
        );
    }

    #[test]
    fn only_listing_modes_are_paged() {
        assert!(FilterState::all().is_paged());
        assert!(FilterState::category(CategoryId::new("shoes")).is_paged());
        assert!(!FilterState::price_range(Money(1), Money(2), None).is_paged());
        assert!(!FilterState::rating(3, None).is_paged());
        assert!(!FilterState::search("hat").is_paged());
    }

    #[test]
    fn rating_request_uses_category_scope() {
        let scope = Some(CatalogScope::Category(CategoryId::new("shoes")));
        let request = FilterState::rating(4, scope).to_request(PageState::default());
        assert_eq!(request.describe(), "/api/products/rating?rating=4&catId=shoes");
    }

    #[test]
    fn search_sends_only_the_trimmed_text() {
        let request = FilterState::search("  red shoes ")
            .with_location(Some("Lagos".into()))
            .to_request(PageState::default());
        assert_eq!(request.describe(), "/api/search?q=red+shoes");
    }

    #[test]
    fn invalid_filters_are_rejected() {
        assert!(matches!(
            FilterState::price_range(Money(10), Money(5), None).validate(),
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            FilterState::rating(6, None).validate(),
            Err(ClientError::Validation(_))
        ));
        assert!(FilterState::rating(5, None).validate().is_ok());
    }

    #[test]
    fn page_state_rejects_zero() {
        assert!(PageState::new(0, 10).is_err());
        assert!(PageState::new(1, 0).is_err());
        assert_eq!(page(7, 9).rewound(), page(1, 9));
    }
}
