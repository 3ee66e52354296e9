use serde::{Deserialize, Serialize};

/// One scraped listing. Every field is always present; missing data is an
/// empty string or zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRecord {
    pub encid: String,
    pub name: String,
    pub categories: String,
    pub price_range: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub rating: f64,
    pub review_count: i64,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Encid,
    Name,
    Categories,
    PriceRange,
    Phone,
    Address,
    City,
    State,
    ZipCode,
    Country,
    Rating,
    ReviewCount,
    Url,
}

/// Output column order, shared by the CSV header and row layout.
pub const COLUMNS: [Field; 13] = [
    Field::Encid,
    Field::Name,
    Field::Categories,
    Field::PriceRange,
    Field::Phone,
    Field::Address,
    Field::City,
    Field::State,
    Field::ZipCode,
    Field::Country,
    Field::Rating,
    Field::ReviewCount,
    Field::Url,
];

impl Field {
    pub fn id(self) -> &'static str {
        match self {
            Field::Encid => "encid",
            Field::Name => "name",
            Field::Categories => "categories",
            Field::PriceRange => "priceRange",
            Field::Phone => "phone",
            Field::Address => "address",
            Field::City => "city",
            Field::State => "state",
            Field::ZipCode => "zipCode",
            Field::Country => "country",
            Field::Rating => "rating",
            Field::ReviewCount => "reviewCount",
            Field::Url => "url",
        }
    }

    /// Human-readable CSV column title.
    pub fn title(self) -> &'static str {
        match self {
            Field::Encid => "Business ID",
            Field::Name => "Business Name",
            Field::Categories => "Categories",
            Field::PriceRange => "Price Range",
            Field::Phone => "Phone Number",
            Field::Address => "Address",
            Field::City => "City",
            Field::State => "State",
            Field::ZipCode => "ZIP Code",
            Field::Country => "Country",
            Field::Rating => "Rating",
            Field::ReviewCount => "Review Count",
            Field::Url => "URL",
        }
    }
}

impl BusinessRecord {
    /// A record with only the URL-derived fields filled in.
    pub fn for_url(url: &str) -> Self {
        Self {
            encid: encid_from_url(url),
            name: String::new(),
            categories: String::new(),
            price_range: String::new(),
            phone: String::new(),
            address: String::new(),
            city: String::new(),
            state: String::new(),
            zip_code: String::new(),
            country: String::new(),
            rating: 0.0,
            review_count: 0,
            url: url.to_string(),
        }
    }

    /// Render one field as CSV cell text.
    pub fn cell(&self, field: Field) -> String {
        match field {
            Field::Encid => self.encid.clone(),
            Field::Name => self.name.clone(),
            Field::Categories => self.categories.clone(),
            Field::PriceRange => self.price_range.clone(),
            Field::Phone => self.phone.clone(),
            Field::Address => self.address.clone(),
            Field::City => self.city.clone(),
            Field::State => self.state.clone(),
            Field::ZipCode => self.zip_code.clone(),
            Field::Country => self.country.clone(),
            Field::Rating => self.rating.to_string(),
            Field::ReviewCount => self.review_count.to_string(),
            Field::Url => self.url.clone(),
        }
    }

    pub fn csv_row(&self) -> Vec<String> {
        COLUMNS.iter().map(|f| self.cell(*f)).collect()
    }
}

/// Last non-empty path segment of `url`; empty when the URL does not parse.
pub fn encid_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()?
                .filter(|s| !s.is_empty())
                .last()
                .map(str::to_string)
        })
        .unwrap_or_default()
}
