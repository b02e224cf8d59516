use serde::{Deserialize, Serialize};

use crate::CatalogError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    // Market overview
    MedianPrice,
    PriceChange,
    DaysOnMarket,
    Inventory,
    MonthsSupply,
    // Transactions
    TotalSales,
    NewListings,
    PendingSales,
    ClosedSales,
    // Price
    ListVsSold,
    PricePerSqft,
    PriceCuts,
    // Affordability
    AffordabilityIndex,
    MortgageRates,
    IncomeToPrice,
    // Forecast
    MarketHeat,
    AppreciationForecast,
    // Property types
    SingleFamily,
    Condo,
    Townhouse,
    MultiFamily,
    // Listing status
    ForSale,
    Sold,
    Foreclosure,
    NewConstruction,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricCategory {
    MarketOverview,
    Transactions,
    PriceMetrics,
    Affordability,
    MarketForecast,
    PropertyTypes,
    ListingStatus,
}

impl MetricCategory {
    pub const ALL: [MetricCategory; 7] = [
        MetricCategory::MarketOverview,
        MetricCategory::Transactions,
        MetricCategory::PriceMetrics,
        MetricCategory::Affordability,
        MetricCategory::MarketForecast,
        MetricCategory::PropertyTypes,
        MetricCategory::ListingStatus,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MetricCategory::MarketOverview => "Market Overview",
            MetricCategory::Transactions => "Transactions",
            MetricCategory::PriceMetrics => "Price Metrics",
            MetricCategory::Affordability => "Affordability",
            MetricCategory::MarketForecast => "Market Forecast",
            MetricCategory::PropertyTypes => "Property Types",
            MetricCategory::ListingStatus => "Listing Status",
        }
    }

    pub fn metrics(self) -> impl Iterator<Item = MetricKind> {
        METRICS
            .iter()
            .filter(move |m| m.category == self)
            .map(|m| m.kind)
    }
}

/// How a metric's raw value is rendered for humans.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ValueFormat {
    Currency,
    CurrencyPerSqft,
    Percent,
    Days,
    Months,
    Number,
}

/// Inclusive range of plausible values for a metric.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ValueDomain {
    pub min: f64,
    pub max: f64,
}

impl ValueDomain {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    pub kind: MetricKind,
    pub id: &'static str,
    pub name: &'static str,
    pub category: MetricCategory,
    pub domain: ValueDomain,
    pub format: ValueFormat,
    /// Bucket colors; `palette.len()` is `steps.len()` or more.
    pub palette: &'static [&'static str],
    /// Ascending bucket thresholds.
    pub steps: &'static [f64],
}

const GREENS: &[&str] = &["#e5f5e0", "#a1d99b", "#41ab5d", "#006d2c"];
const RED_TO_GREEN: &[&str] = &[
    "#d73027", "#f46d43", "#fdae61", "#fee08b", "#d9ef8b", "#a6d96a", "#66bd63",
];
const GREEN_TO_PURPLE: &[&str] = &["#d9ef8b", "#a6d96a", "#66bd63", "#3288bd", "#5e4fa2"];
const BLUES: &[&str] = &["#eff3ff", "#bdd7e7", "#6baed6", "#3182bd", "#08519c"];
const ORANGES: &[&str] = &["#feedde", "#fdbe85", "#fd8d3c", "#e6550d", "#a63603"];
const PURPLES: &[&str] = &[
    "#f2f0f7", "#dadaeb", "#bcbddc", "#9e9ac8", "#756bb1", "#54278f",
];
const PINKS: &[&str] = &["#feebe2", "#fbb4b9", "#f768a1", "#c51b8a", "#7a0177"];
const YELLOW_TO_RED: &[&str] = &[
    "#ffffcc", "#ffeda0", "#fed976", "#feb24c", "#fd8d3c", "#fc4e2a", "#e31a1c", "#b10026",
];
const BLUE_GREENS: &[&str] = &["#edf8fb", "#b2e2e2", "#66c2a4", "#2ca25f", "#006d2c"];
const BLUE_PURPLES: &[&str] = &[
    "#f7fcfd", "#e0ecf4", "#bfd3e6", "#9ebcda", "#8c96c6", "#8c6bb1", "#88419d", "#6e016b",
];
const BLUE_PURPLES_SHORT: &[&str] = &[
    "#f7fcfd", "#e0ecf4", "#bfd3e6", "#9ebcda", "#8c96c6", "#8c6bb1", "#88419d",
];

const fn spec(
    kind: MetricKind,
    id: &'static str,
    name: &'static str,
    category: MetricCategory,
    domain: (f64, f64),
    format: ValueFormat,
    palette: &'static [&'static str],
    steps: &'static [f64],
) -> MetricSpec {
    MetricSpec {
        kind,
        id,
        name,
        category,
        domain: ValueDomain::new(domain.0, domain.1),
        format,
        palette,
        steps,
    }
}

use MetricCategory as C;
use MetricKind as K;
use ValueFormat as F;

/// Indexed by `MetricKind as usize`.
#[rustfmt::skip]
pub static METRICS: [MetricSpec; 25] = [
    spec(K::MedianPrice, "median_price", "Median Price", C::MarketOverview, (200_000.0, 1_500_000.0), F::Currency, GREENS, &[200_000.0, 500_000.0, 800_000.0, 1_200_000.0]),
    spec(K::PriceChange, "price_change", "Price Change (%)", C::MarketOverview, (-15.0, 20.0), F::Percent, RED_TO_GREEN, &[-10.0, -5.0, 0.0, 5.0, 10.0, 15.0]),
    spec(K::DaysOnMarket, "days_on_market", "Days on Market", C::MarketOverview, (10.0, 120.0), F::Days, BLUES, &[20.0, 40.0, 60.0, 80.0]),
    spec(K::Inventory, "inventory", "Active Inventory", C::MarketOverview, (50.0, 5_000.0), F::Number, ORANGES, &[100.0, 500.0, 1_000.0, 2_000.0]),
    spec(K::MonthsSupply, "months_supply", "Months of Supply", C::MarketOverview, (1.0, 12.0), F::Months, ORANGES, &[2.0, 4.0, 6.0, 8.0]),
    spec(K::TotalSales, "total_sales", "Total Sales", C::Transactions, (20.0, 5_000.0), F::Number, PURPLES, &[100.0, 500.0, 1_000.0, 2_000.0, 4_000.0]),
    spec(K::NewListings, "new_listings", "New Listings", C::Transactions, (10.0, 3_000.0), F::Number, PURPLES, &[50.0, 200.0, 500.0, 1_000.0, 2_000.0]),
    spec(K::PendingSales, "pending_sales", "Pending Sales", C::Transactions, (15.0, 2_500.0), F::Number, PURPLES, &[50.0, 200.0, 500.0, 1_000.0, 2_000.0]),
    spec(K::ClosedSales, "closed_sales", "Closed Sales", C::Transactions, (10.0, 4_500.0), F::Number, PURPLES, &[50.0, 200.0, 500.0, 1_000.0, 2_000.0]),
    spec(K::ListVsSold, "list_vs_sold", "List vs. Sold Price", C::PriceMetrics, (90.0, 110.0), F::Percent, RED_TO_GREEN, &[92.0, 96.0, 98.0, 100.0, 102.0, 104.0]),
    spec(K::PricePerSqft, "price_per_sqft", "Price per Sq.Ft.", C::PriceMetrics, (100.0, 1_200.0), F::CurrencyPerSqft, GREENS, &[200.0, 400.0, 600.0, 800.0]),
    spec(K::PriceCuts, "price_cuts", "Price Reductions", C::PriceMetrics, (5.0, 60.0), F::Percent, GREEN_TO_PURPLE, &[10.0, 20.0, 30.0, 40.0]),
    spec(K::AffordabilityIndex, "affordability_index", "Affordability Index", C::Affordability, (60.0, 180.0), F::Number, PINKS, &[80.0, 100.0, 120.0, 140.0]),
    spec(K::MortgageRates, "mortgage_rates", "Mortgage Rates", C::Affordability, (3.0, 8.0), F::Percent, PINKS, &[3.0, 4.0, 5.0, 6.0, 7.0]),
    spec(K::IncomeToPrice, "income_to_price", "Income to Price Ratio", C::Affordability, (20.0, 60.0), F::Percent, PINKS, &[25.0, 35.0, 45.0, 55.0]),
    spec(K::MarketHeat, "market_heat", "Market Heat Index", C::MarketForecast, (1.0, 100.0), F::Number, YELLOW_TO_RED, &[20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0]),
    spec(K::AppreciationForecast, "appreciation_forecast", "Appreciation Forecast", C::MarketForecast, (-5.0, 15.0), F::Percent, RED_TO_GREEN, &[-5.0, -2.0, 0.0, 2.0, 5.0, 8.0]),
    spec(K::SingleFamily, "single_family", "Single Family", C::PropertyTypes, (10.0, 3_000.0), F::Number, BLUE_GREENS, &[50.0, 200.0, 500.0, 1_000.0]),
    spec(K::Condo, "condo", "Condos/Co-ops", C::PropertyTypes, (5.0, 2_000.0), F::Number, BLUE_GREENS, &[20.0, 100.0, 300.0, 700.0]),
    spec(K::Townhouse, "townhouse", "Townhomes", C::PropertyTypes, (3.0, 1_500.0), F::Number, BLUE_GREENS, &[10.0, 50.0, 200.0, 500.0]),
    spec(K::MultiFamily, "multi_family", "Multi-Family", C::PropertyTypes, (1.0, 1_000.0), F::Number, BLUE_GREENS, &[5.0, 25.0, 100.0, 300.0]),
    spec(K::ForSale, "for_sale", "For Sale", C::ListingStatus, (20.0, 5_000.0), F::Number, BLUE_PURPLES, &[50.0, 200.0, 500.0, 1_000.0, 2_000.0, 3_000.0, 4_000.0]),
    spec(K::Sold, "sold", "Recently Sold", C::ListingStatus, (10.0, 4_000.0), F::Number, BLUE_PURPLES, &[50.0, 200.0, 500.0, 1_000.0, 2_000.0, 3_000.0, 4_000.0]),
    spec(K::Foreclosure, "foreclosure", "Foreclosures", C::ListingStatus, (0.0, 500.0), F::Number, BLUE_PURPLES_SHORT, &[10.0, 50.0, 100.0, 200.0, 300.0, 400.0]),
    spec(K::NewConstruction, "new_construction", "New Construction", C::ListingStatus, (0.0, 1_000.0), F::Number, BLUE_PURPLES_SHORT, &[20.0, 100.0, 200.0, 400.0, 600.0, 800.0]),
];

impl MetricKind {
    pub fn all() -> impl Iterator<Item = MetricKind> {
        METRICS.iter().map(|m| m.kind)
    }

    pub fn spec(self) -> &'static MetricSpec {
        &METRICS[self as usize]
    }

    pub fn id(self) -> &'static str {
        self.spec().id
    }

    pub fn display_name(self) -> &'static str {
        self.spec().name
    }

    pub fn parse(id: &str) -> Result<Self, CatalogError> {
        METRICS
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.kind)
            .ok_or_else(|| CatalogError::UnknownMetric(id.to_string()))
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::parse(s)
    }
}
