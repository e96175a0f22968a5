//! SalesForge: point-of-sale sales analytics and transaction segmentation
//!
//! Raw transaction rows are normalized into canonical records, enriched with
//! time, sales and store features, summarized into trend and ranking tables,
//! and clustered with K-Means over standardized purchase-behavior vectors.

pub mod analysis;
pub mod cli;
pub mod error;
pub mod features;
pub mod frame;
pub mod model;
pub mod preprocess;
pub mod records;
pub mod report;
pub mod source;

// Re-export public items for easier access
pub use analysis::{
    analyze_product_performance, analyze_sales_trends, analyze_store_performance, growth_rate,
    monthly_sales, ProductMetric, SalesTrendSummary, StoreMetric,
};
pub use cli::Args;
pub use error::AnalysisError;
pub use features::{add_sales_features, add_store_features, add_time_features, engineer_features};
pub use model::{
    segment_customers, segment_customers_with, summarize_segments, ClusterFit, ClusterModel,
    ClusterStrategy, CustomerSegment, KMeansStrategy,
};
pub use preprocess::{check_quality, preprocess, QualityReport};
pub use records::{CanonicalRecord, EnrichedRecord, TimePeriod, TransactionRecord};
pub use report::{build_report, SalesReport};
pub use source::load_records;

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, AnalysisError>;
