//! SalesForge: sales analytics and transaction segmentation CLI
//!
//! This is the main entrypoint that sequences loading, preprocessing, feature
//! engineering, trend and ranking analysis, report series and segmentation.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use salesforge::model::SegmentSummary;
use salesforge::preprocess::QualityReport;
use salesforge::{
    analyze_product_performance, analyze_sales_trends, analyze_store_performance, build_report,
    check_quality, engineer_features, load_records, preprocess, segment_customers,
    summarize_segments, Args, CustomerSegment, ProductMetric, SalesReport, SalesTrendSummary,
    StoreMetric,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Everything the pipeline computed, as written by `--json`.
#[derive(Serialize)]
struct AnalysisExport<'a> {
    quality: &'a QualityReport,
    trends: &'a SalesTrendSummary,
    products: &'a [ProductMetric],
    stores: &'a [StoreMetric],
    report: &'a SalesReport,
    segments: &'a [CustomerSegment],
    segment_summary: &'a [SegmentSummary],
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let predict = args.parse_predict_values()?;
    run_pipeline(&args, predict)
}

fn run_pipeline(args: &Args, predict: Option<[f64; 3]>) -> Result<()> {
    println!("=== Sales Analysis Pipeline ===\n");
    let start_time = Instant::now();

    info!(input = %args.input, "Step 1: loading data");
    let raw = load_records(&args.input).with_context(|| format!("failed to load {}", args.input))?;

    info!("Step 2: checking quality and preprocessing data");
    let quality = check_quality(&raw);
    print_quality(&quality);
    let canonical = preprocess(&raw)?;

    info!("Step 3: engineering features");
    let enriched = engineer_features(&canonical)?;

    info!("Step 4: analyzing sales trends");
    let trends = analyze_sales_trends(&enriched)?;
    print_trends(&trends);

    info!("Step 5: analyzing product performance");
    let products = analyze_product_performance(&enriched)?;
    println!("\n=== Top {} Products by Sales ===", args.top);
    for product in products.iter().take(args.top) {
        println!(
            "{:<20} {:<28} qty {:>7}  sales {:>12.2}  avg price {:>6.2}  share {:>5.1}%",
            product.product_category,
            product.product_type,
            product.transaction_qty,
            product.total_amount,
            product.avg_price,
            product.sales_share * 100.0
        );
    }

    info!("Step 6: analyzing store performance");
    let stores = analyze_store_performance(&enriched)?;
    println!("\n=== Store Performance ===");
    for store in &stores {
        println!(
            "{:<4} {:<20} transactions {:>7}  sales {:>12.2}  avg value {:>6.2}  share {:>5.1}%",
            store.store_id,
            store.store_location,
            store.transactions,
            store.total_amount,
            store.avg_transaction_value,
            store.sales_share * 100.0
        );
    }

    info!("Step 7: building report series");
    let report = build_report(&enriched)?;
    println!(
        "\nReport series: {} days, {} hours, {} categories, {} stores, {} heatmap cells",
        report.daily_sales.len(),
        report.hourly_mean.len(),
        report.category_sales.len(),
        report.store_sales.len(),
        report.heatmap.cells.len()
    );

    info!(clusters = args.clusters, seed = args.seed, "Step 8: segmenting transactions");
    let (segments, model) = segment_customers(&enriched, args.clusters, args.seed)?;
    let segment_summary = summarize_segments(&segments);

    println!("\n=== Segment Summary ===");
    println!("Segment | Count   | Mean amount | Mean qty | Mean products");
    for summary in &segment_summary {
        println!(
            "{:7} | {:7} | {:11.2} | {:8.2} | {:13.2}",
            summary.segment,
            summary.transactions,
            summary.mean_amount,
            summary.mean_qty,
            summary.mean_product_count
        );
    }

    let silhouette_score = model.training_silhouette(1000);
    println!("\nSilhouette score (sample): {:.3}", silhouette_score);
    println!("Within-cluster sum of squares: {:.2}", model.inertia);

    if let Some(values) = predict {
        let segment = model.predict(&values)?;
        println!(
            "\nPredicted segment for amount={}, qty={}, products={}: {}",
            values[0], values[1], values[2], segment
        );
    }

    if let Some(path) = &args.json {
        let export = AnalysisExport {
            quality: &quality,
            trends: &trends,
            products: &products,
            stores: &stores,
            report: &report,
            segments: &segments,
            segment_summary: &segment_summary,
        };
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create {}", path))?;
        serde_json::to_writer_pretty(file, &export)?;
        println!("\nTables written to: {}", path);
    }

    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

fn print_quality(quality: &QualityReport) {
    println!("=== Data Quality ===");
    println!("Total rows: {}", quality.total_rows);
    println!("Duplicate rows: {}", quality.duplicates);
    println!("Unique stores: {}", quality.unique_stores);
    println!("Unique products: {}", quality.unique_products);
    if let Some(range) = quality.date_range {
        println!("Date range: {} .. {}", range.start, range.end);
    }
    for (field, count) in quality.missing_values.iter().filter(|(_, count)| **count > 0) {
        println!("Missing {}: {}", field, count);
    }
}

fn print_trends(trends: &SalesTrendSummary) {
    println!("\n=== Sales Trends ===");
    println!("Total sales: ${:.2}", trends.total_sales);
    println!("Average daily sales: ${:.2}", trends.avg_daily_sales);
    println!("Peak sales hour: {}:00", trends.peak_sales_hour);
    println!("Best performing category: {}", trends.best_performing_category);
    println!("Best performing store: {}", trends.best_performing_store);
    println!("Sales growth: {:.1}%", trends.sales_growth);
}
