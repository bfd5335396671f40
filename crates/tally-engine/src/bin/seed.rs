//! # Seed Data Generator
//!
//! Fills a store database with demo products so the registers have
//! something to sell.
//!
//! ## Usage
//! ```bash
//! # 200 products, stock varied per product (default)
//! cargo run -p tally-engine --bin seed
//!
//! # 1,000 products with 50 of each on hand
//! cargo run -p tally-engine --bin seed -- --count 1000 --stock 50
//!
//! # Explicit database / config file
//! cargo run -p tally-engine --bin seed -- --db ./data/tally.db --config ./tally.toml
//! ```
//!
//! Opening stock goes through the ledger as a `Receive` movement per
//! product, so `verify_all` holds on a freshly seeded database.

use std::env;
use std::path::PathBuf;
use std::time::Instant;

use tally_db::{Database, NewProduct};
use tally_engine::{init_tracing, EngineConfig};

/// Catalog sections: SKU prefix and base names.
const SECTIONS: &[(&str, &[&str])] = &[
    (
        "DRK",
        &[
            "Sparkling Water",
            "Cola",
            "Ginger Ale",
            "Cold Brew",
            "Green Tea",
            "Mango Juice",
            "Energy Drink",
            "Tonic Water",
        ],
    ),
    (
        "BAK",
        &[
            "Sourdough Loaf",
            "Bagel",
            "Croissant",
            "Rye Bread",
            "Muffin",
            "Pita",
        ],
    ),
    (
        "PNT",
        &[
            "Basmati Rice",
            "Red Lentils",
            "Chickpeas",
            "Olive Oil",
            "Tomato Paste",
            "Rolled Oats",
            "Brown Sugar",
            "Sea Salt",
        ],
    ),
    (
        "HOM",
        &[
            "Dish Soap",
            "Paper Towels",
            "Trash Bags",
            "AA Batteries",
            "Light Bulb",
            "Matches",
        ],
    ),
];

/// Pack variants and their price add-on in cents.
const PACKS: &[(&str, i64)] = &[("Single", 0), ("Twin Pack", 150), ("Family Pack", 400), ("Case", 1200)];

const ACTOR: &str = "seed";

struct Options {
    count: usize,
    stock: Option<i64>,
    db_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

fn parse_args() -> Option<Options> {
    let args: Vec<String> = env::args().collect();
    let mut options = Options {
        count: 200,
        stock: None,
        db_path: None,
        config_path: None,
    };

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--count" | "-c", Some(v)) => {
                options.count = v.parse().unwrap_or(options.count);
                i += 1;
            }
            ("--stock" | "-s", Some(v)) => {
                options.stock = v.parse().ok();
                i += 1;
            }
            ("--db" | "-d", Some(v)) => {
                options.db_path = Some(PathBuf::from(v));
                i += 1;
            }
            ("--config", Some(v)) => {
                options.config_path = Some(PathBuf::from(v));
                i += 1;
            }
            ("--help" | "-h", _) => {
                println!("Tally POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>      Number of products to create (default: 200)");
                println!("  -s, --stock <N>      Opening stock for every product (default: varied)");
                println!("  -d, --db <PATH>      Database file (default: from tally.toml)");
                println!("      --config <PATH>  Config file (default: platform config dir)");
                println!("  -h, --help           Show this help message");
                return None;
            }
            (other, _) => eprintln!("Ignoring unknown argument: {}", other),
        }
        i += 1;
    }

    Some(options)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Some(options) = parse_args() else {
        return Ok(());
    };

    init_tracing();

    let mut config = EngineConfig::load(options.config_path)?;
    if let Some(path) = options.db_path {
        config.database_path = path;
    }

    println!("Tally POS Seed Data Generator");
    println!("=============================");
    println!("Store:    {}", config.store_name);
    println!("Database: {}", config.database_path.display());
    println!("Products: {}", options.count);
    println!();

    let db = Database::new(config.db_config()).await?;
    println!("✓ Connected, migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let products = db.products();
    let start = Instant::now();
    let mut created = 0;

    'catalog: for (section_idx, (prefix, names)) in SECTIONS.iter().enumerate() {
        for (name_idx, name) in names.iter().enumerate() {
            for (pack_idx, (pack, addon)) in PACKS.iter().enumerate() {
                if created >= options.count {
                    break 'catalog;
                }

                let seq = section_idx * 1000 + name_idx * 10 + pack_idx;
                let product = demo_product(prefix, name, pack, *addon, seq, options.stock);

                if let Err(e) = products.insert(&product, ACTOR).await {
                    eprintln!("Failed to insert {}: {}", product.sku, e);
                    continue;
                }
                created += 1;
            }
        }
    }

    let elapsed = start.elapsed();
    println!("✓ Created {} products in {:?}", created, elapsed);

    let checked = db.stock().verify_all().await?;
    println!("✓ Ledger verified for {} products", checked);

    let low = products.low_stock().await?;
    println!();
    println!("Low stock ({}):", low.len());
    for product in low.iter().take(20) {
        println!(
            "  {:<16} {:<32} {:>4} (min {})",
            product.sku, product.name, product.quantity, product.min_quantity
        );
    }

    db.close().await;
    Ok(())
}

/// One demo product. Prices, cost and stock are derived from `seq` so
/// reruns produce the same catalog.
fn demo_product(prefix: &str, name: &str, pack: &str, addon: i64, seq: usize, stock: Option<i64>) -> NewProduct {
    let sku = format!("{}-{:05}", prefix, seq);

    let price_cents = 149 + ((seq * 37) % 900) as i64 + addon;
    let cost_cents = price_cents * (55 + (seq % 25) as i64) / 100;
    let opening_stock = stock.unwrap_or(((seq * 7) % 60) as i64);

    NewProduct::new(sku, format!("{} {}", name, pack), price_cents)
        .cost_cents(cost_cents)
        .min_quantity(5)
        .opening_stock(opening_stock)
}
