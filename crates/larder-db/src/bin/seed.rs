//! # Seed Data Generator
//!
//! Populates the database with a small croffle menu for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./larder_dev.db for store-demo (default)
//! cargo run -p larder-db --bin seed
//!
//! # Seed stock for another store
//! cargo run -p larder-db --bin seed -- --store store-b
//!
//! # Specify database path
//! cargo run -p larder-db --bin seed -- --db ./data/larder.db
//! ```
//!
//! ## Generated Data
//! - Recipe templates with base ingredients and mix-and-match toppings
//! - One product per template
//! - Opening stock for every ingredient in the chosen store
//!
//! Products and templates are global. Running the seeder again with a new
//! `--store` only adds stock rows for that store.

use std::env;

use larder_core::{
    IngredientRequirement, IngredientRole, PortionMultiplier, Product, Quantity, RecipeTemplate,
};
use larder_db::{Database, DbConfig, DbError, NewInventoryItem};

/// (name, unit, stock in thousandths, minimum threshold in thousandths)
const STOCK: &[(&str, &str, i64, i64)] = &[
    ("Croissant", "pcs", 10_000, 2_000),
    ("Whipped Cream", "serving", 10_000, 2_000),
    ("Popsicle Stick", "pcs", 10_000, 5_000),
    ("Choco Flakes", "serving", 5_000, 1_000),
    ("Caramel Sauce", "serving", 5_000, 1_000),
    ("Strawberry Jam", "serving", 5_000, 1_000),
    ("Biscoff Crumbs", "serving", 3_000, 1_000),
];

/// (requirement id, ingredient, unit, base qty in thousandths, role, group, multiplier)
type Line = (
    &'static str,
    &'static str,
    &'static str,
    i64,
    IngredientRole,
    Option<&'static str>,
    PortionMultiplier,
);

const MINI_CROFFLE: &[Line] = &[
    ("mini-croissant", "Croissant", "pcs", 500, IngredientRole::Base, None, PortionMultiplier::FULL),
    ("mini-cream", "Whipped Cream", "serving", 500, IngredientRole::Base, None, PortionMultiplier::FULL),
    ("mini-stick", "Popsicle Stick", "pcs", 1_000, IngredientRole::Base, None, PortionMultiplier::FULL),
    ("mini-choco", "Choco Flakes", "serving", 1_000, IngredientRole::Choice, Some("topping"), PortionMultiplier::HALF),
    ("mini-caramel", "Caramel Sauce", "serving", 1_000, IngredientRole::Choice, Some("topping"), PortionMultiplier::HALF),
];

const CLASSIC_CROFFLE: &[Line] = &[
    ("classic-croissant", "Croissant", "pcs", 1_000, IngredientRole::Base, None, PortionMultiplier::FULL),
    ("classic-cream", "Whipped Cream", "serving", 1_000, IngredientRole::Base, None, PortionMultiplier::FULL),
    ("classic-jam", "Strawberry Jam", "serving", 1_000, IngredientRole::Choice, Some("sauce"), PortionMultiplier::FULL),
    ("classic-caramel", "Caramel Sauce", "serving", 1_000, IngredientRole::Choice, Some("sauce"), PortionMultiplier::FULL),
    ("classic-choco", "Choco Flakes", "serving", 1_000, IngredientRole::Choice, Some("topping"), PortionMultiplier::FULL),
    ("classic-biscoff", "Biscoff Crumbs", "serving", 1_000, IngredientRole::Choice, Some("topping"), PortionMultiplier::FULL),
];

/// (template id, product id, display name, lines)
const MENU: &[(&str, &str, &str, &[Line])] = &[
    ("tmpl-mini-croffle", "mini-croffle", "Mini Croffle", MINI_CROFFLE),
    ("tmpl-classic-croffle", "classic-croffle", "Classic Croffle", CLASSIC_CROFFLE),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./larder_dev.db");
    let mut store_id = String::from("store-demo");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--store" | "-s" => {
                if i + 1 < args.len() {
                    store_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Larder Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (default: ./larder_dev.db)");
                println!("  -s, --store <ID>     Store to stock (default: store-demo)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Larder Seed Data Generator");
    println!("============================");
    println!("Database: {}", db_path);
    println!("Store:    {}", store_id);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Menu is global; only seed it once
    let existing = db.recipes().count_products().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products, keeping the menu", existing);
    } else {
        println!();
        println!("Creating menu...");
        for (template_id, product_id, name, lines) in MENU {
            let template = build_template(template_id, name, lines);
            db.recipes().insert_template(&template).await?;
            db.recipes()
                .insert_product(&Product {
                    id: product_id.to_string(),
                    name: name.to_string(),
                    recipe_template_id: Some(template_id.to_string()),
                })
                .await?;
            println!("  {} ({} requirements)", name, template.ingredients.len());
        }
    }

    println!();
    println!("Stocking {}...", store_id);

    let mut stocked = 0;
    for (name, unit, stock, threshold) in STOCK {
        let item = NewInventoryItem::new(&store_id, *name, Quantity::from_thousandths(*stock))
            .unit(*unit)
            .minimum_threshold(Quantity::from_thousandths(*threshold));

        match db.inventory().insert(&item).await {
            Ok(created) => {
                stocked += 1;
                println!("  {} = {} {}", created.item_name, created.stock_quantity, created.unit);
            }
            Err(DbError::UniqueViolation { .. }) => {
                println!("  {} already stocked, skipping", name);
            }
            Err(e) => {
                eprintln!("Failed to stock {}: {}", name, e);
            }
        }
    }

    println!();
    println!("✓ Stocked {} items", stocked);
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}

/// Builds a template from a static line table, positions in table order.
fn build_template(id: &str, name: &str, lines: &[Line]) -> RecipeTemplate {
    let ingredients = lines
        .iter()
        .enumerate()
        .map(
            |(position, (req_id, ingredient, unit, base, role, group, multiplier))| {
                IngredientRequirement {
                    id: req_id.to_string(),
                    ingredient_name: ingredient.to_string(),
                    unit: unit.to_string(),
                    position: position as i64,
                    base_quantity: Quantity::from_thousandths(*base),
                    role: *role,
                    choice_group: group.map(str::to_string),
                    portion_multiplier: *multiplier,
                }
            },
        )
        .collect();

    RecipeTemplate {
        id: id.to_string(),
        name: name.to_string(),
        category: Some("croffle".to_string()),
        ingredients,
    }
}
