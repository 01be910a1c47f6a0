//! Walks one contract from listing to delivery against a throwaway sled database.
//!
//! Run with `RUST_LOG=harvest_contracts=debug` to see every store interaction.

use anyhow::Context;
use harvest_contracts::{
    CategoryFilter, ContractLedger, ContractStatus, CropCategory, DocumentStore, IdentityResolver,
    ListingDraft, MarketConfig, NegotiationEngine, NewPrincipal, Role, SearchCriteria,
    SessionTable, SledStore, TimeStamp, search,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => MarketConfig::from_file(path)?,
        None => MarketConfig::default(),
    };

    let temp_dir = tempfile::tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join("marketplace.db"))?);
    let store: Arc<dyn DocumentStore> = Arc::new(SledStore::new(db));
    let sessions = Arc::new(SessionTable::new());
    let identity = IdentityResolver::new(store.clone(), sessions.clone());
    let engine = NegotiationEngine::new(store.clone(), config);
    let ledger = ContractLedger::new(store);

    sessions.open("farmer-token", "uid-asha")?;
    sessions.open("buyer-token", "uid-ravi")?;
    identity
        .register(
            "farmer-token",
            NewPrincipal {
                display_name: "Asha Patil".into(),
                email: "asha@example.com".into(),
                role: Role::Producer,
            },
        )
        .await?;
    identity
        .register(
            "buyer-token",
            NewPrincipal {
                display_name: "Ravi Foods".into(),
                email: "orders@ravifoods.example".into(),
                role: Role::Purchaser,
            },
        )
        .await?;
    let farmer = identity
        .begin_session("farmer-token")
        .await?
        .context("farmer has no session")?;
    let buyer = identity
        .begin_session("buyer-token")
        .await?
        .context("buyer has no session")?;

    let harvest = TimeStamp::new().plus_days(21);
    for (crop, category, quantity, price) in [
        ("Tomato", CropCategory::Vegetables, 100, 10),
        ("Alphonso Mango", CropCategory::Fruits, 40, 120),
        ("Basmati Rice", CropCategory::Grains, 500, 65),
    ] {
        engine
            .catalog()
            .publish(
                &farmer,
                ListingDraft::new()
                    .set_crop_name(crop)
                    .set_category(category)
                    .set_available_quantity(Decimal::from(quantity))
                    .set_min_price(Decimal::from(price))
                    .set_description("Farm fresh, picked to order")
                    .set_location("Nashik, Maharashtra")
                    .set_harvest_date(harvest.clone()),
            )
            .await?;
    }

    let catalog = engine.catalog().all_listings().await?;
    let found = search(
        &catalog,
        &SearchCriteria::new("tomato", CategoryFilter::Only(CropCategory::Vegetables)),
    );
    let listing = found.first().context("no tomatoes on the market")?;
    println!(
        "found {} from {}: {} kg at {} per kg minimum",
        listing.crop_name, listing.farmer_name, listing.available_quantity, listing.min_price
    );

    let contract = engine
        .propose(&buyer, &listing.id, Decimal::from(10), Decimal::from(12))
        .await?;
    println!(
        "proposed {} for {} kg, total {}, deliver by {}",
        contract.id,
        contract.quantity,
        contract.total_value().context("total out of range")?,
        contract.delivery_date.to_rfc3339()
    );

    engine.accept(&farmer, &contract.id).await?;
    engine.mark_delivered(&farmer, &contract.id).await?;

    let dashboard = ledger.dashboard(&farmer).await?;
    for status in ContractStatus::ALL {
        println!("{:>10}: {}", status.as_str(), dashboard.contracts.count(status));
    }
    println!("{}", serde_json::to_string_pretty(&engine.get(&buyer, &contract.id).await?)?);

    identity.sign_out(farmer).await?;
    identity.sign_out(buyer).await?;
    Ok(())
}
