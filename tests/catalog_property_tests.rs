//! Property-based tests for listing validation, marketplace search and status partitioning
//!
//! All three are pure over their inputs, so proptest can drive them directly
//! without a store.

use harvest_contracts::{
    CategoryFilter, Contract, ContractStatus, CropCategory, Listing, ListingDraft, SearchCriteria,
    TimeStamp, ValidationError, partition_by_status, search,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

// PROPERTY TEST STRATEGIES

/// Decimals on both sides of zero, zero included
fn signed_decimal_strategy() -> impl Strategy<Value = Decimal> {
    (-100_000i64..=100_000, 0u32..=2).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

fn category_strategy() -> impl Strategy<Value = CropCategory> {
    prop::sample::select(CropCategory::ALL.to_vec())
}

fn category_filter_strategy() -> impl Strategy<Value = CategoryFilter> {
    prop_oneof![
        Just(CategoryFilter::All),
        category_strategy().prop_map(CategoryFilter::Only),
    ]
}

/// A small vocabulary so that queries actually hit something
fn word_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["Tomato", "tomato", "Onion", "Mango", "Rice", "Asha", "Vikram", "fresh", "organic"])
}

fn query_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        word_strategy().prop_map(str::to_string),
        word_strategy().prop_map(|w| w.to_uppercase()),
        word_strategy().prop_map(|w| w[..3].to_string()),
        // padding is part of the needle, not trimmed away
        word_strategy().prop_map(|w| format!(" {w}")),
        Just(" ".to_string()),
    ]
}

fn listing_strategy() -> impl Strategy<Value = Listing> {
    (
        any::<u32>(),
        word_strategy(),
        word_strategy(),
        word_strategy(),
        category_strategy(),
    )
        .prop_map(|(n, crop, farmer, description, category)| Listing {
            id: format!("listing_{n}"),
            farmer_id: format!("farmer_{farmer}"),
            farmer_name: farmer.to_string(),
            crop_name: crop.to_string(),
            crop_category: category,
            available_quantity: Decimal::from(100),
            min_price: Decimal::from(10),
            description: format!("{description} produce"),
            location: "Pune".into(),
            harvest_date: TimeStamp::new(),
            created_at: TimeStamp::new(),
        })
}

fn catalog_strategy() -> impl Strategy<Value = Vec<Listing>> {
    prop::collection::vec(listing_strategy(), 0..=20)
}

fn contracts_strategy() -> impl Strategy<Value = Vec<Contract>> {
    prop::collection::vec(prop::sample::select(ContractStatus::ALL.to_vec()), 0..=30).prop_map(
        |statuses| {
            statuses
                .into_iter()
                .enumerate()
                .map(|(n, status)| {
                    let created_at = TimeStamp::new();
                    Contract {
                        id: format!("contract_{n}"),
                        listing_id: "listing_1".into(),
                        listing_digest: String::new(),
                        farmer_id: "farmer".into(),
                        farmer_name: "Farmer".into(),
                        buyer_id: "buyer".into(),
                        buyer_name: "Buyer".into(),
                        crop_name: "Rice".into(),
                        quantity: Decimal::ONE,
                        price: Decimal::ONE,
                        status,
                        delivery_date: created_at.plus_days(30),
                        created_at,
                        updated_at: None,
                    }
                })
                .collect()
        },
    )
}

fn draft(quantity: Decimal, min_price: Decimal) -> ListingDraft {
    ListingDraft::new()
        .set_crop_name("Wheat")
        .set_category(CropCategory::Grains)
        .set_available_quantity(quantity)
        .set_min_price(min_price)
        .set_harvest_date(TimeStamp::new())
}

// PROPERTY TESTS
proptest! {
    /// Property: a draft fails exactly when its quantity is negative or its price is not positive
    #[test]
    fn prop_publish_fails_iff_numbers_out_of_range(
        quantity in signed_decimal_strategy(),
        min_price in signed_decimal_strategy(),
    ) {
        let result = draft(quantity, min_price).validate_and_finalise("farmer", "Farmer");
        let should_fail = quantity < Decimal::ZERO || min_price <= Decimal::ZERO;

        prop_assert_eq!(result.is_err(), should_fail);
        if let Err(e) = result {
            prop_assert!(matches!(
                e,
                ValidationError::NegativeQuantity(_) | ValidationError::NonPositivePrice(_)
            ));
        }
    }

    /// Property: an empty query over every category returns the catalog unchanged
    #[test]
    fn prop_empty_search_is_identity(catalog in catalog_strategy()) {
        let criteria = SearchCriteria::new("", CategoryFilter::All);

        prop_assert_eq!(search(&catalog, &criteria), catalog);
    }

    /// Property: searching a result again with the same criteria changes nothing
    #[test]
    fn prop_search_is_idempotent(
        catalog in catalog_strategy(),
        query in query_strategy(),
        category in category_filter_strategy(),
    ) {
        let criteria = SearchCriteria::new(&query, category);

        let once = search(&catalog, &criteria);
        let twice = search(&once, &criteria);

        prop_assert_eq!(once, twice);
    }

    /// Property: results are exactly the matching listings, in catalog order
    #[test]
    fn prop_search_keeps_matches_in_order(
        catalog in catalog_strategy(),
        query in query_strategy(),
        category in category_filter_strategy(),
    ) {
        let criteria = SearchCriteria::new(&query, category);
        let found = search(&catalog, &criteria);
        let needle = query.to_lowercase();

        let expected: Vec<Listing> = catalog
            .iter()
            .filter(|l| category.admits(l.crop_category))
            .filter(|l| {
                needle.is_empty()
                    || l.crop_name.to_lowercase().contains(&needle)
                    || l.farmer_name.to_lowercase().contains(&needle)
                    || l.description.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();

        prop_assert_eq!(found, expected);
    }

    /// Property: status groups are disjoint, cover the input and keep its order
    #[test]
    fn prop_partition_covers_input(contracts in contracts_strategy()) {
        let partition = partition_by_status(&contracts);

        let total: usize = ContractStatus::ALL.iter().map(|s| partition.count(*s)).sum();
        prop_assert_eq!(total, contracts.len());

        for (status, group) in partition.iter() {
            prop_assert!(group.iter().all(|c| c.status == status));
            let expected: Vec<&Contract> = contracts.iter().filter(|c| c.status == status).collect();
            let actual: Vec<&Contract> = group.iter().collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
