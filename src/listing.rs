//! Producer listings and the catalog that stores them
use crate::document::{Document, Fields, Filter};
use crate::error::{MarketError, SchemaError, ValidationError};
use crate::identity::{Role, Session};
use crate::store::{Collection, DocumentStore, Guard, UpdateOutcome};
use crate::types::TimeStamp;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CropCategory {
    Vegetables,
    Fruits,
    Grains,
    Dairy,
    Poultry,
}

impl CropCategory {
    pub const ALL: [CropCategory; 5] = [
        CropCategory::Vegetables,
        CropCategory::Fruits,
        CropCategory::Grains,
        CropCategory::Dairy,
        CropCategory::Poultry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CropCategory::Vegetables => "Vegetables",
            CropCategory::Fruits => "Fruits",
            CropCategory::Grains => "Grains",
            CropCategory::Dairy => "Dairy",
            CropCategory::Poultry => "Poultry",
        }
    }
}

impl fmt::Display for CropCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CropCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CropCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown crop category `{s}`"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub farmer_id: String,
    pub farmer_name: String,
    pub crop_name: String,
    pub crop_category: CropCategory,
    pub available_quantity: Decimal, // kg
    pub min_price: Decimal,          // per kg
    pub description: String,
    pub location: String,
    pub harvest_date: TimeStamp<Utc>,
    pub created_at: TimeStamp<Utc>,
}

impl Listing {
    pub fn from_document(doc: &Document) -> Result<Self, SchemaError> {
        let available_quantity = doc.number("availableQuantity")?;
        if available_quantity < Decimal::ZERO {
            return Err(SchemaError::InvalidValue {
                field: "availableQuantity",
                reason: format!("{available_quantity} is negative"),
            });
        }
        let min_price = doc.number("minPrice")?;
        if min_price <= Decimal::ZERO {
            return Err(SchemaError::InvalidValue {
                field: "minPrice",
                reason: format!("{min_price} is not positive"),
            });
        }

        Ok(Self {
            id: doc.id.clone(),
            farmer_id: doc.text("farmerId")?.to_string(),
            farmer_name: doc.text("farmerName")?.to_string(),
            crop_name: doc.text("cropName")?.to_string(),
            crop_category: doc.parsed("cropCategory")?,
            available_quantity,
            min_price,
            description: doc.text("description")?.to_string(),
            location: doc.text("location")?.to_string(),
            harvest_date: doc.timestamp("harvestDate")?,
            created_at: doc.timestamp("createdAt")?,
        })
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("farmerId".into(), self.farmer_id.clone().into());
        fields.insert("farmerName".into(), self.farmer_name.clone().into());
        fields.insert("cropName".into(), self.crop_name.clone().into());
        fields.insert("cropCategory".into(), self.crop_category.as_str().into());
        fields.insert("availableQuantity".into(), self.available_quantity.into());
        fields.insert("minPrice".into(), self.min_price.into());
        fields.insert("description".into(), self.description.clone().into());
        fields.insert("location".into(), self.location.clone().into());
        fields.insert("harvestDate".into(), (&self.harvest_date).into());
        fields.insert("createdAt".into(), (&self.created_at).into());
        fields
    }

    /// sha256 of the CBOR encoded snapshot, recorded on contracts proposed against it.
    pub fn digest(&self) -> anyhow::Result<String> {
        let mut fields = self.to_fields();
        fields.insert("id".into(), self.id.clone().into());
        let contents = Document::encode_fields(&fields)?;
        Ok(sha256::digest(&contents))
    }
}

/// Builder for a listing that has not been published yet.
#[derive(Debug, Clone, Default)]
pub struct ListingDraft {
    crop_name: Option<String>,
    crop_category: Option<CropCategory>,
    available_quantity: Decimal,
    min_price: Decimal,
    description: String,
    location: String,
    harvest_date: Option<TimeStamp<Utc>>,
}

impl ListingDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_crop_name(mut self, name: &str) -> Self {
        self.crop_name = Some(name.to_string());
        self
    }
    pub fn set_category(mut self, category: CropCategory) -> Self {
        self.crop_category = Some(category);
        self
    }
    pub fn set_available_quantity(mut self, quantity: Decimal) -> Self {
        self.available_quantity = quantity;
        self
    }
    pub fn set_min_price(mut self, price: Decimal) -> Self {
        self.min_price = price;
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
    pub fn set_location(mut self, location: &str) -> Self {
        self.location = location.to_string();
        self
    }
    pub fn set_harvest_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.harvest_date = Some(date);
        self
    }

    /// Checks the draft and fills in everything the catalog assigns, apart from the id.
    pub fn validate_and_finalise(
        self,
        farmer_id: &str,
        farmer_name: &str,
    ) -> Result<Listing, ValidationError> {
        let crop_name = self
            .crop_name
            .ok_or(ValidationError::MissingField("crop name"))?;
        if crop_name.trim().is_empty() {
            return Err(ValidationError::EmptyField("crop name"));
        }
        let crop_category = self
            .crop_category
            .ok_or(ValidationError::MissingField("crop category"))?;
        if self.available_quantity < Decimal::ZERO {
            return Err(ValidationError::NegativeQuantity(self.available_quantity));
        }
        if self.min_price <= Decimal::ZERO {
            return Err(ValidationError::NonPositivePrice(self.min_price));
        }
        let harvest_date = self
            .harvest_date
            .ok_or(ValidationError::MissingField("harvest date"))?;

        Ok(Listing {
            id: String::new(),
            farmer_id: farmer_id.to_string(),
            farmer_name: farmer_name.to_string(),
            crop_name,
            crop_category,
            available_quantity: self.available_quantity,
            min_price: self.min_price,
            description: self.description,
            location: self.location,
            harvest_date,
            created_at: TimeStamp::new(),
        })
    }
}

pub struct ListingCatalog {
    store: Arc<dyn DocumentStore>,
    reservation_attempts: u32,
}

impl ListingCatalog {
    pub fn new(store: Arc<dyn DocumentStore>, reservation_attempts: u32) -> Self {
        Self {
            store,
            reservation_attempts: reservation_attempts.max(1),
        }
    }

    /// Publish a draft on behalf of the producer holding `session`.
    pub async fn publish(&self, session: &Session, draft: ListingDraft) -> Result<Listing, MarketError> {
        session.require_role(Role::Producer, "publish listings")?;
        let principal = session.principal();

        let mut listing = draft.validate_and_finalise(&principal.id, &principal.display_name)?;
        listing.id = self
            .store
            .create(Collection::Listings, listing.to_fields())
            .await?;

        info!(
            listing = %listing.id,
            farmer = %listing.farmer_id,
            crop = %listing.crop_name,
            quantity = %listing.available_quantity,
            "listing published"
        );
        Ok(listing)
    }

    pub async fn get(&self, listing_id: &str) -> Result<Listing, MarketError> {
        let doc = self
            .store
            .get(Collection::Listings, listing_id)
            .await?
            .ok_or_else(|| MarketError::not_found("listing", listing_id))?;
        Ok(Listing::from_document(&doc)?)
    }

    /// Every listing in the store, in no particular order.
    pub async fn all_listings(&self) -> Result<Vec<Listing>, MarketError> {
        self.fetch(&Filter::all()).await
    }

    pub async fn listings_by(&self, farmer_id: &str) -> Result<Vec<Listing>, MarketError> {
        self.fetch(&Filter::all().eq("farmerId", farmer_id)).await
    }

    async fn fetch(&self, filter: &Filter) -> Result<Vec<Listing>, MarketError> {
        let docs = self.store.query(Collection::Listings, filter).await?;
        debug!(count = docs.len(), "listings fetched");
        docs.iter()
            .map(|doc| Listing::from_document(doc).map_err(MarketError::from))
            .collect()
    }

    /// Validates the terms against a fresh snapshot and takes `quantity` off the listing.
    ///
    /// The decrement is guarded on the quantity the terms were checked against, so two
    /// reservations can never both spend the same stock. Returns the snapshot the terms
    /// were validated against.
    pub async fn reserve(
        &self,
        listing_id: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Listing, MarketError> {
        if quantity <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveQuantity(quantity).into());
        }

        for attempt in 1..=self.reservation_attempts {
            let listing = self.get(listing_id).await?;

            if quantity > listing.available_quantity {
                return Err(ValidationError::InsufficientQuantity {
                    requested: quantity,
                    available: listing.available_quantity,
                }
                .into());
            }
            if price < listing.min_price {
                return Err(ValidationError::PriceBelowMinimum {
                    offered: price,
                    minimum: listing.min_price,
                }
                .into());
            }

            let guard = Guard::new("availableQuantity", listing.available_quantity);
            let mut patch = Fields::new();
            patch.insert(
                "availableQuantity".into(),
                (listing.available_quantity - quantity).into(),
            );

            match self
                .store
                .update_if(Collection::Listings, listing_id, &guard, patch)
                .await?
            {
                UpdateOutcome::Applied => {
                    debug!(listing = %listing_id, %quantity, attempt, "stock reserved");
                    return Ok(listing);
                }
                UpdateOutcome::GuardFailed => {
                    debug!(listing = %listing_id, attempt, "listing changed under reservation, retrying");
                }
                UpdateOutcome::Missing => return Err(MarketError::not_found("listing", listing_id)),
            }
        }

        warn!(listing = %listing_id, attempts = self.reservation_attempts, "reservation gave up");
        Err(MarketError::Conflict {
            listing_id: listing_id.to_string(),
            attempts: self.reservation_attempts,
        })
    }

    /// Returns previously reserved stock to the listing, with the same retry bound as
    /// [`ListingCatalog::reserve`].
    pub async fn release(&self, listing_id: &str, quantity: Decimal) -> Result<(), MarketError> {
        for attempt in 1..=self.reservation_attempts {
            let listing = self.get(listing_id).await?;
            let guard = Guard::new("availableQuantity", listing.available_quantity);
            let mut patch = Fields::new();
            patch.insert(
                "availableQuantity".into(),
                (listing.available_quantity + quantity).into(),
            );

            match self
                .store
                .update_if(Collection::Listings, listing_id, &guard, patch)
                .await?
            {
                UpdateOutcome::Applied => {
                    debug!(listing = %listing_id, %quantity, attempt, "stock released");
                    return Ok(());
                }
                UpdateOutcome::GuardFailed => {
                    debug!(listing = %listing_id, attempt, "listing changed under release, retrying");
                }
                UpdateOutcome::Missing => return Err(MarketError::not_found("listing", listing_id)),
            }
        }

        warn!(listing = %listing_id, %quantity, attempts = self.reservation_attempts, "release gave up");
        Err(MarketError::Conflict {
            listing_id: listing_id.to_string(),
            attempts: self.reservation_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ListingDraft {
        ListingDraft::new()
            .set_crop_name("Tomato")
            .set_category(CropCategory::Vegetables)
            .set_available_quantity(Decimal::from(100))
            .set_min_price(Decimal::from(10))
            .set_description("Vine ripened")
            .set_location("Nashik")
            .set_harvest_date(TimeStamp::new_with(2025, 6, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn categories_parse_by_name() {
        for category in CropCategory::ALL {
            assert_eq!(category.as_str().parse::<CropCategory>(), Ok(category));
        }
        assert!("vegetables".parse::<CropCategory>().is_err());
    }

    #[test]
    fn finalise_rejects_out_of_range_numbers() {
        let negative = draft().set_available_quantity(Decimal::from(-1));
        let free = draft().set_min_price(Decimal::ZERO);

        assert_eq!(
            negative.validate_and_finalise("f", "F").unwrap_err(),
            ValidationError::NegativeQuantity(Decimal::from(-1))
        );
        assert_eq!(
            free.validate_and_finalise("f", "F").unwrap_err(),
            ValidationError::NonPositivePrice(Decimal::ZERO)
        );
    }

    #[test]
    fn finalise_requires_crop_and_category() {
        let no_category = ListingDraft::new()
            .set_crop_name("Rice")
            .set_available_quantity(Decimal::ONE)
            .set_min_price(Decimal::ONE);

        assert_eq!(
            no_category.validate_and_finalise("f", "F").unwrap_err(),
            ValidationError::MissingField("crop category")
        );
        assert_eq!(
            draft().set_crop_name("  ").validate_and_finalise("f", "F").unwrap_err(),
            ValidationError::EmptyField("crop name")
        );
    }

    #[test]
    fn document_round_trip_and_digest() {
        let mut listing = draft().validate_and_finalise("farmer_1", "Asha").unwrap();
        listing.id = "listing_1abc".into();

        let decoded =
            Listing::from_document(&Document::new(listing.id.clone(), listing.to_fields())).unwrap();

        assert_eq!(decoded, listing);
        assert_eq!(decoded.digest().unwrap(), listing.digest().unwrap());

        let mut changed = listing.clone();
        changed.available_quantity = Decimal::from(90);
        assert_ne!(changed.digest().unwrap(), listing.digest().unwrap());
    }

    #[test]
    fn stored_negative_stock_is_rejected() {
        let listing = draft().validate_and_finalise("farmer_1", "Asha").unwrap();
        let mut fields = listing.to_fields();
        fields.insert("availableQuantity".into(), Decimal::from(-5).into());

        assert!(matches!(
            Listing::from_document(&Document::new("listing_1abc", fields)),
            Err(SchemaError::InvalidValue { field: "availableQuantity", .. })
        ));
    }
}
