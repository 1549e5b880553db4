//! Pure reconciliation of a scraped listing against its stored state.
//!
//! No stored entity is mutated in place: the function returns the next
//! state as a value and a classification, and the catalog store performs
//! the actual write.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use pisoscan_core::{Listing, RawListing};

/// How an upsert classified one raw listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    New,
    Updated {
        /// The incoming price is non-null and differs from the stored one.
        price_changed: bool,
    },
}

/// Computes the next stored state for `incoming`.
///
/// With no existing record the listing is brand new: both seen-timestamps
/// are `now` and the classification is [`ChangeKind::New`].
///
/// With an existing record, descriptive fields are refreshed from the
/// scrape — except that an incoming `None` never erases a value a previous
/// scrape already established (a card that stopped exposing its postal code
/// did not lose its postal code). The listing is reactivated and
/// `last_seen_at` advances. The price only moves when the scrape actually
/// produced one; whether it differed is reported in the classification so
/// the caller can append price history.
///
/// Re-reconciling an unchanged listing yields `price_changed: false`, which
/// is what makes the upsert idempotent.
#[must_use]
pub fn reconcile(
    existing: Option<&Listing>,
    incoming: &RawListing,
    now: DateTime<Utc>,
) -> (Listing, ChangeKind) {
    let Some(current) = existing else {
        let listing = Listing {
            id: Uuid::new_v4(),
            external_id: incoming.external_id.clone(),
            source: incoming.source,
            title: incoming.title.clone(),
            description: incoming.description.clone(),
            price: incoming.price,
            operation_type: incoming.operation_type,
            property_type: incoming.property_type,
            rooms: incoming.rooms,
            bathrooms: incoming.bathrooms,
            area_m2: incoming.area_m2,
            address: incoming.address.clone(),
            city: incoming.city.clone(),
            province: incoming.province.clone(),
            postal_code: incoming.postal_code.clone(),
            zone: incoming.zone.clone(),
            latitude: incoming.latitude,
            longitude: incoming.longitude,
            image_urls: incoming.image_urls.clone(),
            url: incoming.url.clone(),
            is_active: true,
            first_seen_at: now,
            last_seen_at: now,
        };
        return (listing, ChangeKind::New);
    };

    let price_changed = incoming.price.is_some() && incoming.price != current.price;

    let next = Listing {
        id: current.id,
        external_id: current.external_id.clone(),
        source: current.source,
        title: incoming.title.clone().or_else(|| current.title.clone()),
        description: incoming
            .description
            .clone()
            .or_else(|| current.description.clone()),
        price: incoming.price.or(current.price),
        operation_type: incoming.operation_type.or(current.operation_type),
        property_type: incoming.property_type.or(current.property_type),
        rooms: incoming.rooms.or(current.rooms),
        bathrooms: incoming.bathrooms.or(current.bathrooms),
        area_m2: incoming.area_m2.or(current.area_m2),
        address: incoming.address.clone().or_else(|| current.address.clone()),
        city: incoming.city.clone().or_else(|| current.city.clone()),
        province: incoming
            .province
            .clone()
            .or_else(|| current.province.clone()),
        postal_code: incoming
            .postal_code
            .clone()
            .or_else(|| current.postal_code.clone()),
        zone: incoming.zone.clone().or_else(|| current.zone.clone()),
        latitude: incoming.latitude.or(current.latitude),
        longitude: incoming.longitude.or(current.longitude),
        image_urls: if incoming.image_urls.is_empty() {
            current.image_urls.clone()
        } else {
            incoming.image_urls.clone()
        },
        url: incoming.url.clone().or_else(|| current.url.clone()),
        is_active: true,
        first_seen_at: current.first_seen_at,
        last_seen_at: now,
    };

    (next, ChangeKind::Updated { price_changed })
}
