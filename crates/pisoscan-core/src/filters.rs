//! Post-fetch filter chain.
//!
//! All bounds are inclusive: a value exactly equal to a configured min or
//! max passes. A listing missing a field that a bound is configured for is
//! rejected — an unknown price cannot be shown to satisfy a price cap.
//! Predicates short-circuit on the first failure.

use crate::config::ScraperConfig;
use crate::types::RawListing;

/// Returns `true` when `listing` survives every configured predicate.
#[must_use]
pub fn passes_filters(listing: &RawListing, config: &ScraperConfig) -> bool {
    if let Some(min_price) = config.min_price {
        match listing.price {
            Some(price) if price >= min_price => {}
            _ => return false,
        }
    }

    if let Some(max_price) = config.max_price {
        match listing.price {
            Some(price) if price <= max_price => {}
            _ => return false,
        }
    }

    if let Some(min_rooms) = config.min_rooms {
        match listing.rooms {
            Some(rooms) if rooms >= min_rooms => {}
            _ => return false,
        }
    }

    if let Some(max_rooms) = config.max_rooms {
        match listing.rooms {
            Some(rooms) if rooms <= max_rooms => {}
            _ => return false,
        }
    }

    if let Some(min_area) = config.min_area {
        match listing.area_m2 {
            Some(area) if area >= min_area => {}
            _ => return false,
        }
    }

    if let Some(max_area) = config.max_area {
        match listing.area_m2 {
            Some(area) if area <= max_area => {}
            _ => return false,
        }
    }

    if let Some(allowed) = &config.property_types {
        match listing.property_type {
            Some(kind) if allowed.contains(&kind) => {}
            _ => return false,
        }
    }

    true
}
