use std::fmt::Display;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer};
use utoipa::IntoParams;

use crate::db::models::property::{Property, PropertyType};

/// Listing search parameters. Empty strings are treated as "any".
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PropertyFilter {
    /// Exact state, case-insensitive
    pub state: Option<String>,
    /// Exact city, case-insensitive
    pub city: Option<String>,
    /// Substring of the locality or the street address
    pub area: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub property_type: Option<PropertyType>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub min_rent: Option<i64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub max_rent: Option<i64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub min_bedrooms: Option<i32>,
}

/// Query strings arrive as text; `?min_rent=` means no bound rather than a 400.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map(Some).map_err(de::Error::custom),
        _ => Ok(None),
    }
}

/// Single case-folding rule for every text comparison.
fn fold(value: &str) -> String {
    value.trim().to_lowercase()
}

impl PropertyFilter {
    pub fn matches(&self, property: &Property) -> bool {
        if let Some(state) = non_empty(&self.state) {
            if fold(&property.state) != fold(state) {
                return false;
            }
        }
        if let Some(city) = non_empty(&self.city) {
            if fold(&property.city) != fold(city) {
                return false;
            }
        }
        if let Some(area) = non_empty(&self.area) {
            let needle = fold(area);
            let in_locality = fold(&property.locality).contains(&needle);
            let in_address = fold(&property.address).contains(&needle);
            if !in_locality && !in_address {
                return false;
            }
        }
        if let Some(kind) = self.property_type {
            if property.property_type != kind {
                return false;
            }
        }
        if self.min_rent.is_some_and(|min| property.rent < min) {
            return false;
        }
        if self.max_rent.is_some_and(|max| property.rent > max) {
            return false;
        }
        if self.min_bedrooms.is_some_and(|min| property.bedrooms < min) {
            return false;
        }
        true
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Runs `filter` over a snapshot, keeping the snapshot's order.
pub fn filter_properties<'a, I>(snapshot: I, filter: &PropertyFilter) -> Vec<Property>
where
    I: IntoIterator<Item = &'a Property>,
{
    snapshot
        .into_iter()
        .filter(|p| filter.matches(p))
        .cloned()
        .collect()
}
