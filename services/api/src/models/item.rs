//! Item model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{
    models::Price,
    validator::{Validator, unique},
};

/// Item entity
///
/// `updated_at` doubles as the version token for optimistic concurrency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, FromRow)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub model: String,
    pub supplier: i64,
    pub price: f64,
    pub currency: i64,
    #[serde(rename = "image")]
    #[sqlx(rename = "image_file")]
    pub image: String,
    pub notes: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived: bool,
}

/// New item creation payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NewItem {
    pub name: String,
    pub model: String,
    pub supplier: i64,
    pub price: Price,
    pub currency: i64,
    pub image: String,
    pub notes: String,
    pub tags: Vec<String>,
}

impl From<NewItem> for Item {
    fn from(new: NewItem) -> Self {
        Item {
            name: new.name,
            model: new.model,
            supplier: new.supplier,
            price: new.price.into(),
            currency: new.currency,
            image: new.image,
            notes: new.notes,
            tags: new.tags,
            ..Item::default()
        }
    }
}

/// Item update payload
///
/// Only keys present in the request are applied; `null` counts as absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub model: Option<String>,
    pub supplier: Option<i64>,
    pub price: Option<Price>,
    pub currency: Option<i64>,
    pub image: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
    pub archived: Option<bool>,
}

impl ItemPatch {
    pub fn apply(self, item: &mut Item) {
        if let Some(name) = self.name {
            item.name = name;
        }
        if let Some(model) = self.model {
            item.model = model;
        }
        if let Some(supplier) = self.supplier {
            item.supplier = supplier;
        }
        if let Some(price) = self.price {
            item.price = price.into();
        }
        if let Some(currency) = self.currency {
            item.currency = currency;
        }
        if let Some(image) = self.image {
            item.image = image;
        }
        if let Some(notes) = self.notes {
            item.notes = notes;
        }
        if let Some(tags) = self.tags {
            item.tags = tags;
        }
        if let Some(archived) = self.archived {
            item.archived = archived;
        }
    }
}

pub fn validate_item(v: &mut Validator, item: &Item) {
    v.check(!item.name.is_empty(), "name", "must be provided");
    v.check(
        item.name.len() <= 255,
        "name",
        "must not be more than 255 bytes long",
    );
    v.check(item.supplier != 0, "supplier", "must be provided");
    v.check(item.price != 0.0, "price", "must be provided");
    v.check(item.price > 0.0, "price", "must be a positive value");
    v.check(item.currency != 0, "currency", "must be provided");
    v.check(
        unique(&item.tags),
        "tags",
        "must not contain duplicate values",
    );
}
