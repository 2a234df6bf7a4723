//! Dispatch identifiers for notification batches.
//!
//! A dispatch ID is the SHA-256 over the item ID, the new price and the
//! price-change timestamp. Every retry of the same price drop yields the same
//! ID, which lets the subscription store credit each user at most once per
//! drop.

use pricewatch_core::item::Item;
use sha2::{Digest, Sha256};

/// Compute the dispatch ID for the price drop currently recorded on `item`.
pub fn dispatch_id(item: &Item) -> String {
  let mut hasher = Sha256::new();
  hasher.update(item.item_id.as_bytes());
  hasher.update(item.price.to_le_bytes());
  hasher.update(item.price_last_changed_at.timestamp_micros().to_le_bytes());
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};
  use pricewatch_core::{item::ExternalItem, site::Site};

  use super::*;

  fn item() -> Item {
    let fetched = ExternalItem {
      site:        Site::Shopee,
      merchant_id: "7".into(),
      product_id:  "9".into(),
      url:         "https://shopee.co.id/product/7/9".into(),
      name:        "Rice Cooker".into(),
      price:       350_000,
      stock:       4,
      image_url:   String::new(),
      description: String::new(),
      rating:      4.9,
      sold_count:  10,
    };
    Item::from_external(&fetched, Utc.timestamp_opt(1_700_000_000, 0).unwrap())
  }

  #[test]
  fn same_drop_same_id() {
    let a = item();
    let mut b = a.clone();
    b.stock = 1;
    b.updated_at = Utc::now();
    assert_eq!(dispatch_id(&a), dispatch_id(&b));
    assert_eq!(dispatch_id(&a).len(), 64);
  }

  #[test]
  fn new_price_or_change_time_gives_new_id() {
    let a = item();

    let mut cheaper = a.clone();
    cheaper.price = 300_000;
    assert_ne!(dispatch_id(&a), dispatch_id(&cheaper));

    let mut later = a.clone();
    later.price_last_changed_at = Utc.timestamp_opt(1_700_000_600, 0).unwrap();
    assert_ne!(dispatch_id(&a), dispatch_id(&later));
  }
}
