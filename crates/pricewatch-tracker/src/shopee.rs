//! [`Provider`] for Shopee Indonesia via its item JSON API.
//!
//! Other sites are reported as [`ProviderError::Unsupported`], so the
//! scheduler never starts a loop for them.

use pricewatch_core::{
  item::ExternalItem,
  provider::{Provider, ProviderError},
  site::{Site, classify},
};
use reqwest::{StatusCode, header::COOKIE};
use serde::Deserialize;
use url::Url;

/// Shopee reports prices in units of 1/100000 rupiah.
const PRICE_SCALE: i64 = 100_000;

const IMAGE_BASE: &str = "https://cf.shopee.co.id/file/";

#[derive(Clone)]
pub struct ShopeeProvider {
  client:   reqwest::Client,
  base_url: String,
}

impl ShopeeProvider {
  /// `client` should carry the request timeout.
  pub fn new(client: reqwest::Client, base_url: String) -> Self {
    Self {
      client,
      base_url: base_url.trim_end_matches('/').to_owned(),
    }
  }
}

/// Extract `(shop_id, item_id)` from either URL shape Shopee uses:
/// `/product/{shop}/{item}` or `/{slug}-i.{shop}.{item}`.
pub fn parse_ids(url: &str) -> Option<(String, String)> {
  let parsed = Url::parse(url).ok()?;
  let path = parsed.path().trim_end_matches('/');

  let (shop, item) = match path.strip_prefix("/product/") {
    Some(rest) => {
      let mut parts = rest.split('/');
      (parts.next()?, parts.next()?)
    }
    None => {
      let mut parts = path.rsplit('.');
      let item = parts.next()?;
      (parts.next()?, item)
    }
  };

  let numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
  (numeric(shop) && numeric(item)).then(|| (shop.to_owned(), item.to_owned()))
}

// ─── Wire format ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ItemResponse {
  #[serde(default)]
  data: Option<ItemData>,
}

#[derive(Deserialize)]
struct ItemData {
  shopid:          i64,
  itemid:          i64,
  name:            String,
  price:           i64,
  stock:           i64,
  #[serde(default)]
  image:           String,
  #[serde(default)]
  description:     String,
  #[serde(default)]
  historical_sold: i64,
  #[serde(default)]
  item_rating:     Option<ItemRating>,
}

#[derive(Deserialize)]
struct ItemRating {
  #[serde(default)]
  rating_star: f64,
}

impl ItemData {
  fn into_external(self, url: String) -> ExternalItem {
    let image_url = if self.image.is_empty() {
      String::new()
    } else {
      format!("{IMAGE_BASE}{}", self.image)
    };
    ExternalItem {
      site: Site::Shopee,
      merchant_id: self.shopid.to_string(),
      product_id: self.itemid.to_string(),
      url,
      name: self.name,
      price: self.price / PRICE_SCALE,
      stock: self.stock,
      image_url,
      description: self.description,
      rating: self.item_rating.map(|r| r.rating_star).unwrap_or_default(),
      sold_count: self.historical_sold,
    }
  }
}

// ─── Provider impl ───────────────────────────────────────────────────────────

impl Provider for ShopeeProvider {
  fn supports(&self, site: Site) -> bool { site == Site::Shopee }

  async fn fetch_item(&self, url: &str) -> Result<ExternalItem, ProviderError> {
    let site_url = classify(url).map_err(|e| ProviderError::NotFound(e.to_string()))?;
    if site_url.site != Site::Shopee {
      return Err(ProviderError::Unsupported(site_url.site));
    }
    let (shop_id, item_id) = parse_ids(&site_url.canonical)
      .ok_or_else(|| ProviderError::NotFound(format!("no shop/item id in {url}")))?;

    let response = self
      .client
      .get(format!("{}/api/v4/item/get", self.base_url))
      .query(&[("shopid", &shop_id), ("itemid", &item_id)])
      .header(COOKIE, "SPC_U=-")
      .send()
      .await
      .map_err(|e| ProviderError::Transient(e.to_string()))?;

    match response.status() {
      StatusCode::NOT_FOUND => {
        return Err(ProviderError::NotFound(format!("shop {shop_id} item {item_id}")));
      }
      status if !status.is_success() => {
        return Err(ProviderError::Transient(format!("shopee returned {status}")));
      }
      _ => {}
    }

    let body: ItemResponse = response
      .json()
      .await
      .map_err(|e| ProviderError::Transient(format!("malformed response: {e}")))?;
    let data = body
      .data
      .ok_or_else(|| ProviderError::NotFound(format!("shop {shop_id} item {item_id}")))?;

    Ok(data.into_external(site_url.canonical))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ids_from_both_url_shapes() {
    assert_eq!(
      parse_ids("https://shopee.co.id/product/123/456"),
      Some(("123".into(), "456".into()))
    );
    assert_eq!(
      parse_ids("https://shopee.co.id/Kopi-Arabika-250g-i.123.456"),
      Some(("123".into(), "456".into()))
    );
    assert_eq!(parse_ids("https://shopee.co.id/search"), None);
    assert_eq!(parse_ids("https://shopee.co.id/product/abc/456"), None);
  }

  #[test]
  fn item_data_is_normalised() {
    let body: ItemResponse = serde_json::from_str(
      r#"{"error":null,"data":{
        "shopid":123,"itemid":456,"name":"Kopi","price":8000000000,"stock":3,
        "image":"abc123","historical_sold":40,"item_rating":{"rating_star":4.5}
      }}"#,
    )
    .unwrap();
    let item = body
      .data
      .unwrap()
      .into_external("https://shopee.co.id/product/123/456".into());

    assert_eq!(item.price, 80_000);
    assert_eq!(item.merchant_id, "123");
    assert_eq!(item.product_id, "456");
    assert_eq!(item.image_url, "https://cf.shopee.co.id/file/abc123");
    assert_eq!(item.rating, 4.5);
    assert_eq!(item.sold_count, 40);
    assert_eq!(item.description, "");
  }

  #[test]
  fn missing_data_decodes_to_none() {
    let body: ItemResponse =
      serde_json::from_str(r#"{"error":4,"data":null}"#).unwrap();
    assert!(body.data.is_none());
  }

  #[tokio::test]
  async fn other_sites_are_unsupported() {
    let provider = ShopeeProvider::new(reqwest::Client::new(), "http://127.0.0.1:9".into());
    assert!(provider.supports(Site::Shopee));
    assert!(!provider.supports(Site::Blibli));

    let err = provider
      .fetch_item("https://www.blibli.com/p/kopi/ps--ABC-1")
      .await
      .unwrap_err();
    assert!(matches!(err, ProviderError::Unsupported(Site::Blibli)));
  }
}
