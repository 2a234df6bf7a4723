//! Supported e-commerce sites and URL classification.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use url::Url;

use crate::{Error, Result};

/// A site the tracker knows how to refresh. The lowercase name doubles as the
/// `site` column value in storage.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Site {
  Shopee,
  Tokopedia,
  Blibli,
}

impl Site {
  /// All sites, in scheduling order.
  pub fn all() -> impl Iterator<Item = Site> { Site::iter() }

  /// Parse the stored discriminant (`"shopee"`, ...).
  pub fn from_discriminant(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownSite(s.to_owned()))
  }

  /// Position of this site in [`Site::all`]; used to pick its start offset.
  pub fn ordinal(self) -> usize {
    Site::iter().position(|s| s == self).unwrap_or_default()
  }

  fn from_host(host: &str) -> Option<Self> {
    match host {
      "shopee.co.id" => Some(Self::Shopee),
      "www.tokopedia.com" | "tokopedia.com" => Some(Self::Tokopedia),
      "www.blibli.com" | "blibli.com" => Some(Self::Blibli),
      _ => None,
    }
  }
}

/// A product URL resolved to its site, with query string and fragment
/// stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteUrl {
  pub site:      Site,
  /// `https://{host}{path}`.
  pub canonical: String,
}

/// Classify a user-supplied product URL by host.
pub fn classify(raw: &str) -> Result<SiteUrl> {
  let parsed = Url::parse(raw.trim()).map_err(|source| Error::InvalidUrl {
    url: raw.to_owned(),
    source,
  })?;
  let host = parsed.host_str().unwrap_or_default();
  let site = Site::from_host(host)
    .ok_or_else(|| Error::UnsupportedSite(raw.to_owned()))?;

  Ok(SiteUrl {
    site,
    canonical: format!("https://{host}{}", parsed.path()),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classifies_known_hosts_and_strips_query() {
    let s = classify("https://shopee.co.id/Some-Phone-i.123.456?sp_atk=abc#top")
      .unwrap();
    assert_eq!(s.site, Site::Shopee);
    assert_eq!(s.canonical, "https://shopee.co.id/Some-Phone-i.123.456");

    let t = classify("http://www.tokopedia.com/shop/item").unwrap();
    assert_eq!(t.site, Site::Tokopedia);
    assert_eq!(t.canonical, "https://www.tokopedia.com/shop/item");

    let b = classify("https://WWW.BLIBLI.COM/p/thing/ps--ABC-123").unwrap();
    assert_eq!(b.site, Site::Blibli);
  }

  #[test]
  fn rejects_other_hosts() {
    assert!(matches!(
      classify("https://example.com/product/1"),
      Err(Error::UnsupportedSite(_))
    ));
    assert!(matches!(classify("not a url"), Err(Error::InvalidUrl { .. })));
  }

  #[test]
  fn discriminant_round_trips() {
    for site in Site::all() {
      assert_eq!(Site::from_discriminant(site.as_ref()).unwrap(), site);
    }
    assert_eq!(Site::Tokopedia.to_string(), "tokopedia");
    assert!(Site::from_discriminant("lazada").is_err());
  }

  #[test]
  fn ordinal_follows_declaration_order() {
    assert_eq!(Site::Shopee.ordinal(), 0);
    assert_eq!(Site::Tokopedia.ordinal(), 1);
    assert_eq!(Site::Blibli.ordinal(), 2);
  }
}
