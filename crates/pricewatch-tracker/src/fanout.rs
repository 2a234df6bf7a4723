//! Fan-out: choose who hears about a price drop, build the one push message
//! for the batch, and account for the counter increment that follows it.

use std::collections::HashSet;

use pricewatch_core::{
  eligibility::is_eligible,
  item::Item,
  provider::{PushMessage, SendReport},
  user::Subscriber,
};
use uuid::Uuid;

// ─── Recipients ──────────────────────────────────────────────────────────────

/// The users included in one batch and the union of their push tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
  pub user_ids: Vec<Uuid>,
  /// Deduplicated, in first-seen order.
  pub tokens:   Vec<String>,
}

impl Recipients {
  pub fn is_empty(&self) -> bool { self.user_ids.is_empty() }
}

/// Pick the subscribers to notify about `price`/`stock`.
///
/// A subscriber is included when its subscription is eligible, it is under
/// `cap` (if any), and it has at least one non-empty push token. Users
/// without tokens are never counted as notified.
pub fn select_recipients(
  subscribers: &[Subscriber],
  price:       i64,
  stock:       i64,
  cap:         Option<u32>,
) -> Recipients {
  let mut recipients = Recipients::default();
  let mut seen_users = HashSet::new();
  let mut seen_tokens = HashSet::new();

  for sub in subscribers {
    if !is_eligible(&sub.tracked_item, price, stock) {
      continue;
    }
    if cap.is_some_and(|cap| sub.tracked_item.notification_count >= cap) {
      continue;
    }
    let mut tokens = sub.push_tokens.iter().filter(|t| !t.is_empty()).peekable();
    if tokens.peek().is_none() || !seen_users.insert(sub.user_id) {
      continue;
    }

    recipients.user_ids.push(sub.user_id);
    for token in tokens {
      if seen_tokens.insert(token.as_str()) {
        recipients.tokens.push(token.clone());
      }
    }
  }

  recipients
}

// ─── Message ─────────────────────────────────────────────────────────────────

/// Build the single push message sent for `item`'s new price.
pub fn build_message(item: &Item, tokens: Vec<String>, name_limit: usize) -> PushMessage {
  PushMessage {
    tokens,
    title: format!("Price drop: {}", truncate_name(&item.name, name_limit)),
    body: format!("{} is now Rp {}", item.name, format_rupiah(item.price)),
    item_id: item.item_id,
  }
}

/// Shorten `name` to `limit` characters, marking the cut with `...`.
pub fn truncate_name(name: &str, limit: usize) -> String {
  match name.char_indices().nth(limit) {
    Some((cut, _)) => format!("{}...", &name[..cut]),
    None => name.to_owned(),
  }
}

/// Format a whole-rupiah amount with `.` thousands separators.
pub fn format_rupiah(amount: i64) -> String {
  let digits = amount.unsigned_abs().to_string();
  let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
  if amount < 0 {
    out.push('-');
  }
  for (i, ch) in digits.chars().enumerate() {
    if i > 0 && (digits.len() - i) % 3 == 0 {
      out.push('.');
    }
    out.push(ch);
  }
  out
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

/// How the counter increment after a dispatch turned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
  /// Every submitted user was credited.
  Matched(usize),
  /// The store modified a different number of users than submitted, e.g.
  /// because one unsubscribed mid-flight. Logged, never fatal.
  Mismatch { submitted: usize, modified: usize },
  /// The increment itself failed; the batch went out uncounted.
  Failed,
}

pub fn reconcile(submitted: usize, modified: usize) -> Reconciliation {
  if submitted == modified {
    Reconciliation::Matched(modified)
  } else {
    Reconciliation::Mismatch { submitted, modified }
  }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// Why no dispatch happened for a refreshed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  PriceUnchanged,
  OutOfStock,
  /// The refreshed item could not be persisted; the next tick re-detects the
  /// change.
  NotPersisted,
  NoRecipients,
  /// Subscribers could not be read.
  LookupFailed,
}

/// What the fan-out step did for one refreshed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
  Skipped(SkipReason),
  Dispatched {
    recipients:     usize,
    tokens:         usize,
    report:         SendReport,
    reconciliation: Reconciliation,
  },
  /// The notifier failed; no counters were touched.
  DispatchFailed { recipients: usize },
}
