//! The pricing catalog.
//!
//! Checkout is not wired to a payment processor; only the catalog is served.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
  Basic,
  Premium,
  DynastyFounder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
  Monthly,
  OneTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
  pub kind:          PlanKind,
  pub name:          &'static str,
  /// Price in euro cents.
  pub price_cents:   u32,
  pub period:        BillingPeriod,
  /// `None` means unlimited.
  pub max_dynasties: Option<u32>,
  pub max_members:   Option<u32>,
  pub features:      &'static [&'static str],
}

impl Plan {
  pub fn catalog() -> [Plan; 3] {
    [Self::get(PlanKind::Basic), Self::get(PlanKind::Premium), Self::get(PlanKind::DynastyFounder)]
  }

  pub fn get(kind: PlanKind) -> Plan {
    match kind {
      PlanKind::Basic => Plan {
        kind,
        name: "Basic",
        price_cents: 500,
        period: BillingPeriod::Monthly,
        max_dynasties: Some(1),
        max_members: Some(50),
        features: &["1 dynasty", "Up to 50 members", "Simple family tree", "Email support"],
      },
      PlanKind::Premium => Plan {
        kind,
        name: "Premium",
        price_cents: 1000,
        period: BillingPeriod::Monthly,
        max_dynasties: Some(3),
        max_members: None,
        features: &[
          "3 dynasties",
          "Unlimited members",
          "Advanced trees with photos",
          "Family chat",
          "WhatsApp invitations",
          "Priority support",
        ],
      },
      PlanKind::DynastyFounder => Plan {
        kind,
        name: "Dynasty Founder",
        price_cents: 2500,
        period: BillingPeriod::OneTime,
        max_dynasties: None,
        max_members: None,
        features: &[
          "Unlimited dynasties",
          "All Premium privileges",
          "Advanced genealogy tools",
          "High-quality PDF export",
          "Family statistics",
          "Founder badge",
          "VIP support",
        ],
      },
    }
  }
}
