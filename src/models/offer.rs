use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::models::ProviderId;
use crate::utils::error::{AppError, Result};

pub const DEFAULT_CURRENCY: &str = "EUR";

/// An exact monetary amount together with its ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    pub fn eur(amount: Decimal) -> Self {
        Self::new(amount, DEFAULT_CURRENCY)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.currency)
    }
}

/// A stored lunch offer. Never updated in place; replaced by delete and insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LunchOffer {
    pub id: i64,
    pub name: String,
    pub day: NaiveDate,
    pub price: Money,
    pub provider: ProviderId,
}

/// A lunch offer that has not been stored yet and therefore has no id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLunchOffer {
    pub name: String,
    pub day: NaiveDate,
    pub price: Money,
    pub provider: ProviderId,
}

/// What a resolver produces for its own provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedOffer {
    pub name: String,
    pub day: NaiveDate,
    pub price: Money,
}

impl ResolvedOffer {
    pub fn new(name: impl Into<String>, day: NaiveDate, price: Money) -> Self {
        Self {
            name: name.into(),
            day,
            price,
        }
    }

    pub fn for_provider(self, provider: &ProviderId) -> NewLunchOffer {
        NewLunchOffer {
            name: self.name,
            day: self.day,
            price: self.price,
            provider: provider.clone(),
        }
    }
}

impl NewLunchOffer {
    pub fn with_id(self, id: i64) -> LunchOffer {
        LunchOffer {
            id,
            name: self.name,
            day: self.day,
            price: self.price,
            provider: self.provider,
        }
    }
}

/// Row layout of the `lunch_offers` table.
#[derive(Debug, FromRow)]
pub(crate) struct LunchOfferRow {
    pub id: i64,
    pub name: String,
    pub day: NaiveDate,
    pub price_amount: String,
    pub price_currency: String,
    pub provider: ProviderId,
}

impl TryFrom<LunchOfferRow> for LunchOffer {
    type Error = AppError;

    fn try_from(row: LunchOfferRow) -> Result<Self> {
        let amount = Decimal::from_str(&row.price_amount).map_err(|e| AppError::Parse {
            message: format!("stored price '{}' of offer {}: {}", row.price_amount, row.id, e),
        })?;

        Ok(LunchOffer {
            id: row.id,
            name: row.name,
            day: row.day,
            price: Money::new(amount, row.price_currency),
            provider: row.provider,
        })
    }
}

/// Earliest day among `offers`, the start of the replacement window.
pub fn earliest_day<'a, I>(offers: I) -> Option<NaiveDate>
where
    I: IntoIterator<Item = &'a ResolvedOffer>,
{
    offers.into_iter().map(|offer| offer.day).min()
}
