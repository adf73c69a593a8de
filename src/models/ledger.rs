use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{non_negative, normalize_optional, required_text};
use crate::error::AppError;

pub const EXPENSE_ICON: &str = "💸";
pub const INCOME_ICON: &str = "💰";
pub const DEFAULT_DESCRIPTION: &str = "No description";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub user_id: String,
    pub icon: String,
    pub description: String,
    pub category: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    pub fn with_fallback_icon(mut self) -> Self {
        if self.icon.trim().is_empty() {
            self.icon = EXPENSE_ICON.to_string();
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Income {
    pub id: String,
    pub user_id: String,
    pub icon: String,
    pub description: String,
    pub source: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Income {
    pub fn with_fallback_icon(mut self) -> Self {
        if self.icon.trim().is_empty() {
            self.icon = INCOME_ICON.to_string();
        }
        self
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LinkExpenseRequest {
    pub category: Option<String>,
    pub amount: Option<f64>,
    pub date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewExpense {
    pub icon: String,
    pub description: String,
    pub category: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
}

impl TryFrom<LinkExpenseRequest> for NewExpense {
    type Error = AppError;

    fn try_from(req: LinkExpenseRequest) -> Result<Self, Self::Error> {
        let amount = req
            .amount
            .ok_or_else(|| AppError::bad_request("amount is required"))?;
        Ok(Self {
            icon: normalize_optional(req.icon).unwrap_or_else(|| EXPENSE_ICON.to_string()),
            description: normalize_optional(req.description)
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            category: required_text(req.category, "category", 100)?,
            amount: non_negative(amount, "amount")?,
            date: req.date.unwrap_or_else(Utc::now),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LinkIncomeRequest {
    pub source: Option<String>,
    pub amount: Option<f64>,
    pub date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewIncome {
    pub icon: String,
    pub description: String,
    pub source: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
}

impl TryFrom<LinkIncomeRequest> for NewIncome {
    type Error = AppError;

    fn try_from(req: LinkIncomeRequest) -> Result<Self, Self::Error> {
        let amount = req
            .amount
            .ok_or_else(|| AppError::bad_request("amount is required"))?;
        Ok(Self {
            icon: normalize_optional(req.icon).unwrap_or_else(|| INCOME_ICON.to_string()),
            description: normalize_optional(req.description)
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            source: required_text(req.source, "source", 100)?,
            amount: non_negative(amount, "amount")?,
            date: req.date.unwrap_or_else(Utc::now),
        })
    }
}
