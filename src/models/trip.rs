use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{
    ensure_max_len, ledger::Expense, ledger::Income, non_negative, normalize_optional,
    required_text, user::PublicUser,
};
use crate::error::AppError;

pub const DEFAULT_CURRENCY: &str = "INR";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Group,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Group => "group",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "group" => Ok(Visibility::Group),
            "private" => Ok(Visibility::Private),
            _ => Err(AppError::bad_request("Invalid visibility option")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub planned_cost: f64,
    pub notes: Option<String>,
    pub visited: bool,
}

/// A trip as stored: linked users and records are referenced by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    pub creator_id: String,
    pub name: String,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub description: String,
    pub participants: Vec<String>,
    pub visibility: Visibility,
    pub planned_budget: f64,
    pub real_budget: f64,
    pub currency: String,
    pub expenses: Vec<String>,
    pub incomes: Vec<String>,
    pub places: Vec<Place>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A trip with its users and financial records expanded for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDetail {
    pub id: String,
    pub creator: PublicUser,
    pub name: String,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub description: String,
    pub participants: Vec<PublicUser>,
    pub visibility: Visibility,
    pub planned_budget: f64,
    pub real_budget: f64,
    pub currency: String,
    pub expenses: Vec<Expense>,
    pub incomes: Vec<Income>,
    pub places: Vec<Place>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripStats {
    pub planned_budget: f64,
    pub planned_places_total: f64,
    pub actual_total: f64,
    pub difference: f64,
    pub currency: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTripRequest {
    pub name: Option<String>,
    pub destination: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub planned_budget: Option<f64>,
    pub visibility: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTrip {
    pub name: String,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub description: String,
    pub planned_budget: f64,
    pub visibility: Visibility,
    pub participants: Vec<String>,
    pub currency: String,
}

impl TryFrom<CreateTripRequest> for NewTrip {
    type Error = AppError;

    fn try_from(req: CreateTripRequest) -> Result<Self, Self::Error> {
        let name = required_text(req.name, "name", 100)?;
        let destination = required_text(req.destination, "destination", 100)?;
        let start_date = req
            .start_date
            .ok_or_else(|| AppError::bad_request("startDate is required"))?;
        let end_date = req
            .end_date
            .ok_or_else(|| AppError::bad_request("endDate is required"))?;
        if end_date < start_date {
            return Err(AppError::bad_request(
                "endDate must not be before startDate",
            ));
        }

        let description = normalize_optional(req.description).unwrap_or_default();
        ensure_max_len(&description, "description", 1000)?;

        let planned_budget = non_negative(req.planned_budget.unwrap_or(0.0), "plannedBudget")?;

        let visibility = match req.visibility.as_deref() {
            Some(value) => value.parse()?,
            None => Visibility::default(),
        };

        let currency =
            normalize_optional(req.currency).unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        ensure_max_len(&currency, "currency", 10)?;

        let mut participants: Vec<String> = Vec::new();
        for id in req.participants {
            let id = id.trim().to_string();
            if !id.is_empty() && !participants.contains(&id) {
                participants.push(id);
            }
        }

        Ok(Self {
            name,
            destination,
            start_date,
            end_date,
            description,
            planned_budget,
            visibility,
            participants,
            currency,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPlaceRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub planned_cost: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPlace {
    pub name: String,
    pub location: Option<String>,
    pub planned_cost: f64,
    pub notes: Option<String>,
}

impl TryFrom<AddPlaceRequest> for NewPlace {
    type Error = AppError;

    fn try_from(req: AddPlaceRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            name: required_text(req.name, "name", 200)?,
            location: normalize_optional(req.location),
            planned_cost: non_negative(req.planned_cost.unwrap_or(0.0), "plannedCost")?,
            notes: normalize_optional(req.notes),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PlaceVisitedRequest {
    pub visited: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddParticipantsRequest {
    #[serde(default)]
    pub emails: Vec<String>,
}

/// Lowercased, de-duplicated, non-empty list of email addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantEmails(Vec<String>);

impl ParticipantEmails {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl TryFrom<AddParticipantsRequest> for ParticipantEmails {
    type Error = AppError;

    fn try_from(req: AddParticipantsRequest) -> Result<Self, Self::Error> {
        let mut emails: Vec<String> = Vec::new();
        for email in req.emails {
            let email = email.trim().to_lowercase();
            if !email.is_empty() && !emails.contains(&email) {
                emails.push(email);
            }
        }
        if emails.is_empty() {
            return Err(AppError::bad_request("emails must be a non-empty array"));
        }
        Ok(Self(emails))
    }
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    #[serde(default)]
    pub visibility: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateTripRequest {
        CreateTripRequest {
            name: Some("  Goa  ".into()),
            destination: Some("Goa".into()),
            start_date: NaiveDate::from_ymd_opt(2024, 12, 20),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 27),
            ..Default::default()
        }
    }

    #[test]
    fn new_trip_applies_defaults() {
        let trip = NewTrip::try_from(request()).unwrap();
        assert_eq!(trip.name, "Goa");
        assert_eq!(trip.visibility, Visibility::Group);
        assert_eq!(trip.currency, "INR");
        assert_eq!(trip.planned_budget, 0.0);
        assert!(trip.description.is_empty());
    }

    #[test]
    fn new_trip_requires_core_fields() {
        for strip in ["name", "destination", "startDate", "endDate"] {
            let mut req = request();
            match strip {
                "name" => req.name = Some("   ".into()),
                "destination" => req.destination = None,
                "startDate" => req.start_date = None,
                _ => req.end_date = None,
            }
            let err = NewTrip::try_from(req).unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{strip}: {err}");
        }
    }

    #[test]
    fn new_trip_rejects_reversed_dates_and_unknown_visibility() {
        let mut reversed = request();
        reversed.end_date = NaiveDate::from_ymd_opt(2024, 12, 1);
        assert!(NewTrip::try_from(reversed).is_err());

        let mut public = request();
        public.visibility = Some("public".into());
        assert!(NewTrip::try_from(public).is_err());
    }

    #[test]
    fn participant_emails_are_normalized() {
        let emails = ParticipantEmails::try_from(AddParticipantsRequest {
            emails: vec![" B@X.com ".into(), "b@x.com".into(), "".into()],
        })
        .unwrap();
        assert_eq!(emails.as_slice(), ["b@x.com".to_string()]);

        let empty = ParticipantEmails::try_from(AddParticipantsRequest { emails: vec![] });
        assert!(matches!(empty, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn visibility_parses_only_known_values() {
        assert_eq!("private".parse::<Visibility>().unwrap(), Visibility::Private);
        assert_eq!(Visibility::Group.to_string(), "group");
        assert!("secret".parse::<Visibility>().is_err());
    }

    #[test]
    fn place_defaults_cost_to_zero() {
        let place = NewPlace::try_from(AddPlaceRequest {
            name: Some("Fort Aguada".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(place.planned_cost, 0.0);
        assert!(NewPlace::try_from(AddPlaceRequest::default()).is_err());
    }
}
