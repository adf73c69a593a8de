use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use tracing::info;
use uuid::Uuid;

use crate::{
    access,
    db::DbPool,
    error::AppError,
    models::{
        ledger::{Expense, Income, NewExpense, NewIncome},
        trip::{NewPlace, NewTrip, ParticipantEmails, Place, Trip, TripDetail, TripStats, Visibility},
    },
    services::{directory::UserDirectory, ledger},
};

#[derive(FromRow)]
struct TripRow {
    id: String,
    creator_id: String,
    name: String,
    destination: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    description: String,
    visibility: String,
    planned_budget: f64,
    real_budget: f64,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TripRow {
    fn into_trip(
        self,
        participants: Vec<String>,
        expenses: Vec<String>,
        incomes: Vec<String>,
        places: Vec<Place>,
    ) -> Result<Trip, AppError> {
        Ok(Trip {
            id: self.id,
            creator_id: self.creator_id,
            name: self.name,
            destination: self.destination,
            start_date: self.start_date,
            end_date: self.end_date,
            description: self.description,
            participants,
            visibility: self.visibility.parse()?,
            planned_budget: self.planned_budget,
            real_budget: self.real_budget,
            currency: self.currency,
            expenses,
            incomes,
            places,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct TripPlaceRow {
    trip_id: String,
    #[sqlx(flatten)]
    place: Place,
}

/// Trips a user created or takes part in. `?1` is the user id.
const LISTED_TRIP_IDS: &str = "SELECT id FROM trips
       WHERE creator_id = ?1
          OR id IN (SELECT trip_id FROM trip_participants WHERE user_id = ?1)";

fn group_by_trip<T>(rows: Vec<(String, T)>) -> HashMap<String, Vec<T>> {
    let mut grouped: HashMap<String, Vec<T>> = HashMap::new();
    for (trip_id, value) in rows {
        grouped.entry(trip_id).or_default().push(value);
    }
    grouped
}

/// Owns trip records: membership, places, linked records and derived stats.
#[derive(Clone)]
pub struct TripStore {
    db: DbPool,
    directory: UserDirectory,
}

impl TripStore {
    pub fn new(db: DbPool, directory: UserDirectory) -> Self {
        Self { db, directory }
    }

    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    pub async fn create(&self, creator_id: &str, new: NewTrip) -> Result<Trip, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"INSERT INTO trips (id, creator_id, name, destination, start_date, end_date, description,
                   visibility, planned_budget, real_budget, currency, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?11, ?11)"#,
        )
        .bind(&id)
        .bind(creator_id)
        .bind(&new.name)
        .bind(&new.destination)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(&new.description)
        .bind(new.visibility.as_str())
        .bind(new.planned_budget)
        .bind(&new.currency)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // Creator goes in first; supplied ids that name no user are dropped.
        let members = std::iter::once(creator_id).chain(new.participants.iter().map(String::as_str));
        for user_id in members {
            sqlx::query(
                r#"INSERT OR IGNORE INTO trip_participants (trip_id, user_id, added_at)
                   SELECT ?1, id, ?3 FROM users WHERE id = ?2"#,
            )
            .bind(&id)
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(trip_id = %id, creator = %creator_id, "trip created");
        self.require_trip(&id).await
    }

    pub async fn find(&self, trip_id: &str) -> Result<Option<Trip>, AppError> {
        let row = sqlx::query_as::<_, TripRow>(
            r#"SELECT id, creator_id, name, destination, start_date, end_date, description, visibility,
                      planned_budget, real_budget, currency, created_at, updated_at
               FROM trips WHERE id = ?1"#,
        )
        .bind(trip_id)
        .fetch_optional(&self.db)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let participants: Vec<String> = sqlx::query_scalar(
            "SELECT user_id FROM trip_participants WHERE trip_id = ?1 ORDER BY rowid",
        )
        .bind(trip_id)
        .fetch_all(&self.db)
        .await?;
        let expenses: Vec<String> = sqlx::query_scalar(
            "SELECT expense_id FROM trip_expenses WHERE trip_id = ?1 ORDER BY rowid",
        )
        .bind(trip_id)
        .fetch_all(&self.db)
        .await?;
        let incomes: Vec<String> = sqlx::query_scalar(
            "SELECT income_id FROM trip_incomes WHERE trip_id = ?1 ORDER BY rowid",
        )
        .bind(trip_id)
        .fetch_all(&self.db)
        .await?;
        let places = self.places(trip_id).await?;

        row.into_trip(participants, expenses, incomes, places).map(Some)
    }

    async fn require_trip(&self, trip_id: &str) -> Result<Trip, AppError> {
        self.find(trip_id)
            .await?
            .ok_or_else(|| AppError::not_found("Trip not found"))
    }

    async fn places(&self, trip_id: &str) -> Result<Vec<Place>, AppError> {
        let places = sqlx::query_as::<_, Place>(
            r#"SELECT id, name, location, planned_cost, notes, visited
               FROM trip_places WHERE trip_id = ?1 ORDER BY rowid"#,
        )
        .bind(trip_id)
        .fetch_all(&self.db)
        .await?;
        Ok(places)
    }

    async fn touch(&self, trip_id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE trips SET updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(trip_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn get(&self, trip_id: &str, requester_id: &str) -> Result<TripDetail, AppError> {
        access::authorize_read(&self.db, trip_id, requester_id).await?;
        let trip = self.require_trip(trip_id).await?;

        let creator = self
            .directory
            .public_profile(&trip.creator_id)
            .await?
            .ok_or_else(|| AppError::Other(anyhow::anyhow!("creator of trip {trip_id} is missing")))?;
        let participants = self.directory.public_profiles(&trip.participants).await?;
        let expenses = ledger::trip_expenses(&self.db, trip_id)
            .await?
            .into_iter()
            .map(Expense::with_fallback_icon)
            .collect();
        let incomes = ledger::trip_incomes(&self.db, trip_id)
            .await?
            .into_iter()
            .map(Income::with_fallback_icon)
            .collect();

        Ok(TripDetail {
            id: trip.id,
            creator,
            name: trip.name,
            destination: trip.destination,
            start_date: trip.start_date,
            end_date: trip.end_date,
            description: trip.description,
            participants,
            visibility: trip.visibility,
            planned_budget: trip.planned_budget,
            real_budget: trip.real_budget,
            currency: trip.currency,
            expenses,
            incomes,
            places: trip.places,
            created_at: trip.created_at,
            updated_at: trip.updated_at,
        })
    }

    /// Trips the user created or takes part in, newest first.
    ///
    /// Loads the trip rows and each linked table once for the whole listing, inside
    /// one read transaction so every trip comes from the same snapshot.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Trip>, AppError> {
        let mut tx = self.db.begin().await?;

        let rows = sqlx::query_as::<_, TripRow>(&format!(
            r#"SELECT id, creator_id, name, destination, start_date, end_date, description, visibility,
                      planned_budget, real_budget, currency, created_at, updated_at
               FROM trips WHERE id IN ({LISTED_TRIP_IDS})
               ORDER BY created_at DESC, rowid DESC"#
        ))
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut participants = group_by_trip(
            sqlx::query_as::<_, (String, String)>(&format!(
                "SELECT trip_id, user_id FROM trip_participants
                 WHERE trip_id IN ({LISTED_TRIP_IDS}) ORDER BY rowid"
            ))
            .bind(user_id)
            .fetch_all(&mut *tx)
            .await?,
        );
        let mut expenses = group_by_trip(
            sqlx::query_as::<_, (String, String)>(&format!(
                "SELECT trip_id, expense_id FROM trip_expenses
                 WHERE trip_id IN ({LISTED_TRIP_IDS}) ORDER BY rowid"
            ))
            .bind(user_id)
            .fetch_all(&mut *tx)
            .await?,
        );
        let mut incomes = group_by_trip(
            sqlx::query_as::<_, (String, String)>(&format!(
                "SELECT trip_id, income_id FROM trip_incomes
                 WHERE trip_id IN ({LISTED_TRIP_IDS}) ORDER BY rowid"
            ))
            .bind(user_id)
            .fetch_all(&mut *tx)
            .await?,
        );
        let places = sqlx::query_as::<_, TripPlaceRow>(&format!(
            r#"SELECT trip_id, id, name, location, planned_cost, notes, visited
               FROM trip_places WHERE trip_id IN ({LISTED_TRIP_IDS}) ORDER BY rowid"#
        ))
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;
        let mut places = group_by_trip(
            places
                .into_iter()
                .map(|row| (row.trip_id, row.place))
                .collect(),
        );
        tx.commit().await?;

        rows.into_iter()
            .map(|row| {
                let id = row.id.clone();
                row.into_trip(
                    participants.remove(&id).unwrap_or_default(),
                    expenses.remove(&id).unwrap_or_default(),
                    incomes.remove(&id).unwrap_or_default(),
                    places.remove(&id).unwrap_or_default(),
                )
            })
            .collect()
    }

    pub async fn add_participants_by_email(
        &self,
        trip_id: &str,
        requester_id: &str,
        emails: &ParticipantEmails,
    ) -> Result<Trip, AppError> {
        access::authorize_manage(&self.db, trip_id, requester_id, "add participants").await?;

        let users = self.directory.find_ids_by_emails(emails.as_slice()).await?;
        if users.is_empty() {
            return Err(AppError::not_found(
                "No matching users found for given emails",
            ));
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        for user in &users {
            sqlx::query(
                "INSERT OR IGNORE INTO trip_participants (trip_id, user_id, added_at) VALUES (?1, ?2, ?3)",
            )
            .bind(trip_id)
            .bind(&user.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("UPDATE trips SET updated_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(trip_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(
            trip_id,
            resolved = users.len(),
            requested = emails.as_slice().len(),
            "participants added"
        );
        self.require_trip(trip_id).await
    }

    /// Removing someone who is not a participant is a successful no-op.
    pub async fn remove_participant(
        &self,
        trip_id: &str,
        requester_id: &str,
        target_user_id: &str,
    ) -> Result<Trip, AppError> {
        let access =
            access::authorize_manage(&self.db, trip_id, requester_id, "remove participants")
                .await?;
        if access.is_creator(target_user_id) {
            return Err(AppError::bad_request("Cannot remove the trip creator"));
        }

        let removed = sqlx::query("DELETE FROM trip_participants WHERE trip_id = ?1 AND user_id = ?2")
            .bind(trip_id)
            .bind(target_user_id)
            .execute(&self.db)
            .await?
            .rows_affected();
        if removed > 0 {
            self.touch(trip_id).await?;
            info!(trip_id, user_id = target_user_id, "participant removed");
        }
        self.require_trip(trip_id).await
    }

    pub async fn add_place(
        &self,
        trip_id: &str,
        requester_id: &str,
        place: NewPlace,
    ) -> Result<Trip, AppError> {
        access::authorize_manage(&self.db, trip_id, requester_id, "add places").await?;

        sqlx::query(
            r#"INSERT INTO trip_places (id, trip_id, name, location, planned_cost, notes, visited, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(trip_id)
        .bind(&place.name)
        .bind(&place.location)
        .bind(place.planned_cost)
        .bind(&place.notes)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;
        self.touch(trip_id).await?;

        self.require_trip(trip_id).await
    }

    pub async fn set_place_visited(
        &self,
        trip_id: &str,
        requester_id: &str,
        place_id: &str,
        visited: bool,
    ) -> Result<Place, AppError> {
        access::authorize_manage(&self.db, trip_id, requester_id, "update places").await?;

        let updated = sqlx::query("UPDATE trip_places SET visited = ?1 WHERE id = ?2 AND trip_id = ?3")
            .bind(visited)
            .bind(place_id)
            .bind(trip_id)
            .execute(&self.db)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(AppError::not_found("Place not found"));
        }
        self.touch(trip_id).await?;

        let place = sqlx::query_as::<_, Place>(
            "SELECT id, name, location, planned_cost, notes, visited FROM trip_places WHERE id = ?1",
        )
        .bind(place_id)
        .fetch_one(&self.db)
        .await?;
        Ok(place)
    }

    /// Creates the expense and links it in one transaction, so a failed link never
    /// leaves an orphaned record behind.
    pub async fn link_expense(
        &self,
        trip_id: &str,
        requester_id: &str,
        new: NewExpense,
    ) -> Result<Expense, AppError> {
        access::authorize_read(&self.db, trip_id, requester_id).await?;

        let mut tx = self.db.begin().await?;
        let expense = ledger::insert_expense(&mut *tx, requester_id, &new).await?;
        sqlx::query("INSERT INTO trip_expenses (trip_id, expense_id) VALUES (?1, ?2)")
            .bind(trip_id)
            .bind(&expense.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE trips SET updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(trip_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(trip_id, expense_id = %expense.id, amount = expense.amount, "expense linked");
        Ok(expense)
    }

    pub async fn link_income(
        &self,
        trip_id: &str,
        requester_id: &str,
        new: NewIncome,
    ) -> Result<Income, AppError> {
        access::authorize_read(&self.db, trip_id, requester_id).await?;

        let mut tx = self.db.begin().await?;
        let income = ledger::insert_income(&mut *tx, requester_id, &new).await?;
        sqlx::query("INSERT INTO trip_incomes (trip_id, income_id) VALUES (?1, ?2)")
            .bind(trip_id)
            .bind(&income.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE trips SET updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(trip_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(trip_id, income_id = %income.id, amount = income.amount, "income linked");
        Ok(income)
    }

    pub async fn set_visibility(
        &self,
        trip_id: &str,
        requester_id: &str,
        visibility: Visibility,
    ) -> Result<Visibility, AppError> {
        access::authorize_manage(&self.db, trip_id, requester_id, "update visibility").await?;

        sqlx::query("UPDATE trips SET visibility = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(visibility.as_str())
            .bind(Utc::now())
            .bind(trip_id)
            .execute(&self.db)
            .await?;

        info!(trip_id, %visibility, "visibility updated");
        Ok(visibility)
    }

    /// Planned vs. actual spend. The actual total is written back to `real_budget`.
    pub async fn compute_stats(
        &self,
        trip_id: &str,
        requester_id: &str,
    ) -> Result<TripStats, AppError> {
        access::authorize_read(&self.db, trip_id, requester_id).await?;

        let actual_total: f64 = sqlx::query_scalar(
            r#"SELECT CAST(COALESCE(SUM(e.amount), 0) AS REAL)
               FROM trip_expenses te JOIN expenses e ON e.id = te.expense_id
               WHERE te.trip_id = ?1"#,
        )
        .bind(trip_id)
        .fetch_one(&self.db)
        .await?;

        let planned_places_total: f64 = sqlx::query_scalar(
            "SELECT CAST(COALESCE(SUM(planned_cost), 0) AS REAL) FROM trip_places WHERE trip_id = ?1",
        )
        .bind(trip_id)
        .fetch_one(&self.db)
        .await?;

        let (planned_budget, currency): (f64, String) = sqlx::query_as(
            "UPDATE trips SET real_budget = ?1 WHERE id = ?2 RETURNING planned_budget, currency",
        )
        .bind(actual_total)
        .bind(trip_id)
        .fetch_one(&self.db)
        .await?;

        Ok(TripStats {
            planned_budget,
            planned_places_total,
            actual_total,
            difference: planned_budget - actual_total,
            currency,
        })
    }
}
