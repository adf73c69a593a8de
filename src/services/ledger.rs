//! Expense and income records. They belong to the finance side of the app; trips only
//! keep their ids and read amounts back.

use chrono::Utc;
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::ledger::{Expense, Income, NewExpense, NewIncome},
};

pub async fn insert_expense<'e, E>(
    executor: E,
    user_id: &str,
    new: &NewExpense,
) -> Result<Expense, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let expense = Expense {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        icon: new.icon.clone(),
        description: new.description.clone(),
        category: new.category.clone(),
        amount: new.amount,
        date: new.date,
        created_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO expenses (id, user_id, icon, description, category, amount, date, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(&expense.id)
    .bind(&expense.user_id)
    .bind(&expense.icon)
    .bind(&expense.description)
    .bind(&expense.category)
    .bind(expense.amount)
    .bind(expense.date)
    .bind(expense.created_at)
    .execute(executor)
    .await?;
    Ok(expense)
}

pub async fn insert_income<'e, E>(
    executor: E,
    user_id: &str,
    new: &NewIncome,
) -> Result<Income, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let income = Income {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        icon: new.icon.clone(),
        description: new.description.clone(),
        source: new.source.clone(),
        amount: new.amount,
        date: new.date,
        created_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO incomes (id, user_id, icon, description, source, amount, date, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(&income.id)
    .bind(&income.user_id)
    .bind(&income.icon)
    .bind(&income.description)
    .bind(&income.source)
    .bind(income.amount)
    .bind(income.date)
    .bind(income.created_at)
    .execute(executor)
    .await?;
    Ok(income)
}

/// Expenses linked to a trip, in link order.
pub async fn trip_expenses<'e, E>(executor: E, trip_id: &str) -> Result<Vec<Expense>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let expenses = sqlx::query_as::<_, Expense>(
        r#"SELECT e.id, e.user_id, e.icon, e.description, e.category, e.amount, e.date, e.created_at
           FROM trip_expenses te JOIN expenses e ON e.id = te.expense_id
           WHERE te.trip_id = ?1 ORDER BY te.rowid"#,
    )
    .bind(trip_id)
    .fetch_all(executor)
    .await?;
    Ok(expenses)
}

/// Incomes linked to a trip, in link order.
pub async fn trip_incomes<'e, E>(executor: E, trip_id: &str) -> Result<Vec<Income>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let incomes = sqlx::query_as::<_, Income>(
        r#"SELECT i.id, i.user_id, i.icon, i.description, i.source, i.amount, i.date, i.created_at
           FROM trip_incomes ti JOIN incomes i ON i.id = ti.income_id
           WHERE ti.trip_id = ?1 ORDER BY ti.rowid"#,
    )
    .bind(trip_id)
    .fetch_all(executor)
    .await?;
    Ok(incomes)
}
