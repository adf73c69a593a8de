use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiJson, Envelope};
use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{
        ledger::{LinkExpenseRequest, LinkIncomeRequest, NewExpense, NewIncome},
        message::PostMessageRequest,
        trip::{
            AddParticipantsRequest, AddPlaceRequest, CreateTripRequest, NewPlace, NewTrip,
            ParticipantEmails, PlaceVisitedRequest, Visibility, VisibilityRequest,
        },
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_trip).get(list_trips))
        .route("/:trip_id", get(get_trip))
        .route("/:trip_id/expenses", post(link_expense))
        .route("/:trip_id/incomes", post(link_income))
        .route("/:trip_id/participants", post(add_participants))
        .route("/:trip_id/participants/:user_id", delete(remove_participant))
        .route("/:trip_id/places", post(add_place))
        .route("/:trip_id/places/:place_id", put(set_place_visited))
        .route("/:trip_id/stats", get(trip_stats))
        .route("/:trip_id/messages", post(post_message).get(chat_history))
        .route("/:trip_id/visibility", patch(set_visibility))
}

async fn create_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(body): ApiJson<CreateTripRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trip = state.trips.create_trip(user, NewTrip::try_from(body)?).await?;
    Ok((StatusCode::CREATED, Json(Envelope::data(trip))))
}

async fn list_trips(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trips = state.trips.list_trips(user).await?;
    Ok(Json(Envelope::data(trips)))
}

async fn get_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trip = state.trips.get_trip(user, &trip_id).await?;
    Ok(Json(trip))
}

async fn link_expense(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    ApiJson(body): ApiJson<LinkExpenseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let expense = state
        .trips
        .link_expense(user, &trip_id, NewExpense::try_from(body)?)
        .await?;
    Ok(Json(Envelope::data(expense)))
}

async fn link_income(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    ApiJson(body): ApiJson<LinkIncomeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let income = state
        .trips
        .link_income(user, &trip_id, NewIncome::try_from(body)?)
        .await?;
    Ok(Json(Envelope::data(income)))
}

async fn add_participants(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    ApiJson(body): ApiJson<AddParticipantsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trip = state
        .trips
        .add_participants(user, &trip_id, ParticipantEmails::try_from(body)?)
        .await?;
    Ok(Json(Envelope::with_message(
        "Participants added successfully",
        trip,
    )))
}

async fn remove_participant(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trip = state
        .trips
        .remove_participant(user, &trip_id, &user_id)
        .await?;
    Ok(Json(Envelope::with_message(
        "Participant removed successfully",
        trip,
    )))
}

async fn add_place(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    ApiJson(body): ApiJson<AddPlaceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trip = state
        .trips
        .add_place(user, &trip_id, NewPlace::try_from(body)?)
        .await?;
    Ok(Json(Envelope::data(trip)))
}

async fn set_place_visited(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, place_id)): Path<(String, String)>,
    ApiJson(body): ApiJson<PlaceVisitedRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let place = state
        .trips
        .set_place_visited(user, &trip_id, &place_id, body.visited)
        .await?;
    Ok(Json(Envelope::with_message("Place updated successfully", place)))
}

async fn trip_stats(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let stats = state.trips.trip_stats(user, &trip_id).await?;
    Ok(Json(Envelope::data(stats)))
}

async fn post_message(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    ApiJson(body): ApiJson<PostMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let message = state.trips.post_message(user, &trip_id, &body.text).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

async fn chat_history(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let Query(query) = query?;
    let messages = state.trips.chat_history(user, &trip_id, query.limit).await?;
    Ok(Json(messages))
}

async fn set_visibility(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    ApiJson(body): ApiJson<VisibilityRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let visibility: Visibility = body.visibility.parse()?;
    let visibility = state.trips.set_visibility(user, &trip_id, visibility).await?;
    Ok(Json(json!({
        "message": "Visibility updated successfully",
        "visibility": visibility,
    })))
}
