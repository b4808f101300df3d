//! Contact endpoints. Every operation is scoped to the authenticated user.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use tracing::info;

use domain::models::{
    Contact, ContactResponse, CreateContactRequest, ListContactsQuery, SearchContactsQuery,
    UpdateContactRequest,
};
use domain::services::{upcoming_birthdays, UPCOMING_BIRTHDAY_DAYS};
use persistence::entities::ContactEntity;
use persistence::repositories::ContactRepository;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::{ApiPath, CurrentUser, ValidatedJson, ValidatedQuery};
use crate::middleware::metrics::{record_contact_created, record_contact_deleted};

fn not_found() -> ApiError {
    ApiError::NotFound("Contact not found".into())
}

/// Unique violations here can only come from the per-user email index.
fn map_write_error(err: sqlx::Error) -> ApiError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            ApiError::Conflict("Contact with this email already exists".into())
        }
        _ => err.into(),
    }
}

fn to_responses(entities: Vec<ContactEntity>) -> Vec<ContactResponse> {
    entities
        .into_iter()
        .map(|e| ContactResponse::from(Contact::from(e)))
        .collect()
}

/// `POST /api/contacts`
pub async fn create_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(request): ValidatedJson<CreateContactRequest>,
) -> Result<(StatusCode, Json<ContactResponse>), ApiError> {
    let repo = ContactRepository::new(state.pool.clone());
    let entity = repo
        .create(user.id, &request)
        .await
        .map_err(map_write_error)?;

    record_contact_created();
    info!(user_id = %user.id, contact_id = entity.id, "Contact created");

    Ok((
        StatusCode::CREATED,
        Json(Contact::from(entity).into()),
    ))
}

/// `GET /api/contacts?skip=&limit=`
pub async fn list_contacts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedQuery(ListContactsQuery { skip, limit }): ValidatedQuery<ListContactsQuery>,
) -> Result<Json<Vec<ContactResponse>>, ApiError> {
    let repo = ContactRepository::new(state.pool.clone());
    let contacts = repo.list(user.id, skip, limit).await?;

    Ok(Json(to_responses(contacts)))
}

/// `GET /api/contacts/search?query=`
pub async fn search_contacts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedQuery(query): ValidatedQuery<SearchContactsQuery>,
) -> Result<Json<Vec<ContactResponse>>, ApiError> {
    let repo = ContactRepository::new(state.pool.clone());
    let contacts = repo.search(user.id, &query.query).await?;

    Ok(Json(to_responses(contacts)))
}

/// `GET /api/contacts/birthdays`: birthdays in the coming week, soonest first.
pub async fn upcoming_birthday_contacts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<ContactResponse>>, ApiError> {
    let repo = ContactRepository::new(state.pool.clone());
    let contacts: Vec<Contact> = repo
        .list_all(user.id)
        .await?
        .into_iter()
        .map(Contact::from)
        .collect();

    let today = Utc::now().date_naive();
    let upcoming = upcoming_birthdays(contacts, today, UPCOMING_BIRTHDAY_DAYS);

    Ok(Json(upcoming.into_iter().map(ContactResponse::from).collect()))
}

/// `GET /api/contacts/:id`
pub async fn get_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(contact_id): ApiPath<i64>,
) -> Result<Json<ContactResponse>, ApiError> {
    let repo = ContactRepository::new(state.pool.clone());
    let entity = repo
        .find_by_id(user.id, contact_id)
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(Contact::from(entity).into()))
}

/// `PUT /api/contacts/:id`
pub async fn update_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(contact_id): ApiPath<i64>,
    ValidatedJson(request): ValidatedJson<UpdateContactRequest>,
) -> Result<Json<ContactResponse>, ApiError> {
    let repo = ContactRepository::new(state.pool.clone());
    let entity = repo
        .update(user.id, contact_id, &request)
        .await
        .map_err(map_write_error)?
        .ok_or_else(not_found)?;

    info!(user_id = %user.id, contact_id, "Contact updated");
    Ok(Json(Contact::from(entity).into()))
}

/// `DELETE /api/contacts/:id`: responds with the removed contact.
pub async fn delete_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(contact_id): ApiPath<i64>,
) -> Result<Json<ContactResponse>, ApiError> {
    let repo = ContactRepository::new(state.pool.clone());
    let entity = repo
        .delete(user.id, contact_id)
        .await?
        .ok_or_else(not_found)?;

    record_contact_deleted();
    info!(user_id = %user.id, contact_id, "Contact deleted");
    Ok(Json(Contact::from(entity).into()))
}
