//! Domain models for the Contacts API.

pub mod contact;
pub mod user;

pub use contact::{
    Contact, ContactResponse, CreateContactRequest, ListContactsQuery, SearchContactsQuery,
    UpdateContactRequest,
};
pub use user::{
    LoginForm, MessageResponse, RequestEmail, SignupRequest, SignupResponse, TokenResponse, User,
    UserResponse,
};
