use uuid::Uuid;

use crate::errors::AppError;

pub mod catalog;
pub mod collection;
pub mod group;
pub mod package;
pub mod user;

pub(crate) fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|err| AppError::internal(format!("invalid {what}: {err}")))
}
