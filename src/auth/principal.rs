use uuid::Uuid;

/// The caller of an operation.
///
/// Anonymous principals never hold permissions; anything they may see is
/// granted through resource visibility (the public clause of the listing
/// predicate), not through the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User(Uuid),
}

impl Principal {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Principal::Anonymous => None,
            Principal::User(id) => Some(*id),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }
}
