use crate::{AuthError, Claims, Permission};

/// Check that verified claims grant `required`.
///
/// - No IO
/// - No panics
/// - Exact string membership, no wildcards or hierarchies
///
/// A token without a `permissions` list is malformed for this service
/// (`invalid_claims`); a list that lacks the entry is a denial (`unauthorized`).
pub fn authorize(claims: &Claims, required: &Permission) -> Result<(), AuthError> {
    let granted = claims
        .permissions()
        .ok_or_else(|| AuthError::invalid_claims("permissions not included in token"))?;

    if granted.contains(&required.as_str()) {
        Ok(())
    } else {
        Err(AuthError::Unauthorized(required.as_str().to_string()))
    }
}
